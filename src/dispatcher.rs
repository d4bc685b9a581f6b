// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Batching dispatcher for billing triggers.
//!
//! Request handlers push plates onto one bounded queue shared by a fixed pool
//! of worker threads. Each worker collects plates into its own batch and flushes
//! it through [`BillingContext::bill_licenses`] when either
//!
//! - the batch reaches `batch_size_limit`, or
//! - its flush deadline passes (`flush_interval` after the previous flush).
//!
//! A worker blocks on a single [`select!`] over the queue, the shutdown signal,
//! and a deadline timer, so it never polls. The deadline is also checked after
//! every received plate, so a queue that never runs dry still gets flushed on
//! time.
//!
//! # Worker states
//!
//! ```text
//! Idle ──plate──► Accumulating ──limit or deadline──► Flushing ──► Idle
//!   │                  │
//!   └──── shutdown ────┴──► drain queue ──► final flush ──► Stopped
//! ```
//!
//! # Ordering
//!
//! None across plates or workers. Two triggers for one plate may be billed by
//! different workers; both recompute from stored crossings, so whichever
//! finishes last writes the same value.

use crate::base::LicensePlate;
use crate::billing::BillingContext;
use crate::config::{DispatcherConfig, FailurePolicy};
use crate::error::BillingError;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Cloneable entry point handed to request handlers.
#[derive(Debug, Clone)]
pub struct BillingTrigger {
    queue: Sender<LicensePlate>,
}

impl BillingTrigger {
    /// Queues `plate` for (re)billing.
    ///
    /// Blocks while the queue is full. Nothing is acknowledged; the fee shows
    /// up in the store after the next flush that picks the plate up.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::QueueClosed`] once every worker has stopped.
    pub fn trigger_for(&self, plate: LicensePlate) -> Result<(), BillingError> {
        self.queue.send(plate).map_err(|_| BillingError::QueueClosed)
    }
}

/// Owns the worker pool. Dropping it performs [`shutdown`](Dispatcher::shutdown).
#[derive(Debug)]
pub struct Dispatcher {
    trigger: BillingTrigger,
    /// Dropped to broadcast shutdown: every worker's `recv` on the paired
    /// receiver fails at once.
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Validates `config` and spawns `worker_count` workers.
    ///
    /// # Errors
    ///
    /// - [`BillingError::Config`] - `config` is invalid.
    /// - [`BillingError::Spawn`] - A worker thread could not be created. Workers
    ///   already started are shut down before returning.
    pub fn start(
        context: Arc<BillingContext>,
        config: DispatcherConfig,
    ) -> Result<Self, BillingError> {
        config.validate()?;

        let (queue_tx, queue_rx) = channel::bounded(config.buffer_size);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let mut dispatcher = Dispatcher {
            trigger: BillingTrigger { queue: queue_tx },
            shutdown: Some(shutdown_tx),
            workers: Vec::with_capacity(config.worker_count),
        };

        for id in 1..=config.worker_count {
            let worker = Worker::new(id, Arc::clone(&context), &config);
            let queue = queue_rx.clone();
            let shutdown = shutdown_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("billing-worker-{id}"))
                .spawn(move || worker.run(queue, shutdown))
                .map_err(|e| BillingError::Spawn {
                    message: e.to_string(),
                })?;
            dispatcher.workers.push(handle);
        }

        info!(
            workers = config.worker_count,
            buffer_size = config.buffer_size,
            batch_size_limit = config.batch_size_limit,
            flush_interval = ?config.flush_interval,
            "billing dispatcher started"
        );
        Ok(dispatcher)
    }

    /// Handle for queuing plates from other threads.
    pub fn trigger(&self) -> BillingTrigger {
        self.trigger.clone()
    }

    /// Queues `plate` for billing. See [`BillingTrigger::trigger_for`].
    pub fn trigger_for(&self, plate: LicensePlate) -> Result<(), BillingError> {
        self.trigger.trigger_for(plate)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signals every worker to stop and waits until each has flushed its
    /// batch and the triggers already queued.
    ///
    /// Callers must stop triggering before calling this.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown.take().is_none() {
            return;
        }
        info!(workers = self.workers.len(), "billing dispatcher shutting down");

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("billing-worker").to_owned();
            if handle.join().is_err() {
                error!(worker = %name, "billing worker panicked");
            }
        }
        info!("billing dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Accumulating,
    Flushing,
    Stopped,
}

struct Worker {
    id: usize,
    context: Arc<BillingContext>,
    batch: Vec<LicensePlate>,
    batch_size_limit: usize,
    flush_interval: Duration,
    failure_policy: FailurePolicy,
    state: WorkerState,
}

impl Worker {
    fn new(id: usize, context: Arc<BillingContext>, config: &DispatcherConfig) -> Self {
        Self {
            id,
            context,
            batch: Vec::with_capacity(config.batch_size_limit),
            batch_size_limit: config.batch_size_limit,
            flush_interval: config.flush_interval,
            failure_policy: config.failure_policy,
            state: WorkerState::Idle,
        }
    }

    fn run(mut self, queue: Receiver<LicensePlate>, shutdown: Receiver<()>) {
        debug!(worker = self.id, "billing worker started");
        let mut deadline = Instant::now() + self.flush_interval;

        loop {
            let timer = channel::at(deadline);
            select! {
                recv(queue) -> message => match message {
                    Ok(plate) => {
                        self.push(plate);
                        // A busy queue must not starve the timer.
                        if self.batch.len() >= self.batch_size_limit || Instant::now() >= deadline {
                            self.flush();
                            deadline = Instant::now() + self.flush_interval;
                        }
                    }
                    // Every trigger handle is gone; nothing more can arrive.
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
                recv(timer) -> _ => {
                    self.flush();
                    deadline = Instant::now() + self.flush_interval;
                }
            }
        }

        self.drain(&queue);
        self.transition(WorkerState::Stopped);
        debug!(worker = self.id, "billing worker stopped");
    }

    fn push(&mut self, plate: LicensePlate) {
        if self.state == WorkerState::Idle {
            self.transition(WorkerState::Accumulating);
        }
        self.batch.push(plate);
    }

    /// Final flush: the partial batch plus whatever is queued right now, in
    /// chunks of at most `batch_size_limit`.
    fn drain(&mut self, queue: &Receiver<LicensePlate>) {
        let queued = queue.len();
        for plate in queue.try_iter().take(queued) {
            self.push(plate);
            if self.batch.len() >= self.batch_size_limit {
                self.flush();
            }
        }
        self.flush();
    }

    fn flush(&mut self) {
        if self.batch.is_empty() {
            trace!(worker = self.id, "nothing to flush");
            return;
        }
        self.transition(WorkerState::Flushing);

        let batch = std::mem::take(&mut self.batch);
        match self.context.bill_licenses(&batch, self.failure_policy) {
            Ok(report) => debug!(
                worker = self.id,
                plates = report.plates,
                billed = report.billed,
                failed = report.failed,
                "batch flushed"
            ),
            Err(error) => error!(
                worker = self.id,
                plates = batch.len(),
                %error,
                "billing flush failed"
            ),
        }

        self.batch = batch;
        self.batch.clear();
        self.transition(WorkerState::Idle);
    }

    fn transition(&mut self, next: WorkerState) {
        trace!(worker = self.id, from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }
}
