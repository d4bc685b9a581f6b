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

//! Batching dispatcher integration tests.
//!
//! A recording store wraps [`MemoryStore`] to count gateway calls and inject
//! failures, so the flush behaviour can be observed from outside.

use chrono::{NaiveDate, NaiveDateTime};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use toll_billing::{
    BillingContext, BillingError, ConfigError, DailyFee, Dispatcher, DispatcherConfig,
    EventStore, FailurePolicy, FeeEngine, LicensePlate, ManualClock, MemoryStore, StoreError,
    TollEvent, VehicleType,
};

// =============================================================================
// Test Store
// =============================================================================

#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    fetches: Mutex<Vec<Vec<LicensePlate>>>,
    upserts: Mutex<Vec<DailyFee>>,
    fail_fetch: AtomicBool,
    fail_upsert_for: Mutex<Option<LicensePlate>>,
    /// While set, every fetch waits until the paired sender is dropped.
    gate: Mutex<Option<Receiver<()>>>,
}

impl RecordingStore {
    fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    fn upsert_count(&self) -> usize {
        self.upserts.lock().len()
    }

    fn upserted_plates(&self) -> Vec<LicensePlate> {
        self.upserts
            .lock()
            .iter()
            .map(|fee| fee.license_plate.clone())
            .collect()
    }

    fn close_gate(&self) -> Sender<()> {
        let (tx, rx) = channel::bounded(0);
        *self.gate.lock() = Some(rx);
        tx
    }
}

impl EventStore for RecordingStore {
    fn record_event(&self, event: TollEvent) -> Result<(), StoreError> {
        self.inner.record_event(event)
    }

    fn fetch_events(
        &self,
        day: NaiveDate,
        plates: &[LicensePlate],
    ) -> Result<Vec<TollEvent>, StoreError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        let fail = self.fail_fetch.load(Ordering::SeqCst);
        self.fetches.lock().push(plates.to_vec());
        if fail {
            return Err(StoreError::backend("connection reset"));
        }
        self.inner.fetch_events(day, plates)
    }

    fn upsert_daily_fee(&self, fee: &DailyFee) -> Result<(), StoreError> {
        if self.fail_upsert_for.lock().as_ref() == Some(&fee.license_plate) {
            return Err(StoreError::backend("constraint violation"));
        }
        self.inner.upsert_daily_fee(fee)?;
        self.upserts.lock().push(fee.clone());
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    monday().and_hms_opt(h, m, 0).unwrap()
}

fn plate(s: &str) -> LicensePlate {
    LicensePlate::new(s).unwrap()
}

fn config(workers: usize, batch: usize, flush_ms: u64) -> DispatcherConfig {
    DispatcherConfig {
        worker_count: workers,
        buffer_size: 100,
        batch_size_limit: batch,
        flush_interval: Duration::from_millis(flush_ms),
        failure_policy: FailurePolicy::FailFast,
    }
}

fn start(store: &Arc<RecordingStore>, config: DispatcherConfig) -> Dispatcher {
    let context = Arc::new(BillingContext::new(
        store.clone(),
        FeeEngine::default(),
        Arc::new(ManualClock::new(at(20, 0))),
    ));
    Dispatcher::start(context, config).unwrap()
}

fn record_car(store: &RecordingStore, p: &str, h: u32, m: u32) {
    store
        .record_event(TollEvent::observed(plate(p), at(h, m), VehicleType::Car, at(h, m)))
        .unwrap();
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

const LONG: u64 = 60_000;

// =============================================================================
// Batching
// =============================================================================

#[test]
fn repeated_triggers_share_one_fetch_and_one_upsert() {
    let store = Arc::new(RecordingStore::default());
    record_car(&store, "AAA", 7, 0);
    let dispatcher = start(&store, config(1, 100, LONG));

    for _ in 0..10 {
        dispatcher.trigger_for(plate("AAA")).unwrap();
    }
    dispatcher.shutdown();

    assert_eq!(store.fetch_count(), 1);
    assert_eq!(store.fetches.lock()[0], vec![plate("AAA")]);
    assert_eq!(store.upsert_count(), 1);
    assert_eq!(store.inner.daily_fee(monday(), &plate("AAA")), Some(18));
}

#[test]
fn full_batch_flushes_without_waiting_for_timer() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = start(&store, config(1, 3, LONG));

    for p in ["AAA", "BBB", "CCC"] {
        dispatcher.trigger_for(plate(p)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || store.upsert_count() == 3));
    assert_eq!(store.fetch_count(), 1);
    dispatcher.shutdown();
}

#[test]
fn timer_flushes_partial_batch() {
    let store = Arc::new(RecordingStore::default());
    record_car(&store, "AAA", 6, 45);
    record_car(&store, "AAA", 8, 0);
    let dispatcher = start(&store, config(1, 100, 20));

    dispatcher.trigger_for(plate("AAA")).unwrap();

    assert!(wait_until(Duration::from_secs(5), || store.upsert_count() == 1));
    assert_eq!(store.inner.daily_fee(monday(), &plate("AAA")), Some(26));
    dispatcher.shutdown();
}

#[test]
fn timer_flushes_while_queue_stays_busy() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = Arc::new(start(&store, config(1, 1_000_000, 20)));
    let running = Arc::new(AtomicBool::new(true));

    let producers: Vec<_> = (0..4)
        .map(|id| {
            let trigger = dispatcher.trigger();
            let running = running.clone();
            thread::spawn(move || {
                let p = plate(&format!("FLD{id}"));
                while running.load(Ordering::SeqCst) {
                    trigger.trigger_for(p.clone()).unwrap();
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(300));
    let flushes_under_load = store.fetch_count();
    running.store(false, Ordering::SeqCst);
    for producer in producers {
        producer.join().unwrap();
    }
    Arc::try_unwrap(dispatcher).unwrap().shutdown();

    // ~15 deadlines pass in 300ms; the batch limit is never reached.
    assert!(
        flushes_under_load >= 3,
        "only {flushes_under_load} timer flushes while producers kept the queue full"
    );
}

#[test]
fn idle_timer_ticks_do_not_touch_the_store() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = start(&store, config(2, 100, 5));

    thread::sleep(Duration::from_millis(50));
    dispatcher.shutdown();

    assert_eq!(store.fetch_count(), 0);
    assert_eq!(store.upsert_count(), 0);
}

#[test]
fn plate_without_events_clears_stale_fee() {
    let store = Arc::new(RecordingStore::default());
    store
        .inner
        .upsert_daily_fee(&DailyFee {
            date: monday(),
            license_plate: plate("AAA"),
            fee: 60,
        })
        .unwrap();
    let dispatcher = start(&store, config(1, 100, LONG));

    dispatcher.trigger_for(plate("AAA")).unwrap();
    dispatcher.shutdown();

    assert_eq!(store.inner.daily_fee(monday(), &plate("AAA")), Some(0));
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn shutdown_bills_every_queued_plate() {
    let store = Arc::new(RecordingStore::default());
    let plates: Vec<String> = (0..50).map(|i| format!("P{i:03}")).collect();
    for p in &plates {
        record_car(&store, p, 7, 0);
    }
    let dispatcher = start(&store, config(2, 8, LONG));

    for p in &plates {
        dispatcher.trigger_for(plate(p)).unwrap();
    }
    dispatcher.shutdown();

    let billed: HashSet<LicensePlate> = store.upserted_plates().into_iter().collect();
    assert_eq!(billed.len(), plates.len());
    for p in &plates {
        assert_eq!(store.inner.daily_fee(monday(), &plate(p)), Some(18));
    }
    assert!(
        store.fetches.lock().iter().all(|batch| batch.len() <= 8),
        "no flush exceeds the batch size limit"
    );
}

#[test]
fn dropping_dispatcher_flushes_like_shutdown() {
    let store = Arc::new(RecordingStore::default());
    record_car(&store, "AAA", 7, 0);
    let dispatcher = start(&store, config(1, 100, LONG));

    dispatcher.trigger_for(plate("AAA")).unwrap();
    drop(dispatcher);

    assert_eq!(store.inner.daily_fee(monday(), &plate("AAA")), Some(18));
}

#[test]
fn trigger_after_shutdown_is_rejected() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = start(&store, config(2, 100, LONG));
    let trigger = dispatcher.trigger();

    dispatcher.shutdown();

    assert_eq!(
        trigger.trigger_for(plate("AAA")),
        Err(BillingError::QueueClosed)
    );
}

#[test]
fn invalid_config_is_rejected() {
    let store = Arc::new(RecordingStore::default());
    let context = Arc::new(BillingContext::new(
        store,
        FeeEngine::default(),
        Arc::new(ManualClock::new(at(20, 0))),
    ));

    let result = Dispatcher::start(context, config(0, 100, LONG));
    assert!(matches!(
        result,
        Err(BillingError::Config(ConfigError::NoWorkers))
    ));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn upsert_failure_abandons_rest_of_batch() {
    let store = Arc::new(RecordingStore::default());
    *store.fail_upsert_for.lock() = Some(plate("BAD"));
    let dispatcher = start(&store, config(1, 100, LONG));

    for p in ["AAA", "BAD", "CCC"] {
        dispatcher.trigger_for(plate(p)).unwrap();
    }
    dispatcher.shutdown();

    assert_eq!(store.upserted_plates(), vec![plate("AAA")]);
}

#[test]
fn best_effort_bills_remaining_plates() {
    let store = Arc::new(RecordingStore::default());
    *store.fail_upsert_for.lock() = Some(plate("BAD"));
    let dispatcher = start(
        &store,
        DispatcherConfig {
            failure_policy: FailurePolicy::BestEffort,
            ..config(1, 100, LONG)
        },
    );

    for p in ["AAA", "BAD", "CCC"] {
        dispatcher.trigger_for(plate(p)).unwrap();
    }
    dispatcher.shutdown();

    assert_eq!(store.upserted_plates(), vec![plate("AAA"), plate("CCC")]);
}

#[test]
fn worker_survives_fetch_failure() {
    let store = Arc::new(RecordingStore::default());
    record_car(&store, "AAA", 7, 0);
    store.fail_fetch.store(true, Ordering::SeqCst);
    let dispatcher = start(&store, config(1, 1, LONG));

    dispatcher.trigger_for(plate("AAA")).unwrap();
    assert!(wait_until(Duration::from_secs(5), || store.fetch_count() == 1));
    assert_eq!(store.upsert_count(), 0);

    // Not retried: only a new trigger bills the plate.
    store.fail_fetch.store(false, Ordering::SeqCst);
    dispatcher.trigger_for(plate("AAA")).unwrap();
    assert!(wait_until(Duration::from_secs(5), || store.upsert_count() == 1));
    dispatcher.shutdown();

    assert_eq!(store.fetch_count(), 2);
    assert_eq!(store.inner.daily_fee(monday(), &plate("AAA")), Some(18));
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn full_queue_blocks_trigger_until_worker_catches_up() {
    let store = Arc::new(RecordingStore::default());
    let gate = store.close_gate();
    let dispatcher = Arc::new(start(
        &store,
        DispatcherConfig {
            buffer_size: 1,
            ..config(1, 1, LONG)
        },
    ));

    // The worker takes AAA and blocks in fetch; BBB then fills the queue.
    dispatcher.trigger_for(plate("AAA")).unwrap();
    dispatcher.trigger_for(plate("BBB")).unwrap();

    let returned = Arc::new(AtomicBool::new(false));
    let blocked = {
        let trigger = dispatcher.trigger();
        let returned = returned.clone();
        thread::spawn(move || {
            trigger.trigger_for(plate("CCC")).unwrap();
            returned.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!returned.load(Ordering::SeqCst), "trigger must block on a full queue");

    drop(gate);
    blocked.join().unwrap();
    assert!(returned.load(Ordering::SeqCst));

    Arc::try_unwrap(dispatcher).unwrap().shutdown();
    let billed: HashSet<LicensePlate> = store.upserted_plates().into_iter().collect();
    assert_eq!(billed, HashSet::from([plate("AAA"), plate("BBB"), plate("CCC")]));
}
