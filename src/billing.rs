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

//! Batch billing: one fetch per batch, one fee per plate.

use crate::base::LicensePlate;
use crate::clock::Clock;
use crate::config::FailurePolicy;
use crate::engine::FeeEngine;
use crate::error::BillingError;
use crate::event::{DailyFee, TollEvent};
use crate::store::EventStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counters for a single flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Distinct plates in the batch.
    pub plates: usize,
    /// Crossings returned by the fetch.
    pub events: usize,
    pub billed: usize,
    pub failed: usize,
}

/// Everything a billing worker needs, built once at startup and shared.
pub struct BillingContext {
    store: Arc<dyn EventStore>,
    engine: FeeEngine,
    clock: Arc<dyn Clock>,
}

impl BillingContext {
    pub fn new(store: Arc<dyn EventStore>, engine: FeeEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn engine(&self) -> &FeeEngine {
        &self.engine
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Recomputes and stores today's fee for every plate in `plates`.
    ///
    /// Repeated plates are billed once. Plates without crossings today are
    /// billed 0 so a stale fee is overwritten.
    ///
    /// # Errors
    ///
    /// - [`BillingError::Fetch`] - The batch fetch failed; nothing was billed.
    /// - [`BillingError::Upsert`] - Under [`FailurePolicy::FailFast`], storing a
    ///   fee failed and the plates after it were skipped.
    pub fn bill_licenses(
        &self,
        plates: &[LicensePlate],
        policy: FailurePolicy,
    ) -> Result<FlushReport, BillingError> {
        if plates.is_empty() {
            return Ok(FlushReport::default());
        }

        let started = Instant::now();
        let day = self.clock.today();

        let mut seen = HashSet::with_capacity(plates.len());
        let unique: Vec<LicensePlate> = plates
            .iter()
            .filter(|plate| seen.insert(*plate))
            .cloned()
            .collect();

        let events = self
            .store
            .fetch_events(day, &unique)
            .map_err(|source| BillingError::Fetch {
                plates: unique.len(),
                source,
            })?;

        let mut report = FlushReport {
            plates: unique.len(),
            events: events.len(),
            ..FlushReport::default()
        };

        let mut by_plate: HashMap<LicensePlate, Vec<TollEvent>> =
            HashMap::with_capacity(unique.len());
        for event in events.into_iter().filter(|event| event.day() == day) {
            by_plate
                .entry(event.license_plate.clone())
                .or_default()
                .push(event);
        }

        for plate in unique {
            let mut plate_events = by_plate.remove(&plate).unwrap_or_default();
            plate_events.sort_by_key(|event| event.event_start);

            let fee = self.engine.compute_daily_fee(&plate_events);
            let daily_fee = DailyFee {
                date: day,
                license_plate: plate,
                fee,
            };

            match self.store.upsert_daily_fee(&daily_fee) {
                Ok(()) => {
                    report.billed += 1;
                    info!(
                        plate = %daily_fee.license_plate,
                        events = plate_events.len(),
                        fee,
                        "billed license plate"
                    );
                }
                Err(source) => {
                    let error = BillingError::Upsert {
                        plate: daily_fee.license_plate,
                        source,
                    };
                    match policy {
                        FailurePolicy::FailFast => return Err(error),
                        FailurePolicy::BestEffort => {
                            warn!(%error, "skipping plate");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        debug!(
            %day,
            plates = report.plates,
            events = report.events,
            billed = report.billed,
            failed = report.failed,
            elapsed = ?started.elapsed(),
            "flush complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for BillingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingContext")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
