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

//! Crossing ingestion: validate, persist, then queue the plate for billing.

use crate::clock::Clock;
use crate::dispatcher::BillingTrigger;
use crate::error::BillingError;
use crate::event::TollEvent;
use crate::store::EventStore;
use std::sync::Arc;
use tracing::debug;

pub struct TollService {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    trigger: BillingTrigger,
}

impl TollService {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, trigger: BillingTrigger) -> Self {
        Self {
            store,
            clock,
            trigger,
        }
    }

    /// Records a crossing and triggers billing for its plate.
    ///
    /// # Errors
    ///
    /// - [`BillingError::EventInFuture`] - The crossing starts after the clock's `now`.
    /// - [`BillingError::Record`] - The store rejected the crossing; no trigger is sent.
    /// - [`BillingError::QueueClosed`] - Recorded, but the dispatcher has stopped.
    pub fn record(&self, event: TollEvent) -> Result<(), BillingError> {
        if event.event_start > self.clock.now() {
            return Err(BillingError::EventInFuture {
                plate: event.license_plate,
                event_start: event.event_start,
            });
        }

        let plate = event.license_plate.clone();
        debug!(%plate, vehicle_type = %event.vehicle_type, event_start = %event.event_start, "recording toll event");
        self.store
            .record_event(event)
            .map_err(|source| BillingError::Record {
                plate: plate.clone(),
                source,
            })?;

        self.trigger.trigger_for(plate)
    }
}

impl std::fmt::Debug for TollService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TollService")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::LicensePlate;
    use crate::billing::BillingContext;
    use crate::clock::ManualClock;
    use crate::config::DispatcherConfig;
    use crate::dispatcher::Dispatcher;
    use crate::engine::FeeEngine;
    use crate::event::VehicleType;
    use crate::memory_store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn setup() -> (TollService, Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let context = Arc::new(BillingContext::new(
            store.clone(),
            FeeEngine::default(),
            clock.clone(),
        ));
        let dispatcher = Dispatcher::start(context, DispatcherConfig::default()).unwrap();
        let service = TollService::new(store.clone(), clock, dispatcher.trigger());
        (service, dispatcher, store)
    }

    #[test]
    fn recorded_event_is_billed_after_shutdown() {
        let (service, dispatcher, store) = setup();
        let plate = LicensePlate::new("ABC123").unwrap();

        service
            .record(TollEvent::observed(plate.clone(), at(7, 0), VehicleType::Car, at(7, 0)))
            .unwrap();
        dispatcher.shutdown();

        assert_eq!(store.daily_fee(at(0, 0).date(), &plate), Some(18));
    }

    #[test]
    fn rejects_future_events() {
        let (service, dispatcher, store) = setup();
        let plate = LicensePlate::new("ABC123").unwrap();

        let result = service.record(TollEvent::observed(
            plate.clone(),
            at(13, 0),
            VehicleType::Car,
            at(12, 0),
        ));
        dispatcher.shutdown();

        assert_eq!(
            result,
            Err(BillingError::EventInFuture {
                plate,
                event_start: at(13, 0)
            })
        );
        assert_eq!(store.event_count(), 0);
        assert!(store.daily_fees().is_empty());
    }

    #[test]
    fn trigger_after_shutdown_reports_closed_queue() {
        let (service, dispatcher, store) = setup();
        dispatcher.shutdown();

        let result = service.record(TollEvent::observed(
            LicensePlate::new("ABC123").unwrap(),
            at(7, 0),
            VehicleType::Car,
            at(7, 0),
        ));
        assert_eq!(result, Err(BillingError::QueueClosed));
        assert_eq!(store.event_count(), 1);
    }
}
