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

//! In-process [`EventStore`] backed by concurrent maps.

use crate::base::LicensePlate;
use crate::error::StoreError;
use crate::event::{DailyFee, TollEvent};
use crate::store::EventStore;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct StoredEvent {
    event: TollEvent,
    toll_free: bool,
}

/// Thread-safe in-memory store.
///
/// Crossings are kept per plate in insertion order; daily fees live in a
/// [`DashMap`] keyed by `(date, plate)` so concurrent upserts for different
/// plates never contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: DashMap<LicensePlate, RwLock<Vec<StoredEvent>>>,
    fees: DashMap<(NaiveDate, LicensePlate), u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored fee for a plate on a day, if it has been billed.
    pub fn daily_fee(&self, date: NaiveDate, plate: &LicensePlate) -> Option<u32> {
        self.fees.get(&(date, plate.clone())).map(|fee| *fee)
    }

    /// All stored fees ordered by date, then plate.
    pub fn daily_fees(&self) -> Vec<DailyFee> {
        let mut fees: Vec<DailyFee> = self
            .fees
            .iter()
            .map(|entry| {
                let (date, plate) = entry.key();
                DailyFee {
                    date: *date,
                    license_plate: plate.clone(),
                    fee: *entry.value(),
                }
            })
            .collect();
        fees.sort_by(|a, b| (a.date, &a.license_plate).cmp(&(b.date, &b.license_plate)));
        fees
    }

    pub fn event_count(&self) -> usize {
        self.events.iter().map(|entry| entry.value().read().len()).sum()
    }
}

impl EventStore for MemoryStore {
    fn record_event(&self, event: TollEvent) -> Result<(), StoreError> {
        let toll_free = event.is_toll_free();
        self.events
            .entry(event.license_plate.clone())
            .or_default()
            .write()
            .push(StoredEvent { event, toll_free });
        Ok(())
    }

    fn fetch_events(
        &self,
        day: NaiveDate,
        plates: &[LicensePlate],
    ) -> Result<Vec<TollEvent>, StoreError> {
        let wanted: HashSet<&LicensePlate> = plates.iter().collect();
        let mut events = Vec::new();

        for plate in wanted {
            let Some(stored) = self.events.get(plate) else {
                continue;
            };
            let mut plate_events: Vec<TollEvent> = stored
                .read()
                .iter()
                .filter(|stored| !stored.toll_free && stored.event.day() == day)
                .map(|stored| stored.event.clone())
                .collect();
            plate_events.sort_by_key(|event| event.event_start);
            events.extend(plate_events);
        }

        Ok(events)
    }

    fn upsert_daily_fee(&self, fee: &DailyFee) -> Result<(), StoreError> {
        self.fees
            .insert((fee.date, fee.license_plate.clone()), fee.fee);
        Ok(())
    }
}
