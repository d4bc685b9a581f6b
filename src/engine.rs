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

//! Daily fee calculation.
//!
//! The [`FeeEngine`] prices a day of crossings for a single plate:
//!
//! - **Pricing**: each crossing costs the fee of the band covering its start
//!   time, or nothing on toll-free dates and for exempt vehicles.
//! - **Windows**: a window opens at the first crossing not yet covered and lasts
//!   `window_minutes`; only the most expensive crossing inside it is charged.
//! - **Cap**: the sum over all windows is clamped to the daily cap.
//!
//! The engine is pure. Callers must pass crossings of one plate on one day,
//! sorted by `event_start`.

use crate::event::TollEvent;
use crate::rules::FeeSchedule;
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::debug;

/// Prices crossings against an immutable [`FeeSchedule`].
///
/// Cloning is cheap; clones share the schedule.
#[derive(Debug, Clone)]
pub struct FeeEngine {
    schedule: Arc<FeeSchedule>,
}

impl FeeEngine {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self {
            schedule: Arc::new(schedule),
        }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Fee for a single crossing, before windowing and capping.
    pub fn price_for_event(&self, event: &TollEvent) -> u32 {
        if self.schedule.is_toll_free_date(event.day()) || event.is_toll_free() {
            return 0;
        }
        self.schedule.band_fee(&event.event_start)
    }

    /// Total fee for one plate's crossings on one day.
    ///
    /// # Invariants
    ///
    /// - Empty input costs 0.
    /// - The result never exceeds the schedule's daily cap.
    /// - Crossings less than one window apart from the window's first crossing
    ///   only contribute the window maximum.
    pub fn compute_daily_fee(&self, events: &[TollEvent]) -> u32 {
        let Some((first, rest)) = events.split_first() else {
            debug!("no events; total fee = 0");
            return 0;
        };

        let window = TimeDelta::minutes(i64::from(self.schedule.window_minutes));
        let mut window_start = first.event_start;
        let mut max_fee_in_window = self.price_for_event(first);
        let mut total: u32 = 0;

        for event in rest {
            let fee = self.price_for_event(event);
            if event.event_start - window_start < window {
                max_fee_in_window = max_fee_in_window.max(fee);
            } else {
                debug!(%window_start, fee = max_fee_in_window, "closing window");
                total = total.saturating_add(max_fee_in_window);
                window_start = event.event_start;
                max_fee_in_window = fee;
            }
        }

        debug!(%window_start, fee = max_fee_in_window, "closing final window");
        total = total.saturating_add(max_fee_in_window);

        let cap = self.schedule.daily_cap;
        if total > cap {
            debug!(total, cap, "total exceeds daily cap");
            return cap;
        }
        total
    }
}

impl Default for FeeEngine {
    fn default() -> Self {
        Self::new(FeeSchedule::default())
    }
}
