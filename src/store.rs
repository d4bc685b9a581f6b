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

//! Persistence contract for crossings and daily fees.

use crate::base::LicensePlate;
use crate::error::StoreError;
use crate::event::{DailyFee, TollEvent};
use chrono::NaiveDate;

/// Storage backend for toll crossings and computed fees.
///
/// Implementations are shared by every billing worker and must tolerate
/// concurrent calls.
pub trait EventStore: Send + Sync {
    /// Persists a crossing, flagging it toll-free when its vehicle is exempt.
    fn record_event(&self, event: TollEvent) -> Result<(), StoreError>;

    /// Returns the crossings of `plates` that start on `day` and are not
    /// flagged toll-free, ordered by `event_start`.
    fn fetch_events(
        &self,
        day: NaiveDate,
        plates: &[LicensePlate],
    ) -> Result<Vec<TollEvent>, StoreError>;

    /// Inserts `fee`, replacing any row with the same date and plate.
    fn upsert_daily_fee(&self, fee: &DailyFee) -> Result<(), StoreError>;
}
