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

//! Congestion tariff: time-of-day fee bands, toll-free dates, and the daily cap.
//!
//! The default schedule is the standard tariff:
//!
//! | From  | To    | Fee |
//! |-------|-------|-----|
//! | 06:00 | 06:29 | 8   |
//! | 06:30 | 06:59 | 13  |
//! | 07:00 | 07:59 | 18  |
//! | 08:00 | 08:29 | 13  |
//! | 08:30 | 14:59 | 8   |
//! | 15:00 | 15:29 | 13  |
//! | 15:30 | 16:59 | 18  |
//! | 17:00 | 17:59 | 13  |
//! | 18:00 | 18:29 | 8   |
//!
//! Saturdays, Sundays, and listed holidays are toll-free. A plate pays at most
//! 60 per day.

use crate::ConfigError;
use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One time-of-day price band, inclusive at both ends with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBand {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    pub fee: u32,
}

impl FeeBand {
    pub const fn new(
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
        fee: u32,
    ) -> Self {
        Self {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            fee,
        }
    }

    /// Whether `hour:minute` falls inside `[start, end]`.
    pub fn contains(&self, hour: u32, minute: u32) -> bool {
        (hour > self.start_hour || (hour == self.start_hour && minute >= self.start_minute))
            && (hour < self.end_hour || (hour == self.end_hour && minute <= self.end_minute))
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidBand { index, reason };
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(invalid("hour out of range"));
        }
        if self.start_minute > 59 || self.end_minute > 59 {
            return Err(invalid("minute out of range"));
        }
        if (self.start_hour, self.start_minute) > (self.end_hour, self.end_minute) {
            return Err(invalid("starts after it ends"));
        }
        Ok(())
    }
}

const STANDARD_BANDS: [FeeBand; 9] = [
    FeeBand::new(6, 0, 6, 29, 8),
    FeeBand::new(6, 30, 6, 59, 13),
    FeeBand::new(7, 0, 7, 59, 18),
    FeeBand::new(8, 0, 8, 29, 13),
    FeeBand::new(8, 30, 14, 59, 8),
    FeeBand::new(15, 0, 15, 29, 13),
    FeeBand::new(15, 30, 16, 59, 18),
    FeeBand::new(17, 0, 17, 59, 13),
    FeeBand::new(18, 0, 18, 29, 8),
];

pub const DEFAULT_DAILY_CAP: u32 = 60;
pub const DEFAULT_WINDOW_MINUTES: u32 = 60;

/// Immutable pricing rules injected into the [`FeeEngine`](crate::FeeEngine).
///
/// Bands are matched in declaration order; the first match wins and times
/// outside every band are free. Missing fields in a deserialized schedule fall
/// back to the standard tariff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub bands: Vec<FeeBand>,
    pub holidays: BTreeSet<NaiveDate>,
    pub daily_cap: u32,
    /// Length of the deduplication window anchored at its first crossing.
    pub window_minutes: u32,
}

impl FeeSchedule {
    /// Checks every band and the window length.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidBand`] - A band is out of range or inverted.
    /// - [`ConfigError::ZeroWindow`] - `window_minutes` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_minutes == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        self.bands
            .iter()
            .enumerate()
            .try_for_each(|(index, band)| band.validate(index))
    }

    /// Weekends and listed holidays are toll-free for every vehicle.
    pub fn is_toll_free_date(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || self.holidays.contains(&date)
    }

    /// Fee of the first band covering the time of day, or 0.
    pub fn band_fee<T: Timelike>(&self, time: &T) -> u32 {
        let (hour, minute) = (time.hour(), time.minute());
        self.bands
            .iter()
            .find(|band| band.contains(hour, minute))
            .map_or(0, |band| band.fee)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bands: STANDARD_BANDS.to_vec(),
            holidays: [(2025, 1, 1), (2025, 12, 25)]
                .into_iter()
                .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
                .collect(),
            daily_cap: DEFAULT_DAILY_CAP,
            window_minutes: DEFAULT_WINDOW_MINUTES,
        }
    }
}
