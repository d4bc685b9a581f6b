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

//! Toll crossings and computed daily fees.
//!
//! A [`TollEvent`] is written once by ingestion and only ever read by billing.
//! A [`DailyFee`] is keyed by `(date, license_plate)` and overwritten on every
//! recomputation.

use crate::base::LicensePlate;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vehicle category reported by the roadside sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    /// The single ordinary, taxed category.
    Car,
    Motorbike,
    Tractor,
    Emergency,
    Diplomat,
    Foreign,
    Military,
}

impl VehicleType {
    pub const ALL: [VehicleType; 7] = [
        VehicleType::Car,
        VehicleType::Motorbike,
        VehicleType::Tractor,
        VehicleType::Emergency,
        VehicleType::Diplomat,
        VehicleType::Foreign,
        VehicleType::Military,
    ];

    /// Exempt categories are never charged, whatever the time or date.
    pub const fn is_toll_free(self) -> bool {
        matches!(
            self,
            VehicleType::Motorbike
                | VehicleType::Tractor
                | VehicleType::Emergency
                | VehicleType::Diplomat
                | VehicleType::Foreign
                | VehicleType::Military
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Motorbike => "motorbike",
            VehicleType::Tractor => "tractor",
            VehicleType::Emergency => "emergency",
            VehicleType::Diplomat => "diplomat",
            VehicleType::Foreign => "foreign",
            VehicleType::Military => "military",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed toll crossing.
///
/// Timestamps are local wall-clock times. `event_stop` and `billed` are carried
/// for storage but do not take part in pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TollEvent {
    pub created_at: NaiveDateTime,
    pub license_plate: LicensePlate,
    pub event_start: NaiveDateTime,
    pub event_stop: NaiveDateTime,
    pub vehicle_type: VehicleType,
    pub billed: bool,
}

impl TollEvent {
    /// Builds an unbilled crossing as ingestion records it, with the stop time
    /// one hour after the start (or equal to it if that would overflow).
    pub fn observed(
        license_plate: LicensePlate,
        event_start: NaiveDateTime,
        vehicle_type: VehicleType,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            created_at,
            license_plate,
            event_start,
            event_stop: event_start
                .checked_add_signed(TimeDelta::hours(1))
                .unwrap_or(event_start),
            vehicle_type,
            billed: false,
        }
    }

    pub fn is_toll_free(&self) -> bool {
        self.vehicle_type.is_toll_free()
    }

    /// Calendar day the crossing is billed on.
    pub fn day(&self) -> NaiveDate {
        self.event_start.date()
    }
}

/// Total fee owed by one plate for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFee {
    pub date: NaiveDate,
    pub license_plate: LicensePlate,
    pub fee: u32,
}
