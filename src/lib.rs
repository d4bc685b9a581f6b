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

//! # Toll Billing
//!
//! This library computes per-plate, per-day congestion fees from recorded toll
//! crossings, and keeps them current through a batching billing pipeline.
//!
//! ## Core Components
//!
//! - [`FeeSchedule`]: Fee bands, toll-free dates, daily cap, and window length
//! - [`FeeEngine`]: Prices one plate's day of crossings (windowed, capped)
//! - [`EventStore`]: Storage contract for crossings and daily fees
//! - [`Dispatcher`]: Worker pool that batches billing triggers into flushes
//! - [`TollService`]: Records a crossing and triggers billing for its plate
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use toll_billing::{
//!     BillingContext, Dispatcher, DispatcherConfig, FeeEngine, LicensePlate, ManualClock,
//!     MemoryStore, TollEvent, TollService, VehicleType,
//! };
//!
//! let monday = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
//! let clock = Arc::new(ManualClock::new(monday.and_hms_opt(12, 0, 0).unwrap()));
//! let store = Arc::new(MemoryStore::new());
//! let context = Arc::new(BillingContext::new(store.clone(), FeeEngine::default(), clock.clone()));
//! let dispatcher = Dispatcher::start(context, DispatcherConfig::default()).unwrap();
//! let service = TollService::new(store.clone(), clock, dispatcher.trigger());
//!
//! let plate = LicensePlate::new("ABC123").unwrap();
//! let start = monday.and_hms_opt(7, 0, 0).unwrap();
//! service.record(TollEvent::observed(plate.clone(), start, VehicleType::Car, start)).unwrap();
//!
//! // Shutdown drains the queue and flushes every batch.
//! dispatcher.shutdown();
//! assert_eq!(store.daily_fee(monday, &plate), Some(18));
//! ```
//!
//! ## Thread Safety
//!
//! Triggers may come from any number of threads; they block only while the
//! shared queue is full. Workers share nothing but the queue and the store.

mod base;
mod billing;
mod clock;
pub mod config;
mod dispatcher;
mod engine;
pub mod error;
mod event;
mod memory_store;
pub mod rules;
mod service;
mod store;

pub use base::LicensePlate;
pub use billing::{BillingContext, FlushReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, DispatcherConfig, FailurePolicy};
pub use dispatcher::{BillingTrigger, Dispatcher};
pub use engine::FeeEngine;
pub use error::{BillingError, ConfigError, StoreError};
pub use event::{DailyFee, TollEvent, VehicleType};
pub use memory_store::MemoryStore;
pub use rules::{FeeBand, FeeSchedule};
pub use service::TollService;
pub use store::EventStore;
