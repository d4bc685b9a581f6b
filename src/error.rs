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

//! Error types for billing, configuration, and storage.

use crate::base::LicensePlate;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Failures reported by an [`EventStore`](crate::EventStore) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The storage engine rejected or could not serve the request
    #[error("backend failure: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Invalid dispatcher settings or fee rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("queue buffer size must be at least 1")]
    EmptyBuffer,

    #[error("batch size limit must be at least 1")]
    EmptyBatch,

    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("fee window must be at least one minute")]
    ZeroWindow,

    /// A fee band has an out-of-range time or ends before it starts
    #[error("invalid fee band #{index}: {reason}")]
    InvalidBand { index: usize, reason: &'static str },

    /// Configuration file could not be read
    #[error("cannot read config file {path}: {message}")]
    Read { path: String, message: String },

    /// Configuration file is not valid JSON for the expected shape
    #[error("cannot parse config: {message}")]
    Parse { message: String },
}

/// Billing pipeline and ingestion errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// License plate is empty or whitespace
    #[error("license plate must not be empty")]
    EmptyPlate,

    /// Crossing is timestamped after the current clock reading
    #[error("event for {plate} starts in the future ({event_start})")]
    EventInFuture {
        plate: LicensePlate,
        event_start: NaiveDateTime,
    },

    /// Batch fetch failed; no plate in the batch was billed
    #[error("fetching events for {plates} plate(s) failed: {source}")]
    Fetch { plates: usize, source: StoreError },

    /// Persisting a daily fee failed
    #[error("storing daily fee for {plate} failed: {source}")]
    Upsert {
        plate: LicensePlate,
        source: StoreError,
    },

    /// Persisting a crossing failed
    #[error("recording event for {plate} failed: {source}")]
    Record {
        plate: LicensePlate,
        source: StoreError,
    },

    /// The dispatcher has stopped and no longer accepts triggers
    #[error("billing queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker thread could not be started
    #[error("failed to spawn billing worker: {message}")]
    Spawn { message: String },
}
