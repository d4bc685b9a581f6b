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

//! Static configuration for the billing pipeline.
//!
//! Everything here is fixed once the [`Dispatcher`](crate::Dispatcher) starts.
//! An [`AppConfig`] can be loaded from JSON; omitted fields take their defaults:
//!
//! ```json
//! {
//!   "dispatcher": { "worker_count": 4, "flush_interval_ms": 250 },
//!   "rules": { "daily_cap": 60, "holidays": ["2025-12-25"] }
//! }
//! ```

use crate::ConfigError;
use crate::rules::FeeSchedule;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

/// What a flush does when storing one plate's fee fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abandon the rest of the batch.
    #[default]
    FailFast,
    /// Log the failure and keep billing the remaining plates.
    BestEffort,
}

/// Worker pool and batching settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    /// Capacity of the shared trigger queue; triggers block once it is full.
    pub buffer_size: usize,
    /// A worker flushes as soon as its batch holds this many plates.
    pub batch_size_limit: usize,
    /// A worker flushes whatever it holds at least this often.
    #[serde(rename = "flush_interval_ms", with = "millis")]
    pub flush_interval: Duration,
    pub failure_policy: FailurePolicy,
}

impl DispatcherConfig {
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any size or the flush interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        if self.batch_size_limit == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            buffer_size: 1000,
            batch_size_limit: 100,
            flush_interval: Duration::from_secs(1),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

/// Complete configuration of the billing core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub rules: FeeSchedule,
}

impl AppConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Parse`] - The input is not valid JSON for this shape.
    /// - Any error from [`DispatcherConfig::validate`] or [`FeeSchedule::validate`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_reader(reader).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be opened, otherwise
    /// the errors of [`from_reader`](Self::from_reader).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher.validate()?;
        self.rules.validate()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
