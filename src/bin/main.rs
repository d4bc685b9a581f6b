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

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use toll_billing::{
    AppConfig, BillingContext, Clock, Dispatcher, FailurePolicy, FeeEngine, LicensePlate,
    ManualClock, MemoryStore, SystemClock, TollEvent, TollService, VehicleType,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Toll Billing - Compute daily congestion fees from a crossings CSV
///
/// Records every crossing, bills the plates through the batching pipeline,
/// and writes the resulting daily fees to stdout.
#[derive(Parser, Debug)]
#[command(name = "toll-billing")]
#[command(about = "Computes daily congestion fees from a toll crossings CSV", long_about = None)]
struct Args {
    /// Path to CSV file with crossings
    ///
    /// Expected format: license_plate,event_start,vehicle_type
    /// Example: cargo run -- crossings.csv > fees.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON file with dispatcher settings and fee rules
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bill as of this day instead of today (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    buffer_size: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Keep billing the rest of a batch when storing one fee fails
    #[arg(long)]
    best_effort: bool,
}

fn main() {
    // Logs go to stderr; stdout carries the fee CSV.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "toll_billing=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(2);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open input");
            process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = match args.date {
        // Last second of the day, so every crossing on it counts as past.
        Some(date) => Arc::new(ManualClock::new(
            date.and_time(NaiveTime::MIN) + TimeDelta::days(1) - TimeDelta::seconds(1),
        )),
        None => Arc::new(SystemClock),
    };

    let store = match bill_crossings(BufReader::new(file), config, clock) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "processing crossings failed");
            process::exit(1);
        }
    };

    if let Err(e) = write_fees(&store, std::io::stdout()) {
        error!(error = %e, "writing output failed");
        process::exit(1);
    }
}

/// Reads the optional config file and applies command-line overrides.
fn load_config(args: &Args) -> Result<AppConfig, toll_billing::ConfigError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };

    let dispatcher = &mut config.dispatcher;
    if let Some(workers) = args.workers {
        dispatcher.worker_count = workers;
    }
    if let Some(buffer_size) = args.buffer_size {
        dispatcher.buffer_size = buffer_size;
    }
    if let Some(batch_size) = args.batch_size {
        dispatcher.batch_size_limit = batch_size;
    }
    if let Some(ms) = args.flush_interval_ms {
        dispatcher.flush_interval = Duration::from_millis(ms);
    }
    if args.best_effort {
        dispatcher.failure_policy = FailurePolicy::BestEffort;
    }

    config.validate()?;
    Ok(config)
}

/// Raw CSV record matching the input format.
///
/// Fields: `license_plate, event_start, vehicle_type`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    license_plate: String,
    event_start: NaiveDateTime,
    vehicle_type: VehicleType,
}

/// Records crossings from a CSV reader and bills every plate seen.
///
/// Rows are streamed, so input size is not bounded by memory beyond the store
/// itself. Malformed rows and rejected crossings are logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// license_plate,event_start,vehicle_type
/// ABC123,2025-02-03T07:00:00,car
/// XYZ999,2025-02-03T07:30:00,tractor
/// ```
///
/// # Errors
///
/// Returns an error if the CSV structure is unreadable or the dispatcher
/// cannot start.
pub fn bill_crossings<R: Read>(
    reader: R,
    config: AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<MemoryStore>, Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let context = Arc::new(BillingContext::new(
        store.clone(),
        FeeEngine::new(config.rules),
        Arc::clone(&clock),
    ));
    let dispatcher = Dispatcher::start(context, config.dispatcher)?;
    let service = TollService::new(store.clone(), Arc::clone(&clock), dispatcher.trigger());

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let (mut recorded, mut skipped) = (0usize, 0usize);
    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };

        let outcome = LicensePlate::new(record.license_plate).and_then(|plate| {
            service.record(TollEvent::observed(
                plate,
                record.event_start,
                record.vehicle_type,
                clock.now(),
            ))
        });
        match outcome {
            Ok(()) => recorded += 1,
            Err(e) => {
                warn!(error = %e, "skipping crossing");
                skipped += 1;
            }
        }
    }

    dispatcher.shutdown();
    info!(recorded, skipped, "all crossings billed");
    Ok(store)
}

/// Writes every stored daily fee as CSV.
///
/// Columns: `date, license_plate, fee`
pub fn write_fees<W: Write>(store: &MemoryStore, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for fee in store.daily_fees() {
        wtr.serialize(&fee)?;
    }
    wtr.flush()?;
    Ok(())
}
