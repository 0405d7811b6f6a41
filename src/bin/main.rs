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


use anyhow::Context;
use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use point_wallet::{MAX_POINT_LIMIT, PointLimits, PointService, TransactionType, UserId};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Point Wallet - per-user point balances with charge/use history
#[derive(Parser, Debug)]
#[command(name = "point-wallet")]
#[command(about = "Serves or replays per-user point charge/use requests", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Ceiling on any user's balance
    #[arg(
        long,
        global = true,
        env = "POINT_WALLET_MAX_POINT",
        default_value_t = MAX_POINT_LIMIT,
        value_parser = clap::value_parser!(i64).range(0..)
    )]
    max_point: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "POINT_WALLET_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
    /// Apply a CSV of requests and print the resulting balances
    ///
    /// Expected format: type,user,amount
    /// Example: point-wallet replay requests.csv > balances.csv
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level. Logs go to stderr so replay output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let limits = PointLimits::with_max(cli.max_point);

    match cli.command {
        Command::Serve { bind } => {
            let service = Arc::new(PointService::with_limits(limits));
            let limits = service.limits();
            info!(min = limits.min, max = limits.max, "point limits");
            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            point_wallet::http::serve(listener, service)
                .await
                .context("serving HTTP")?;
        }
        Command::Replay { input } => {
            let file = File::open(&input)
                .with_context(|| format!("opening file '{}'", input.display()))?;
            let service = process_requests(BufReader::new(file), limits)
                .context("processing requests")?;
            write_balances(&service, std::io::stdout()).context("writing output")?;
        }
    }

    Ok(())
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    kind: String,
    user: i64,
    amount: i64,
}

/// Applies requests from a CSV reader in file order.
///
/// Malformed rows, unknown types and rejected requests are logged and
/// skipped.
///
/// # CSV Format
///
/// ```csv
/// type,user,amount
/// charge,1,100
/// use,1,30
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn process_requests<R: Read>(reader: R, limits: PointLimits) -> Result<PointService, csv::Error> {
    let service = PointService::with_limits(limits);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0usize;
    let mut skipped = 0usize;
    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };

        let kind: TransactionType = match record.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(row, error = %e, "skipping row");
                skipped += 1;
                continue;
            }
        };

        match service.apply(UserId(record.user), kind, record.amount) {
            Ok(_) => applied += 1,
            // Rejections are already logged by the service.
            Err(_) => skipped += 1,
        }
    }

    info!(applied, skipped, max_point = service.limits().max, "replay finished");
    Ok(service)
}

/// Writes every user balance as CSV.
///
/// # CSV Format
///
/// Columns: `id, point, updateMillis`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_balances<W: Write>(service: &PointService, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for balance in service.balances().snapshot() {
        wtr.serialize(balance)?;
    }

    wtr.flush()?;
    Ok(())
}
