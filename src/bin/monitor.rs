//! Tail the most recent run file of a data directory.
//!
//! Read-only consumer: discovers the newest matching run file, reads it
//! under the same lock discipline the logger writes with, and prints one
//! JSON line per update with the latest value of each column — a plottable
//! feed for whatever front-end sits downstream.
//!
//! ```bash
//! monitor ./data --prefix PG --refresh-rate 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use daqlog::monitor::{FaultPolicy, Watch};
use daqlog::storage::ColumnData;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnError {
    /// Fail loudly on read errors
    Fail,
    /// Log read errors and keep polling
    Ignore,
}

impl From<OnError> for FaultPolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Fail => FaultPolicy::Propagate,
            OnError::Ignore => FaultPolicy::Ignore,
        }
    }
}

#[derive(Parser)]
#[command(name = "monitor")]
#[command(about = "Tail the most recent run file of a data directory", long_about = None)]
struct Cli {
    /// The data directory to monitor
    dir: PathBuf,

    /// Run-file name prefix to match
    #[arg(long, default_value = "PG")]
    prefix: String,

    /// Columns to read (default: all)
    #[arg(long)]
    columns: Vec<String>,

    /// How often to check for updated run files, in seconds
    #[arg(long, default_value_t = 5.0)]
    refresh_rate: f64,

    /// What to do when a read fails
    #[arg(long, value_enum, default_value_t = OnError::Fail)]
    on_error: OnError,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if !(cli.refresh_rate.is_finite() && cli.refresh_rate > 0.0) {
        anyhow::bail!("refresh_rate must be a positive number of seconds");
    }

    let mut watch = Watch::new(&cli.dir, &cli.prefix)
        .with_columns(cli.columns.clone())
        .with_fault_policy(cli.on_error.into());

    loop {
        if let Some(snapshot) = watch.poll()? {
            let mut latest = serde_json::Map::new();
            latest.insert(
                "file".into(),
                snapshot
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
                    .into(),
            );
            latest.insert("rows".into(), snapshot.rows.into());
            for (name, data) in &snapshot.columns {
                let value: serde_json::Value = match data {
                    ColumnData::F64(values) => values.last().copied().into(),
                    ColumnData::I64(values) => values.last().copied().into(),
                };
                latest.insert(name.clone(), value);
            }
            println!("{}", serde_json::Value::Object(latest));
        }
        std::thread::sleep(Duration::from_secs_f64(cli.refresh_rate));
    }
}
