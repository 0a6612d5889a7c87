//! # daqlog
//!
//! A buffered sensor acquisition logger. One process samples a physical
//! sensor at a fixed rate, buffers the samples in memory, and appends them
//! durably to a per-run columnar file; a separate long-running process
//! concurrently reads the same file through a shared locking discipline.
//!
//! ## Crate structure
//!
//! - **`config`**: explicit, serde-validated settings structs for the
//!   logger core and each protocol; unknown keys are rejected.
//! - **`error`**: the central [`DaqError`] enum and [`DaqResult`] alias.
//! - **`logger`**: the [`logger::DataLogger`] core — the read → accumulate
//!   → flush loop with a guaranteed `close()` finalizer.
//! - **`monitor`**: the read-only consumer — most-recent-file discovery,
//!   locked reads, per-watch fault policy.
//! - **`protocol`**: the `init`/`read`/`parse`/`close` instrument contract
//!   and its concrete instantiations (serial pressure gauge, RTD, ADC).
//! - **`serial`**: type-erased async serial transport shared by the serial
//!   protocols and their tests.
//! - **`storage`**: the append-only columnar run-file format and the
//!   cross-process exclusive file lock.
//!
//! ## Example
//!
//! ```no_run
//! use daqlog::config::{LoggerSettings, PressureGaugeSettings};
//! use daqlog::logger::DataLogger;
//! use daqlog::protocol::pressure::PressureGauge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gauge = PressureGauge::new(PressureGaugeSettings {
//!         port: "/dev/ttyUSB0".into(),
//!         baud: 9600,
//!         timeout_ms: 1000,
//!         smoothing: 4,
//!     });
//!     let mut settings = LoggerSettings::new("PG", "./data");
//!     settings.buffer_size = 20;
//!     settings.sample_rate = 10.0;
//!
//!     let mut logger = DataLogger::new(settings, gauge)?;
//!     logger.init().await?;
//!     logger.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod monitor;
pub mod protocol;
pub mod serial;
pub mod storage;

pub use error::{DaqError, DaqResult};
pub use logger::DataLogger;
pub use protocol::{Protocol, Sample};
