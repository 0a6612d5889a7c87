//! Logger core: the read → accumulate → flush loop.
//!
//! A [`DataLogger`] owns the sample buffer and the run's filename, drives a
//! [`Protocol`](crate::protocol::Protocol) at a fixed rate, and persists
//! full buffers through the column store under the exclusive file lock.
//! Buffering amortizes the locked file I/O across many samples at the cost
//! of a bounded loss window: up to `buffer_size - 1` unflushed samples on a
//! crash.
//!
//! Lifecycle: construction validates settings and fixes the run filename;
//! `init()` runs the protocol's one-time setup (failure aborts startup
//! before any file exists); `run()`/`run_until()` consume the logger and
//! loop until an error escapes or the shutdown future resolves — either
//! way, `close()` runs exactly once as a guaranteed finalizer before the
//! outcome is returned.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::LoggerSettings;
use crate::protocol::{Protocol, Sample};
use crate::storage::{column_file, with_lock, RUN_FILE_EXTENSION};
use crate::{DaqError, DaqResult};

/// Run filename: `{name}_{YYYY-MM-DD}_{HH-MM-SS}.dlog` under `outdir`.
pub(crate) fn run_filename(outdir: &Path, name: &str, now: DateTime<Local>) -> PathBuf {
    outdir.join(format!(
        "{}_{}.{}",
        name,
        now.format("%Y-%m-%d_%H-%M-%S"),
        RUN_FILE_EXTENSION
    ))
}

/// Acquisition loop driving one protocol into one run file.
pub struct DataLogger<P: Protocol> {
    settings: LoggerSettings,
    protocol: P,
    filename: PathBuf,
    buffer: Vec<Sample>,
}

impl<P: Protocol> DataLogger<P> {
    /// Validate settings and fix the run filename from the current local
    /// time. The file itself is not created until the first flush.
    pub fn new(settings: LoggerSettings, protocol: P) -> DaqResult<Self> {
        settings.validate()?;
        std::fs::create_dir_all(&settings.outdir)?;
        let filename = run_filename(&settings.outdir, &settings.name, Local::now());
        info!(
            name = %settings.name,
            file = %filename.display(),
            buffer_size = settings.buffer_size,
            sample_rate = settings.sample_rate,
            "created logger"
        );
        let buffer = Vec::with_capacity(settings.buffer_size);
        Ok(Self {
            settings,
            protocol,
            filename,
            buffer,
        })
    }

    /// The run file this logger appends to. Fixed for the logger's
    /// lifetime, across all flushes.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Samples currently buffered in memory.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// One-time protocol setup. Must be called exactly once before the
    /// loop; failure is fatal.
    pub async fn init(&mut self) -> DaqResult<()> {
        self.protocol.init().await
    }

    /// Run the acquisition loop until an error escapes it.
    pub async fn run(self) -> DaqResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the acquisition loop until an error escapes it or `shutdown`
    /// resolves.
    ///
    /// In both cases the protocol's `close()` runs exactly once before the
    /// outcome is returned; close errors are logged, never masking the
    /// original failure.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()> + Send) -> DaqResult<()> {
        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
                step = self.step() => {
                    if let Err(error) = step {
                        break Err(error);
                    }
                }
            }
        };
        if let Err(close_error) = self.protocol.close().await {
            warn!(error = %close_error, "close failed during teardown");
        }
        result
    }

    async fn step(&mut self) -> DaqResult<()> {
        self.tick().await?;
        tokio::time::sleep(Duration::from_secs_f64(1.0 / self.settings.sample_rate)).await;
        Ok(())
    }

    /// One loop iteration without the inter-sample sleep: read one sample,
    /// buffer it, and flush when the buffer reaches `buffer_size` rows.
    ///
    /// Returns whether a flush happened.
    pub async fn tick(&mut self) -> DaqResult<bool> {
        let sample = self.protocol.read().await?;
        let expected = self.protocol.schema().len();
        if sample.len() != expected {
            return Err(DaqError::SampleArity {
                expected,
                got: sample.len(),
            });
        }
        debug!(sample = ?sample, "sample acquired");
        self.buffer.push(sample);
        if self.buffer.len() >= self.settings.buffer_size {
            self.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Persist the buffered samples under the file lock, then clear the
    /// buffer. Lock acquisition and file I/O are synchronous and run on a
    /// blocking-task thread; sampling never overlaps a flush.
    async fn flush(&mut self) -> DaqResult<()> {
        debug!(
            rows = self.buffer.len(),
            file = %self.filename.display(),
            "flushing buffer"
        );
        let columns = self.protocol.parse(&self.buffer)?;
        let schema = self.protocol.schema().clone();
        let path = self.filename.clone();
        tokio::task::spawn_blocking(move || {
            with_lock(&path, || column_file::write(&path, &schema, &columns))
        })
        .await
        .map_err(|e| DaqError::Io(std::io::Error::other(e)))??;
        self.buffer.clear();
        Ok(())
    }
}
