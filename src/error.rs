//! Custom error types for the acquisition logger.
//!
//! This module defines the primary error type, [`DaqError`], used across the
//! crate. Configuration problems, instrument communication failures, and
//! storage-format violations all funnel into this one enum so that the
//! acquisition loop has a single propagation path: any error escaping the
//! loop triggers the protocol's `close()` and then aborts the run.
//!
//! Lock contention is deliberately absent from this taxonomy — acquiring the
//! file lock blocks until it succeeds and is never reported as an error.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition logger.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration file parsing failed.
    ///
    /// Wraps `config::ConfigError` from the `config` crate: syntax errors,
    /// missing required fields, or type mismatches in a settings file.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration validation failed.
    ///
    /// Values parsed correctly but fail semantic validation, e.g. a zero
    /// buffer size or a non-positive sample rate. Raised before `init()` is
    /// ever called.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    ///
    /// File creation, append, directory scans, and lock-file handling all
    /// surface their failures here (permissions, disk full, missing paths).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Instrument hardware error.
    ///
    /// Raised when a device cannot be opened, does not respond during
    /// initialization, or fails mid-communication. A missing identification
    /// response at startup is fatal and aborts the run before any file is
    /// created.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// A device response could not be interpreted.
    ///
    /// Covers frames with too few delimited fields and unparseable values,
    /// including the empty/partial response left behind by a read timeout.
    /// Never silently replaced by a zero-filled sample.
    #[error("Malformed response {response:?}: {reason}")]
    MalformedResponse {
        /// The response text as received (terminator stripped).
        response: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Storage format violation in a run file.
    ///
    /// Bad magic or version, a header that does not match the writer's
    /// schema, a column missing from a flush, or row-count mismatches
    /// between columns of one batch.
    #[error("Storage error in {path}: {message}")]
    Storage {
        /// The run file involved.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A sample's arity does not match the protocol's declared schema.
    #[error("Sample has {got} values, schema declares {expected} columns")]
    SampleArity {
        /// Columns declared by the schema.
        expected: usize,
        /// Values produced by `read()`.
        got: usize,
    },

    /// Serial support not compiled into the binary.
    ///
    /// Rebuild with `--features instrument_serial`.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

impl DaqError {
    /// Shorthand for a [`DaqError::Storage`] value.
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        DaqError::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`DaqError::MalformedResponse`] value.
    pub fn malformed(response: impl Into<String>, reason: impl Into<String>) -> Self {
        DaqError::MalformedResponse {
            response: response.into(),
            reason: reason.into(),
        }
    }
}
