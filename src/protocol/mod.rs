//! Acquisition protocol contract and concrete instruments.
//!
//! A [`Protocol`] is the capability set the logger core drives: one-time
//! `init`, a `read` per tick producing a fixed-arity [`Sample`], a pure
//! `parse` regrouping buffered samples into named columns, and an idempotent
//! best-effort `close`. Each implementation owns its [`Schema`] — built once
//! per instance, never shared.
//!
//! Shipped instruments:
//! - [`pressure`]: serial pressure gauge, a request/response state machine
//!   with framing, timeouts, averaging, and min/max bookkeeping
//! - [`rtd`]: resistance thermometer over an injected sensor capability
//! - [`adc`]: analog-to-digital converter over an injected source
//!   capability, with a channel-derived schema

pub mod adc;
pub mod pressure;
pub mod rtd;

use async_trait::async_trait;

use crate::storage::{ColumnData, Columns, Dtype, Schema};
use crate::{DaqError, DaqResult};

/// One acquisition result: an ordered tuple of scalar values whose arity and
/// field order are fixed by the concrete protocol's schema.
pub type Sample = Vec<f64>;

/// Capability set of one instrument, driven by the logger core.
///
/// The timing contract: `read` executes once per tick on the hot path and
/// must be safe to call repeatedly. The buffering contract: its outputs are
/// buffered and later handed to `parse` in bulk, not one at a time.
#[async_trait]
pub trait Protocol: Send {
    /// Short instrument name, used in log output and run filenames.
    fn name(&self) -> &str;

    /// The instance-owned dtype map declaring the on-disk columns.
    ///
    /// Stable after `init()` returns; for most protocols it is fixed at
    /// construction.
    fn schema(&self) -> &Schema;

    /// One-time setup (device discovery, fault clearing, calibration).
    ///
    /// Invoked exactly once before the acquisition loop starts. Failure is
    /// fatal and aborts startup before any run file exists.
    async fn init(&mut self) -> DaqResult<()>;

    /// Produce one sample.
    async fn read(&mut self) -> DaqResult<Sample>;

    /// Regroup buffered row-oriented samples into named columns.
    ///
    /// Pure transform, no I/O. The result covers every schema column with
    /// one value per input sample.
    fn parse(&self, samples: &[Sample]) -> DaqResult<Columns>;

    /// Best-effort teardown. Idempotent; runs even after a mid-cycle
    /// failure.
    async fn close(&mut self) -> DaqResult<()>;
}

/// Transpose row-oriented samples into the schema's named columns.
///
/// Every shipped protocol parses this way: sample `i`'s `j`-th value lands
/// in row `i` of the schema's `j`-th column. Samples whose arity differs
/// from the schema are rejected.
pub fn transpose(schema: &Schema, samples: &[Sample]) -> DaqResult<Columns> {
    for sample in samples {
        if sample.len() != schema.len() {
            return Err(DaqError::SampleArity {
                expected: schema.len(),
                got: sample.len(),
            });
        }
    }
    let mut columns = Columns::new();
    for (index, def) in schema.columns().iter().enumerate() {
        let data = match def.dtype {
            Dtype::F64 => ColumnData::F64(samples.iter().map(|s| s[index]).collect()),
            Dtype::I64 => ColumnData::I64(samples.iter().map(|s| s[index] as i64).collect()),
        };
        columns.insert(def.name.clone(), data);
    }
    Ok(columns)
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn epoch_seconds() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) * 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_regroups_rows_into_columns() {
        let schema = Schema::new().with_f64("timestamp").with_f64("value");
        let samples = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];

        let columns = transpose(&schema, &samples).unwrap();
        assert_eq!(
            columns.get("timestamp"),
            Some(&ColumnData::F64(vec![1.0, 2.0, 3.0]))
        );
        assert_eq!(
            columns.get("value"),
            Some(&ColumnData::F64(vec![10.0, 20.0, 30.0]))
        );
    }

    #[test]
    fn transpose_rejects_wrong_arity() {
        let schema = Schema::new().with_f64("timestamp").with_f64("value");
        let samples = vec![vec![1.0, 10.0], vec![2.0]];

        let err = transpose(&schema, &samples).unwrap_err();
        assert!(matches!(
            err,
            DaqError::SampleArity {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn epoch_seconds_is_recent() {
        // Sanity bound: after 2020, before 2100.
        let now = epoch_seconds();
        assert!(now > 1.577e9 && now < 4.1e9);
    }
}
