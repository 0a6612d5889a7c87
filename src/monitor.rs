//! Read-only monitoring consumer.
//!
//! The storage file plus the lock-file convention is the writer's sole
//! interface to readers: discover the most recently modified run file for a
//! name prefix, wrap every read in the same [`with_lock`] discipline the
//! writer uses, and re-read only when the file's modification time
//! advances.
//!
//! A [`Watch`] carries its own [`FaultPolicy`]: a faulty or mid-rotation
//! file can either fail the poll loudly or be logged and treated as
//! "nothing new to show" until the next poll.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::storage::{with_lock, ColumnFile, Columns, RUN_FILE_EXTENSION};
use crate::{DaqError, DaqResult};

/// What a watch does when a poll fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Propagate the error to the caller.
    #[default]
    Propagate,
    /// Log the error and report "nothing new"; retry on the next poll.
    Ignore,
}

/// One locked read of a run file.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The file that was read.
    pub path: PathBuf,
    /// Complete rows in the file at read time.
    pub rows: usize,
    /// The requested columns.
    pub columns: Columns,
}

/// Most recently modified `{prefix}*.dlog` file in `dir`, if any.
pub fn most_recent(dir: &Path, prefix: &str) -> DaqResult<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path.extension().and_then(|e| e.to_str()) == Some(RUN_FILE_EXTENSION)
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix));
        if !matches {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(at, _)| modified > *at) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Read columns from a run file under the exclusive file lock.
///
/// `names` empty means every column.
pub fn read_columns(path: &Path, names: &[String]) -> DaqResult<Snapshot> {
    with_lock(path, || {
        let mut file = ColumnFile::open(path)?;
        let columns = if names.is_empty() {
            file.read_all()?
        } else {
            let mut columns = Columns::new();
            for name in names {
                columns.insert(name.clone(), file.read_column(name)?);
            }
            columns
        };
        Ok(Snapshot {
            path: path.to_path_buf(),
            rows: file.rows(),
            columns,
        })
    })
}

/// Polls one run-file family for fresh data.
pub struct Watch {
    dir: PathBuf,
    prefix: String,
    columns: Vec<String>,
    policy: FaultPolicy,
    last_updated: Option<SystemTime>,
}

impl Watch {
    /// Watch `{prefix}*.dlog` under `dir`, reading every column, failing
    /// loudly on errors.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            columns: Vec::new(),
            policy: FaultPolicy::Propagate,
            last_updated: None,
        }
    }

    /// Restrict reads to the named columns.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the fault policy for this watch.
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// One poll: `None` when there is no run file yet or nothing changed
    /// since the last poll, otherwise a fresh locked snapshot.
    pub fn poll(&mut self) -> DaqResult<Option<Snapshot>> {
        match self.poll_inner() {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => match self.policy {
                FaultPolicy::Propagate => Err(error),
                FaultPolicy::Ignore => {
                    warn!(prefix = %self.prefix, error = %error, "poll failed, ignoring");
                    Ok(None)
                }
            },
        }
    }

    fn poll_inner(&mut self) -> DaqResult<Option<Snapshot>> {
        let Some(path) = most_recent(&self.dir, &self.prefix)? else {
            return Ok(None);
        };
        let modified = std::fs::metadata(&path)?.modified()?;
        if self.last_updated.is_some_and(|at| modified <= at) {
            return Ok(None);
        }
        debug!(file = %path.display(), "updating from run file");
        let snapshot = read_columns(&path, &self.columns)?;
        self.last_updated = Some(modified);
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{column_file, ColumnData, Schema};

    fn schema() -> Schema {
        Schema::new().with_f64("timestamp").with_f64("pressure")
    }

    fn write_rows(path: &Path, base: f64, rows: usize) {
        let mut columns = Columns::new();
        let series = |off: f64| (0..rows).map(|i| base + off + i as f64).collect::<Vec<_>>();
        columns.insert("timestamp".into(), ColumnData::F64(series(0.0)));
        columns.insert("pressure".into(), ColumnData::F64(series(0.5)));
        column_file::write(path, &schema(), &columns).unwrap();
    }

    #[test]
    fn most_recent_picks_newest_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        write_rows(&dir.path().join("PG_old.dlog"), 0.0, 1);
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_rows(&dir.path().join("PG_new.dlog"), 0.0, 1);
        write_rows(&dir.path().join("RTD_other.dlog"), 0.0, 1);
        std::fs::write(dir.path().join("PG_notes.txt"), b"ignored").unwrap();

        let newest = most_recent(dir.path(), "PG").unwrap();
        assert_eq!(newest, Some(dir.path().join("PG_new.dlog")));
    }

    #[test]
    fn most_recent_is_none_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(most_recent(dir.path(), "PG").unwrap(), None);
    }

    #[test]
    fn watch_reports_fresh_data_once_per_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PG_run.dlog");
        write_rows(&path, 0.0, 3);

        let mut watch = Watch::new(dir.path(), "PG").with_columns(vec!["pressure".into()]);

        let snapshot = watch.poll().unwrap().unwrap();
        assert_eq!(snapshot.rows, 3);
        assert_eq!(snapshot.columns.len(), 1);

        // No change: nothing new to show.
        assert_eq!(watch.poll().unwrap(), None);

        // Appended rows advance the mtime and produce a fresh snapshot.
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_rows(&path, 3.0, 2);
        let snapshot = watch.poll().unwrap().unwrap();
        assert_eq!(snapshot.rows, 5);
    }

    #[test]
    fn ignore_policy_swallows_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("PG_bad.dlog"), b"not a run file").unwrap();

        let mut loud = Watch::new(dir.path(), "PG");
        assert!(loud.poll().is_err());

        let mut quiet = Watch::new(dir.path(), "PG").with_fault_policy(FaultPolicy::Ignore);
        assert_eq!(quiet.poll().unwrap(), None);
    }
}
