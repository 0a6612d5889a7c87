//! Append-only columnar storage for run files.
//!
//! - [`schema`]: the ordered dtype map and decoded column data
//! - [`column_file`]: the on-disk format (create / append / read)
//! - [`lock`]: the cross-process exclusive lock wrapped around every access

pub mod column_file;
pub mod lock;
pub mod schema;

pub use column_file::ColumnFile;
pub use lock::with_lock;
pub use schema::{ColumnData, ColumnDef, Columns, Dtype, Schema};

/// File extension of run files.
pub const RUN_FILE_EXTENSION: &str = "dlog";
