//! On-disk schema: named, typed columns.
//!
//! A [`Schema`] is the ordered dtype map a protocol declares: one
//! `(name, dtype)` pair per column. It is owned by the protocol instance
//! (built once, never shared between instances) and fixes the run file's
//! layout for the lifetime of the run.

use std::collections::BTreeMap;

use crate::{DaqError, DaqResult};

/// Scalar storage type of one column. All variants are 8-byte little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// IEEE-754 double (the original `'f8'`).
    F64,
    /// Signed 64-bit integer.
    I64,
}

impl Dtype {
    /// Size in bytes of one stored value.
    pub const fn size(self) -> usize {
        8
    }

    /// Single-byte code used in the file header.
    pub(crate) const fn code(self) -> u8 {
        match self {
            Dtype::F64 => 0,
            Dtype::I64 => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Dtype::F64),
            1 => Some(Dtype::I64),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dtype::F64 => write!(f, "f64"),
            Dtype::I64 => write!(f, "i64"),
        }
    }
}

/// One column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Unique column name.
    pub name: String,
    /// Storage type.
    pub dtype: Dtype,
}

/// Ordered dtype map declaring every column of a run file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    /// Empty schema; chain [`Schema::with`] or [`Schema::with_f64`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column declaration.
    pub fn with(mut self, name: impl Into<String>, dtype: Dtype) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            dtype,
        });
        self
    }

    /// Append an `F64` column — the common case for sensor data.
    pub fn with_f64(self, name: impl Into<String>) -> Self {
        self.with(name, Dtype::F64)
    }

    /// Column declarations in on-disk order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when no columns are declared.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Bytes occupied by one row across all columns.
    pub fn row_stride(&self) -> usize {
        self.columns.iter().map(|c| c.dtype.size()).sum()
    }

    /// Position of a column in on-disk order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Byte offset of a column's value within one row.
    pub(crate) fn offset_of(&self, index: usize) -> usize {
        self.columns[..index].iter().map(|c| c.dtype.size()).sum()
    }
}

/// Decoded values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Double-precision values.
    F64(Vec<f64>),
    /// Signed 64-bit integer values.
    I64(Vec<i64>),
}

impl ColumnData {
    /// Storage type of these values.
    pub fn dtype(&self) -> Dtype {
        match self {
            ColumnData::F64(_) => Dtype::F64,
            ColumnData::I64(_) => Dtype::I64,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::F64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
        }
    }

    /// True when the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as `f64`, when the column is `F64`.
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            ColumnData::F64(v) => Some(v),
            ColumnData::I64(_) => None,
        }
    }

    /// Encode the value at `row` into `out`, little-endian.
    pub(crate) fn encode_value(&self, row: usize, out: &mut Vec<u8>) {
        match self {
            ColumnData::F64(v) => out.extend_from_slice(&v[row].to_le_bytes()),
            ColumnData::I64(v) => out.extend_from_slice(&v[row].to_le_bytes()),
        }
    }
}

/// Column map produced by a protocol's `parse()` and consumed by the store.
pub type Columns = BTreeMap<String, ColumnData>;

/// Validate that `columns` covers `schema` exactly: every declared column
/// present with the declared dtype, no strays, and a uniform row count.
///
/// Returns the common row count.
pub(crate) fn check_batch(
    path: &std::path::Path,
    schema: &Schema,
    columns: &Columns,
) -> DaqResult<usize> {
    if schema.is_empty() {
        return Err(DaqError::storage(path, "schema declares no columns"));
    }
    for name in columns.keys() {
        if schema.index_of(name).is_none() {
            return Err(DaqError::storage(
                path,
                format!("column '{}' is not declared by the schema", name),
            ));
        }
    }
    let mut rows = None;
    for def in schema.columns() {
        let data = columns.get(&def.name).ok_or_else(|| {
            DaqError::storage(path, format!("column '{}' missing from batch", def.name))
        })?;
        if data.dtype() != def.dtype {
            return Err(DaqError::storage(
                path,
                format!(
                    "column '{}' has dtype {}, schema declares {}",
                    def.name,
                    data.dtype(),
                    def.dtype
                ),
            ));
        }
        match rows {
            None => rows = Some(data.len()),
            Some(n) if n != data.len() => {
                return Err(DaqError::storage(
                    path,
                    format!(
                        "column '{}' has {} rows, expected {}",
                        def.name,
                        data.len(),
                        n
                    ),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(rows.unwrap_or(0))
}
