//! Append-only columnar run file.
//!
//! One file per run. The layout is a fixed header describing every column
//! (name and dtype, in schema order) followed by row-major fixed-stride
//! records, little-endian. The header is a pure function of the schema and
//! rows are only ever appended, so the final byte image of a file is
//! independent of how the writes were batched: writing S1 then S2 produces
//! exactly the bytes of writing S1∪S2 at once.
//!
//! A process killed mid-append may leave a partial trailing row. That is an
//! accepted failure mode: [`ColumnFile`] exposes only complete rows, and a
//! restarted logger always starts a fresh run file.
//!
//! Callers are responsible for holding the run file's lock (see
//! [`crate::storage::lock`]) around every call — the store itself is
//! lock-agnostic.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::schema::{check_batch, ColumnData, Columns, Dtype, Schema};
use crate::{DaqError, DaqResult};

const MAGIC: [u8; 4] = *b"DLOG";
const VERSION: u16 = 1;

/// Longest column name accepted when decoding a header.
const MAX_NAME_LEN: usize = 256;

/// Persist one batch of parsed columns to `path`.
///
/// If `path` does not exist the file is created: the header is written from
/// `schema`, then the batch rows are appended. If `path` exists the on-disk
/// header must match `schema` exactly, and the batch is appended after the
/// existing rows; bytes already written are never touched.
///
/// The batch must cover every schema column with a uniform row count.
/// Exactly one file is created or mutated per call.
pub fn write(path: &Path, schema: &Schema, columns: &Columns) -> DaqResult<()> {
    let rows = check_batch(path, schema, columns)?;

    let mut file = if path.exists() {
        let mut file = OpenOptions::new().read(true).append(true).open(path)?;
        let (on_disk, _) = decode_header(path, &mut file)?;
        if on_disk != *schema {
            return Err(DaqError::storage(
                path,
                "on-disk schema does not match the writer's schema",
            ));
        }
        file.seek(SeekFrom::End(0))?;
        file
    } else {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(&encode_header(schema))?;
        file
    };

    let mut ordered = Vec::with_capacity(schema.len());
    for def in schema.columns() {
        let data = columns.get(&def.name).ok_or_else(|| {
            DaqError::storage(path, format!("column '{}' missing from batch", def.name))
        })?;
        ordered.push(data);
    }

    let mut buf = Vec::with_capacity(rows * schema.row_stride());
    for row in 0..rows {
        for data in &ordered {
            data.encode_value(row, &mut buf);
        }
    }
    file.write_all(&buf)?;
    file.flush()?;
    Ok(())
}

fn encode_header(schema: &Schema) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(schema.len() as u16).to_le_bytes());
    for def in schema.columns() {
        buf.extend_from_slice(&(def.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(def.name.as_bytes());
        buf.push(def.dtype.code());
    }
    buf
}

fn decode_header(path: &Path, r: &mut impl Read) -> DaqResult<(Schema, usize)> {
    let mut fixed = [0u8; 8];
    r.read_exact(&mut fixed)
        .map_err(|_| DaqError::storage(path, "file too short for header"))?;
    if fixed[..4] != MAGIC {
        return Err(DaqError::storage(path, "bad magic, not a run file"));
    }
    let version = u16::from_le_bytes([fixed[4], fixed[5]]);
    if version != VERSION {
        return Err(DaqError::storage(
            path,
            format!("unsupported format version {}", version),
        ));
    }
    let ncols = u16::from_le_bytes([fixed[6], fixed[7]]) as usize;

    let mut schema = Schema::new();
    let mut header_len = fixed.len();
    for _ in 0..ncols {
        let mut len_buf = [0u8; 2];
        r.read_exact(&mut len_buf)
            .map_err(|_| DaqError::storage(path, "truncated column declaration"))?;
        let name_len = u16::from_le_bytes(len_buf) as usize;
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(DaqError::storage(
                path,
                format!("implausible column name length {}", name_len),
            ));
        }
        let mut name_buf = vec![0u8; name_len];
        r.read_exact(&mut name_buf)
            .map_err(|_| DaqError::storage(path, "truncated column name"))?;
        let name = String::from_utf8(name_buf)
            .map_err(|_| DaqError::storage(path, "column name is not valid UTF-8"))?;
        let mut code = [0u8; 1];
        r.read_exact(&mut code)
            .map_err(|_| DaqError::storage(path, "truncated dtype code"))?;
        let dtype = Dtype::from_code(code[0]).ok_or_else(|| {
            DaqError::storage(path, format!("unknown dtype code {}", code[0]))
        })?;
        schema = schema.with(name, dtype);
        header_len += 2 + name_len + 1;
    }
    Ok((schema, header_len))
}

/// Read-side handle on a run file.
///
/// Exposes the decoded schema, the number of complete rows, and per-column
/// data. Opening takes no lock — wrap calls in the same
/// [`crate::storage::lock::with_lock`] discipline the writer uses.
#[derive(Debug)]
pub struct ColumnFile {
    path: PathBuf,
    file: File,
    schema: Schema,
    header_len: usize,
    rows: usize,
}

impl ColumnFile {
    /// Open `path` and decode its header.
    pub fn open(path: &Path) -> DaqResult<Self> {
        let mut file = File::open(path)?;
        let (schema, header_len) = decode_header(path, &mut file)?;
        let len = file.metadata()?.len() as usize;
        let stride = schema.row_stride();
        let data_len = len.saturating_sub(header_len);
        // A partial trailing row is invisible: only complete rows count.
        let rows = if stride == 0 { 0 } else { data_len / stride };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            schema,
            header_len,
            rows,
        })
    }

    /// Schema decoded from the header.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of complete rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Decode one column by name.
    pub fn read_column(&mut self, name: &str) -> DaqResult<ColumnData> {
        let index = self.schema.index_of(name).ok_or_else(|| {
            DaqError::storage(&self.path, format!("no such column '{}'", name))
        })?;
        let region = self.read_region()?;
        Ok(self.decode_column(&region, index))
    }

    /// Decode every column.
    pub fn read_all(&mut self) -> DaqResult<Columns> {
        let region = self.read_region()?;
        let mut columns = Columns::new();
        for index in 0..self.schema.len() {
            let name = self.schema.columns()[index].name.clone();
            columns.insert(name, self.decode_column(&region, index));
        }
        Ok(columns)
    }

    fn read_region(&mut self) -> DaqResult<Vec<u8>> {
        let mut region = vec![0u8; self.rows * self.schema.row_stride()];
        self.file.seek(SeekFrom::Start(self.header_len as u64))?;
        self.file.read_exact(&mut region)?;
        Ok(region)
    }

    fn decode_column(&self, region: &[u8], index: usize) -> ColumnData {
        let stride = self.schema.row_stride();
        let offset = self.schema.offset_of(index);
        let dtype = self.schema.columns()[index].dtype;
        match dtype {
            Dtype::F64 => {
                let mut values = Vec::with_capacity(self.rows);
                for row in 0..self.rows {
                    let at = row * stride + offset;
                    let mut word = [0u8; 8];
                    word.copy_from_slice(&region[at..at + 8]);
                    values.push(f64::from_le_bytes(word));
                }
                ColumnData::F64(values)
            }
            Dtype::I64 => {
                let mut values = Vec::with_capacity(self.rows);
                for row in 0..self.rows {
                    let at = row * stride + offset;
                    let mut word = [0u8; 8];
                    word.copy_from_slice(&region[at..at + 8]);
                    values.push(i64::from_le_bytes(word));
                }
                ColumnData::I64(values)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn schema() -> Schema {
        Schema::new()
            .with_f64("timestamp")
            .with_f64("pressure")
            .with_f64("temperature")
    }

    fn batch(base: f64, rows: usize) -> Columns {
        let mut columns = Columns::new();
        let series = |off: f64| (0..rows).map(|i| base + off + i as f64).collect::<Vec<_>>();
        columns.insert("timestamp".into(), ColumnData::F64(series(0.0)));
        columns.insert("pressure".into(), ColumnData::F64(series(0.1)));
        columns.insert("temperature".into(), ColumnData::F64(series(0.2)));
        columns
    }

    #[test]
    fn create_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dlog");

        write(&path, &schema(), &batch(100.0, 4)).unwrap();

        let mut file = ColumnFile::open(&path).unwrap();
        assert_eq!(file.schema(), &schema());
        assert_eq!(file.rows(), 4);
        let pressure = file.read_column("pressure").unwrap();
        assert_eq!(
            pressure,
            ColumnData::F64(vec![100.1, 101.1, 102.1, 103.1])
        );
    }

    #[test]
    fn append_grows_all_columns_and_preserves_existing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dlog");

        write(&path, &schema(), &batch(0.0, 10)).unwrap();
        let before = std::fs::read(&path).unwrap();

        write(&path, &schema(), &batch(50.0, 5)).unwrap();
        let after = std::fs::read(&path).unwrap();

        assert!(after.starts_with(&before));

        let mut file = ColumnFile::open(&path).unwrap();
        assert_eq!(file.rows(), 15);
        for name in ["timestamp", "pressure", "temperature"] {
            assert_eq!(file.read_column(name).unwrap().len(), 15);
        }
    }

    #[test]
    fn create_then_append_equals_single_write() {
        let dir = tempfile::tempdir().unwrap();
        let split = dir.path().join("split.dlog");
        let whole = dir.path().join("whole.dlog");

        write(&split, &schema(), &batch(0.0, 7)).unwrap();
        write(&split, &schema(), &batch(7.0, 3)).unwrap();

        let mut union = batch(0.0, 7);
        for (name, data) in batch(7.0, 3) {
            let ColumnData::F64(mut tail) = data else {
                unreachable!()
            };
            match union.get_mut(&name) {
                Some(ColumnData::F64(head)) => head.append(&mut tail),
                _ => unreachable!(),
            }
        }
        write(&whole, &schema(), &union).unwrap();

        assert_eq!(std::fs::read(&split).unwrap(), std::fs::read(&whole).unwrap());
    }

    #[test]
    fn append_rejects_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dlog");

        write(&path, &schema(), &batch(0.0, 2)).unwrap();

        let other = Schema::new().with_f64("timestamp").with_f64("pressure");
        let mut columns = Columns::new();
        columns.insert("timestamp".into(), ColumnData::F64(vec![1.0]));
        columns.insert("pressure".into(), ColumnData::F64(vec![2.0]));

        let err = write(&path, &other, &columns).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn partial_trailing_row_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dlog");

        write(&path, &schema(), &batch(0.0, 3)).unwrap();

        // Simulate a crash mid-append: a few bytes of an unfinished row.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 5]).unwrap();
        drop(file);

        let mut file = ColumnFile::open(&path).unwrap();
        assert_eq!(file.rows(), 3);
        assert_eq!(file.read_column("timestamp").unwrap().len(), 3);
    }

    #[test]
    fn open_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_run.dlog");
        std::fs::write(&path, b"definitely not a run file").unwrap();

        let err = ColumnFile::open(&path).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }
}
