//! Append-only CSV time-series database.
//!
//! Layout: a header line (`id,timestamp,<flattened columns...>`) followed by
//! one row per sample. Nested row maps are flattened with `.`-joined keys
//! (`sensors.flow0.value`). Rows are strictly append-only and timestamps are
//! monotone, which is what makes the byte-offset binary search in
//! [`CsvDatabase::cursor_since`] valid.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const INDEX_COL: &str = "id";
const TIMESTAMP_COL: &str = "timestamp";

/// Flatten a nested row into `.`-joined columns. Non-numeric leaves are
/// dropped with a warning.
pub fn flatten_row(row: &Value) -> BTreeMap<String, f64> {
    let mut flat = BTreeMap::new();
    flatten_into(row, "", &mut flat);
    flat
}

fn flatten_into(value: &Value, prefix: &str, out: &mut BTreeMap<String, f64>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let full = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, &full, out);
            }
        }
        other => match other.as_f64() {
            Some(v) => {
                out.insert(prefix.to_string(), v);
            }
            None => warn!("dropping non-numeric value at `{}`", prefix),
        },
    }
}

/// Rebuild a nested row from header columns and one line of values.
pub fn unflatten_row(columns: &[String], values: &[f64]) -> Value {
    let mut root = Map::new();
    for (key, &value) in columns.iter().zip(values) {
        insert_path(&mut root, key, value);
    }
    Value::Object(root)
}

fn insert_path(root: &mut Map<String, Value>, path: &str, value: f64) {
    let mut cur = root;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            cur.insert(part.to_string(), Value::from(value));
            return;
        }
        let entry = cur
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        // just ensured above
        cur = entry.as_object_mut().unwrap();
    }
}

pub struct CsvDatabase {
    path: PathBuf,
    columns: Vec<String>,
    /// Byte offset of the first data row; 0 until a header exists.
    begin_pos: u64,
    next_id: u64,
    last_timestamp: Option<f64>,
}

impl CsvDatabase {
    /// Open a database file, recovering the header, the next row id and the
    /// newest timestamp. A missing file is fine; it is created on the first
    /// insert.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut db = CsvDatabase {
            path: path.as_ref().to_path_buf(),
            columns: Vec::new(),
            begin_pos: 0,
            next_id: 0,
            last_timestamp: None,
        };

        match File::open(&db.path) {
            Ok(file) => db.recover(file)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(db)
    }

    fn recover(&mut self, file: File) -> Result<()> {
        let mut reader = BufReader::new(file);
        let mut header = String::new();
        let header_len = reader.read_line(&mut header)?;
        if header_len == 0 {
            return Ok(()); // empty file
        }

        self.columns = header.trim_end().split(',').map(str::to_string).collect();
        for required in [INDEX_COL, TIMESTAMP_COL] {
            if !self.columns.iter().any(|c| c == required) {
                return Err(Error::MalformedPayload(format!(
                    "database {} is missing the `{}` column",
                    self.path.display(),
                    required
                )));
            }
        }
        self.begin_pos = header_len as u64;

        let id_index = self.column_index(INDEX_COL);
        let ts_index = self.column_index(TIMESTAMP_COL);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let parts: Vec<&str> = line.trim_end().split(',').collect();
            if let Some(id) = parts.get(id_index).and_then(|v| v.parse::<f64>().ok()) {
                self.next_id = id as u64 + 1;
            }
            if let Some(ts) = parts.get(ts_index).and_then(|v| v.parse::<f64>().ok()) {
                self.last_timestamp = Some(ts);
            }
        }

        Ok(())
    }

    fn column_index(&self, name: &str) -> usize {
        // columns verified on recovery / written by insert
        self.columns.iter().position(|c| c == name).unwrap_or(0)
    }

    pub fn filename(&self) -> String {
        self.path.display().to_string()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Append a row, stamping it with the next id and the given timestamp.
    /// The first insert fixes the column set; later keys outside it are
    /// dropped with a warning.
    pub fn insert_at(&mut self, row: &Value, timestamp: f64) -> Result<()> {
        let mut flat = flatten_row(row);
        flat.insert(INDEX_COL.to_string(), self.next_id as f64);
        flat.insert(TIMESTAMP_COL.to_string(), timestamp);
        self.next_id += 1;

        let mut output = OpenOptions::new().create(true).append(true).open(&self.path)?;

        if self.begin_pos == 0 {
            self.columns = vec![INDEX_COL.to_string(), TIMESTAMP_COL.to_string()];
            for key in flat.keys() {
                if key != INDEX_COL && key != TIMESTAMP_COL {
                    self.columns.push(key.clone());
                }
            }
            let header = self.columns.join(",") + "\n";
            output.write_all(header.as_bytes())?;
            self.begin_pos = header.len() as u64;
        }

        let values: Vec<String> = self
            .columns
            .iter()
            .map(|key| format!("{}", flat.get(key).copied().unwrap_or(0.0)))
            .collect();
        output.write_all((values.join(",") + "\n").as_bytes())?;

        let unwritten: Vec<&String> =
            flat.keys().filter(|k| !self.columns.contains(k)).collect();
        if !unwritten.is_empty() {
            warn!(
                "{}: not writing values outside the header: {:?}",
                self.filename(),
                unwritten
            );
        }

        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Reader positioned at the first data row.
    pub fn cursor_begin(&self) -> Result<RowCursor> {
        if self.begin_pos == 0 {
            return Ok(RowCursor::empty());
        }
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(self.begin_pos))?;
        Ok(RowCursor::new(self.columns.clone(), reader))
    }

    /// Reader positioned by binary search at the newest row with
    /// `timestamp <= target` (so the caller sees one boundary-or-older row
    /// first, then everything after it). Falls back to the first row when
    /// nothing is old enough.
    pub fn cursor_since(&self, target: f64) -> Result<RowCursor> {
        if self.begin_pos == 0 {
            return Ok(RowCursor::empty());
        }

        let ts_index = self.column_index(TIMESTAMP_COL);
        let mut reader = BufReader::new(File::open(&self.path)?);
        let file_size = reader.seek(SeekFrom::End(0))?;

        let mut lo = self.begin_pos;
        let mut hi = file_size;
        let mut best_pos = self.begin_pos;
        let mut line = String::new();

        while lo < hi {
            let mid = (lo + hi) / 2;
            reader.seek(SeekFrom::Start(mid))?;

            // skip the partial line we probably landed inside
            if mid != self.begin_pos {
                line.clear();
                reader.read_line(&mut line)?;
            }

            let pos = reader.stream_position()?;
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                hi = mid;
                continue;
            }

            let ts = line
                .trim_end()
                .split(',')
                .nth(ts_index)
                .and_then(|v| v.parse::<f64>().ok());
            match ts {
                Some(ts) if ts <= target => {
                    best_pos = pos;
                    lo = reader.stream_position()?;
                }
                _ => hi = mid,
            }
        }

        reader.seek(SeekFrom::Start(best_pos))?;
        Ok(RowCursor::new(self.columns.clone(), reader))
    }
}

/// Forward reader over the data rows of a [`CsvDatabase`].
pub struct RowCursor {
    columns: Vec<String>,
    reader: Option<BufReader<File>>,
}

impl RowCursor {
    fn new(columns: Vec<String>, reader: BufReader<File>) -> Self {
        RowCursor { columns, reader: Some(reader) }
    }

    fn empty() -> Self {
        RowCursor { columns: Vec::new(), reader: None }
    }

    /// Read the next row, or `None` at end of file. Lines that do not parse
    /// are skipped with a warning.
    pub fn read(&mut self) -> Result<Option<Value>> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            let values: std::result::Result<Vec<f64>, _> =
                line.trim_end().split(',').map(str::parse::<f64>).collect();
            match values {
                Ok(values) if values.len() == self.columns.len() => {
                    return Ok(Some(unflatten_row(&self.columns, &values)));
                }
                _ => warn!("skipping malformed row: {}", line.trim_end()),
            }
        }
    }

    /// Drain the remaining rows.
    pub fn read_all(&mut self) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(row) = self.read()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_db_path() -> PathBuf {
        let n = SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "waternet-csvdb-{}-{}.csv",
            std::process::id(),
            n
        ))
    }

    fn sample_row(flow: f64) -> Value {
        json!({
            "sensors": {"flow0": {"value": flow}, "pressure0": {"value": flow / 2.0}},
            "valves": {"valve0": {"value": 1.0}, "change_time": 0.5},
        })
    }

    #[test]
    fn test_flatten_unflatten_roundtrip() {
        let row = sample_row(3.25);
        let flat = flatten_row(&row);
        assert_eq!(flat["sensors.flow0.value"], 3.25);
        assert_eq!(flat["valves.change_time"], 0.5);

        let columns: Vec<String> = flat.keys().cloned().collect();
        let values: Vec<f64> = flat.values().copied().collect();
        assert_eq!(unflatten_row(&columns, &values), row);
    }

    #[test]
    fn test_insert_and_cursor_begin() {
        let path = temp_db_path();
        let mut db = CsvDatabase::open(&path).unwrap();
        db.insert_at(&sample_row(1.0), 10.0).unwrap();
        db.insert_at(&sample_row(2.0), 11.0).unwrap();

        let rows = db.cursor_begin().unwrap().read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(0.0));
        assert_eq!(rows[0]["timestamp"], json!(10.0));
        assert_eq!(rows[1]["sensors"]["flow0"]["value"], json!(2.0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_reopen_recovers_ids_and_timestamp() {
        let path = temp_db_path();
        {
            let mut db = CsvDatabase::open(&path).unwrap();
            db.insert_at(&sample_row(1.0), 10.0).unwrap();
            db.insert_at(&sample_row(2.0), 11.5).unwrap();
        }

        let mut db = CsvDatabase::open(&path).unwrap();
        assert_eq!(db.last_timestamp(), Some(11.5));
        db.insert_at(&sample_row(3.0), 12.0).unwrap();

        let rows = db.cursor_begin().unwrap().read_all().unwrap();
        assert_eq!(rows[2]["id"], json!(2.0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cursor_since_binary_search() {
        let path = temp_db_path();
        let mut db = CsvDatabase::open(&path).unwrap();
        for i in 0..100 {
            db.insert_at(&sample_row(i as f64), 100.0 + i as f64).unwrap();
        }

        // Lands on the newest row at-or-before the target, then forward.
        let rows = db.cursor_since(150.0).unwrap().read_all().unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0]["timestamp"], json!(150.0));

        // Before the first row: everything.
        let rows = db.cursor_since(0.0).unwrap().read_all().unwrap();
        assert_eq!(rows.len(), 100);

        // After the last row: just the boundary row.
        let rows = db.cursor_since(1e9).unwrap().read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["timestamp"], json!(199.0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_empty_database_cursors() {
        let path = temp_db_path();
        let db = CsvDatabase::open(&path).unwrap();
        assert!(db.cursor_begin().unwrap().read_all().unwrap().is_empty());
        assert!(db.cursor_since(5.0).unwrap().read_all().unwrap().is_empty());
    }
}
