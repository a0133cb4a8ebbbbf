use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::market_records::{TransactionRecord, STORE_COLUMN_COUNT, STORE_HEADERS};
use crate::record_store::RecordStore;

/// Sheet-like file store: row 1 is the header, data starts at row 2.
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    path: PathBuf,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn ends_without_newline(path: &Path) -> Result<bool, String> {
    let mut file = fs::File::open(path).map_err(|e| format!("open csv store failed: {e}"))?;
    let len = file
        .metadata()
        .map_err(|e| format!("stat csv store failed: {e}"))?
        .len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))
        .map_err(|e| format!("seek csv store failed: {e}"))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)
        .map_err(|e| format!("read csv store failed: {e}"))?;
    Ok(last[0] != b'\n')
}

impl RecordStore for CsvRecordStore {
    fn read_all(&self) -> Result<Vec<TransactionRecord>, String> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| format!("open csv store failed: {e}"))?;

        let mut out = Vec::new();
        for (idx, row) in rdr.records().enumerate() {
            let row = row.map_err(|e| format!("read csv store failed: {e}"))?;
            // Sheet numbering: header is row 1.
            let sheet_row = idx + 2;
            let cells = row.iter().map(str::to_string).collect::<Vec<_>>();
            if cells.len() != STORE_COLUMN_COUNT {
                return Err(format!(
                    "csv store row {sheet_row} has {} columns, expected {STORE_COLUMN_COUNT}",
                    cells.len()
                ));
            }
            out.push(
                TransactionRecord::from_row(&cells)
                    .map_err(|e| format!("csv store row {sheet_row}: {e}"))?,
            );
        }
        Ok(out)
    }

    fn append(&mut self, records: &[TransactionRecord]) -> Result<usize, String> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| format!("create csv store dir failed: {e}"))?;
            }
        }

        let fresh = !self.path.exists() || fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let needs_newline = !fresh && ends_without_newline(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("open csv store for append failed: {e}"))?;
        if needs_newline {
            file.write_all(b"\n")
                .map_err(|e| format!("write csv store failed: {e}"))?;
        }

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if fresh {
            wtr.write_record(STORE_HEADERS)
                .map_err(|e| format!("write csv header failed: {e}"))?;
        }
        for rec in records {
            wtr.write_record(rec.to_row())
                .map_err(|e| format!("write csv row failed: {e}"))?;
        }
        wtr.flush().map_err(|e| format!("flush csv store failed: {e}"))?;
        Ok(records.len())
    }
}
