//! Snapshot file for PiKV
//!
//! The table is persisted as JSON lines, one record per line, in key order.
//! Saving writes a sibling `.tmp` file and renames it over the old snapshot.

use crate::error::{PikvError, Result};
use crate::table::Record;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Location of a table snapshot on disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PikvError::Persistence(
                "storage path is empty".to_string(),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file is an empty snapshot.
    pub fn load(&self) -> Result<Vec<Record>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: Record = serde_json::from_str(&line).map_err(|e| {
                PikvError::Persistence(format!(
                    "{}:{}: malformed record: {}",
                    self.path.display(),
                    index + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Replace the snapshot with `records`
    pub fn save(&self, records: &[Record]) -> Result<()> {
        let temp_path = self.temp_path();
        let temp_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut writer = BufWriter::new(temp_file);
        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| PikvError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
