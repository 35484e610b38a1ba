//! Append-only CSV dataset of labeled snippets

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vulnsentry_core::{DatasetRecord, Label, Result, VulnError};

const HEADER: [&str; 2] = ["code", "label"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    code: String,
    label: String,
}

/// Label histogram of the dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub total_records: usize,
    pub labels: BTreeMap<String, usize>,
}

/// CSV file with a `code,label` header. Records are only ever appended.
pub struct DatasetStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl DatasetStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in file order. `None` when the dataset file does not exist.
    ///
    /// Rows without a usable label are skipped with a warning.
    pub fn load(&self) -> Result<Option<Vec<DatasetRecord>>> {
        if !self.path.is_file() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_error(e))?;

        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| self.csv_error(e))?;
            // Header is line 1
            match Label::parse(&row.label) {
                Ok(label) => records.push(DatasetRecord::new(row.code, label)),
                Err(e) => log::warn!(
                    "Skipping {} line {}: {}",
                    self.path.display(),
                    index + 2,
                    e
                ),
            }
        }

        log::debug!(
            "Loaded {} dataset records from {}",
            records.len(),
            self.path.display()
        );
        Ok(Some(records))
    }

    /// Append one record, creating the file with its header if needed.
    ///
    /// The mutex orders appends within this process; an exclusive advisory
    /// lock on the file orders them against other processes.
    pub fn append(&self, record: &DatasetRecord) -> Result<()> {
        let _guard = self.append_lock.lock();

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| VulnError::persist(self.path.display().to_string(), e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| VulnError::persist(self.path.display().to_string(), e))?;
        // Released when `file` is dropped
        file.lock()
            .map_err(|e| VulnError::persist(self.path.display().to_string(), e))?;

        let len = file.metadata()?.len();
        if len > 0 && !ends_with_newline(&mut file, len)? {
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut file);
        if len == 0 {
            writer.write_record(HEADER).map_err(|e| self.csv_error(e))?;
        }
        writer
            .write_record([record.code.as_str(), record.label.as_str()])
            .map_err(|e| self.csv_error(e))?;
        writer.flush()?;
        drop(writer);
        file.sync_all()?;

        log::info!(
            "Appended record labeled {} to {}",
            record.label,
            self.path.display()
        );
        Ok(())
    }

    pub fn label_counts(&self) -> Result<BTreeMap<Label, usize>> {
        let mut counts = BTreeMap::new();
        for record in self.load()?.unwrap_or_default() {
            *counts.entry(record.label).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub fn stats(&self) -> Result<DatasetStats> {
        let counts = self.label_counts()?;
        Ok(DatasetStats {
            total_records: counts.values().sum(),
            labels: counts
                .into_iter()
                .map(|(label, count)| (label.to_string(), count))
                .collect(),
        })
    }

    fn csv_error(&self, e: csv::Error) -> VulnError {
        VulnError::Dataset(format!("{}: {}", self.path.display(), e))
    }
}

fn ends_with_newline(file: &mut fs::File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
