//! Signature database persistence with atomic file replacement

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use vulnsentry_core::{Result, SignatureRecord, VulnError};

use crate::feed::parse_stored_records;

/// File-backed signature database
pub struct SignatureStorage {
    /// Path of the JSON signature database
    path: PathBuf,
}

impl SignatureStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every stored record. A missing file is an empty database; stored
    /// entries that fail validation are skipped.
    pub fn load(&self) -> Result<Vec<SignatureRecord>> {
        if !self.path.exists() {
            log::debug!("No signature database at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let payload: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            VulnError::InvalidSignatureFormat(format!(
                "{} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        parse_stored_records(&payload)
    }

    /// Replace the database file with `records`.
    ///
    /// The content is written to a temporary file in the same directory and
    /// renamed over the old file, so readers never observe a partial write.
    pub fn save(&self, records: &[SignatureRecord]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| VulnError::persist(self.path.display().to_string(), e))?;

        let content = serde_json::to_string_pretty(records)?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .map_err(|e| VulnError::persist(self.path.display().to_string(), e))?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| VulnError::persist(self.path.display().to_string(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| VulnError::persist(self.path.display().to_string(), e.error))?;

        log::debug!(
            "Signature database saved: {} ({} records)",
            self.path.display(),
            records.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;
    use tempfile::TempDir;

    fn record(pattern: &str) -> SignatureRecord {
        SignatureRecord {
            pattern: pattern.to_string(),
            pattern_hash: content_hash(pattern),
            description: "desc".to_string(),
            cve_id: "CVE-2024-0002".to_string(),
            severity: "medium".to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SignatureStorage::new(temp_dir.path().join("signatures.json"));

        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SignatureStorage::new(temp_dir.path().join("db").join("signatures.json"));

        storage.save(&[record("a()"), record("b()")]).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded, vec![record("a()"), record("b()")]);
    }

    #[test]
    fn test_saved_file_uses_feed_field_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("signatures.json");
        let storage = SignatureStorage::new(&path);

        storage.save(&[record("a()")]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"hash\""));
        assert!(raw.contains("\"CVE\""));
    }

    #[test]
    fn test_load_skips_entries_without_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("signatures.json");
        fs::write(
            &path,
            r#"[
                {"description": "kept without pattern", "CVE": "CVE-1", "severity": "low"},
                {"pattern": "a()", "description": "desc", "CVE": "CVE-2024-0002", "severity": "medium"}
            ]"#,
        )
        .unwrap();

        let loaded = SignatureStorage::new(&path).load().unwrap();
        assert_eq!(loaded, vec![record("a()")]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("signatures.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SignatureStorage::new(&path).load().unwrap_err();
        assert!(matches!(err, VulnError::InvalidSignatureFormat(_)));
    }
}
