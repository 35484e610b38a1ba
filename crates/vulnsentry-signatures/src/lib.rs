//! vulnsentry signature store
//!
//! Exact-match lookup of known vulnerable snippets by content hash. The
//! whole store is replaced on each refresh; there is no partial merge.

pub mod feed;
pub mod hash;
pub mod storage;

pub use feed::{parse_records, parse_stored_records};
pub use hash::content_hash;
pub use storage::SignatureStorage;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use vulnsentry_core::{Result, SignatureRecord, SignatureVerdict, VulnError};

/// Immutable view of the store used by lookups
#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<SignatureRecord>,
    by_hash: HashMap<String, usize>,
}

impl Snapshot {
    fn new(records: Vec<SignatureRecord>) -> Self {
        let mut by_hash = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            // First record wins for duplicate hashes
            by_hash.entry(record.pattern_hash.clone()).or_insert(index);
        }
        Self { records, by_hash }
    }
}

/// Main signature store interface
pub struct SignatureStore {
    storage: SignatureStorage,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes refreshes so file and snapshot always agree
    refresh_lock: Mutex<()>,
}

impl SignatureStore {
    /// Open the store at `path`, loading any existing database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let storage = SignatureStorage::new(path);
        let records = storage.load()?;
        log::info!(
            "Signature store opened: {} ({} records)",
            storage.path().display(),
            records.len()
        );

        Ok(Self::with_records(storage, records))
    }

    /// Open the store at `path`, starting empty if the database cannot be
    /// read. A later refresh rewrites the file.
    pub fn open_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::open(path.as_ref()) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Signature database unusable, continuing without signatures: {}", e);
                Self::with_records(SignatureStorage::new(path), Vec::new())
            }
        }
    }

    fn with_records(storage: SignatureStorage, records: Vec<SignatureRecord>) -> Self {
        Self {
            storage,
            snapshot: RwLock::new(Arc::new(Snapshot::new(records))),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Find the signature whose pattern hash equals the hash of `code`.
    pub fn lookup(&self, code: &str) -> Option<SignatureRecord> {
        let snapshot = Arc::clone(&self.snapshot.read());
        let hash = content_hash(code);
        log::debug!("Signature lookup: hash={}", &hash[..8]);

        snapshot
            .by_hash
            .get(&hash)
            .map(|&index| snapshot.records[index].clone())
    }

    /// Lookup wrapped as a report verdict.
    pub fn verdict(&self, code: &str) -> SignatureVerdict {
        match self.lookup(code) {
            Some(record) => SignatureVerdict::Match { record },
            None => SignatureVerdict::NoMatch,
        }
    }

    /// Replace the whole store with the records in `payload`.
    ///
    /// Malformed payloads are rejected with `InvalidSignatureFormat` and
    /// leave both the file and the in-memory store untouched.
    pub fn refresh(&self, payload: &serde_json::Value) -> Result<usize> {
        let records = parse_records(payload)?;
        let count = records.len();

        let _guard = self.refresh_lock.lock();
        self.storage.save(&records)?;
        *self.snapshot.write() = Arc::new(Snapshot::new(records));

        log::info!("Signature store refreshed: {} records", count);
        Ok(count)
    }

    /// Refresh from JSON text.
    pub fn refresh_from_str(&self, content: &str) -> Result<usize> {
        let payload: serde_json::Value = serde_json::from_str(content).map_err(|e| {
            VulnError::InvalidSignatureFormat(format!("payload is not valid JSON: {}", e))
        })?;
        self.refresh(&payload)
    }

    /// Refresh from a local JSON file.
    pub fn refresh_from_file<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let content = std::fs::read_to_string(path.as_ref())?;
        self.refresh_from_str(&content)
    }

    /// Get store statistics
    pub fn stats(&self) -> SignatureStats {
        let snapshot = Arc::clone(&self.snapshot.read());
        let mut by_severity = BTreeMap::new();
        for record in &snapshot.records {
            *by_severity
                .entry(record.severity.to_ascii_lowercase())
                .or_insert(0) += 1;
        }

        SignatureStats {
            total_records: snapshot.records.len(),
            distinct_hashes: snapshot.by_hash.len(),
            by_severity,
        }
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }
}

/// Signature store statistics
#[derive(Debug, Clone, Serialize)]
pub struct SignatureStats {
    pub total_records: usize,
    pub distinct_hashes: usize,
    pub by_severity: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn feed() -> serde_json::Value {
        json!([
            {
                "pattern": "os.system(x)",
                "description": "OS command injection",
                "CVE": "CVE-2024-1111",
                "severity": "High"
            },
            {
                "pattern": "pickle.loads(data)",
                "description": "Unsafe deserialization",
                "CVE": "CVE-2024-2222",
                "severity": "critical"
            }
        ])
    }

    #[test]
    fn test_lookup_exact_match() {
        let temp_dir = TempDir::new().unwrap();
        let store = SignatureStore::open(temp_dir.path().join("signatures.json")).unwrap();

        assert!(store.lookup("os.system(x)").is_none());
        assert_eq!(store.refresh(&feed()).unwrap(), 2);

        let hit = store.lookup("os.system(x)").unwrap();
        assert_eq!(hit.cve_id, "CVE-2024-1111");
        assert!(store.lookup("os.system(x) ").is_none());
        assert!(store.lookup(" os.system(x)").is_none());
    }

    #[test]
    fn test_verdict() {
        let temp_dir = TempDir::new().unwrap();
        let store = SignatureStore::open(temp_dir.path().join("signatures.json")).unwrap();
        store.refresh(&feed()).unwrap();

        assert!(matches!(
            store.verdict("pickle.loads(data)"),
            SignatureVerdict::Match { .. }
        ));
        assert_eq!(store.verdict("print(1)"), SignatureVerdict::NoMatch);
    }

    #[test]
    fn test_invalid_refresh_leaves_store_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("signatures.json");
        let store = SignatureStore::open(&path).unwrap();
        store.refresh(&feed()).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = store.refresh(&json!({"not": "a list"})).unwrap_err();
        assert!(matches!(err, VulnError::InvalidSignatureFormat(_)));

        let err = store
            .refresh(&json!([{"pattern": "eval(x)"}]))
            .unwrap_err();
        assert!(matches!(err, VulnError::InvalidSignatureFormat(_)));

        let err = store.refresh_from_str("not json").unwrap_err();
        assert!(matches!(err, VulnError::InvalidSignatureFormat(_)));

        assert!(store.lookup("os.system(x)").is_some());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_refresh_replaces_wholesale() {
        let temp_dir = TempDir::new().unwrap();
        let store = SignatureStore::open(temp_dir.path().join("signatures.json")).unwrap();
        store.refresh(&feed()).unwrap();

        store
            .refresh(&json!([{
                "pattern": "yaml.load(f)",
                "description": "Unsafe YAML load",
                "CVE": "CVE-2024-3333",
                "severity": "high"
            }]))
            .unwrap();

        assert!(store.lookup("os.system(x)").is_none());
        assert!(store.lookup("yaml.load(f)").is_some());
    }

    #[test]
    fn test_reopen_reads_persisted_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("signatures.json");
        SignatureStore::open(&path).unwrap().refresh(&feed()).unwrap();

        let reopened = SignatureStore::open(&path).unwrap();
        assert!(reopened.lookup("pickle.loads(data)").is_some());
    }

    #[test]
    fn test_duplicate_hash_first_wins() {
        let temp_dir = TempDir::new().unwrap();
        let store = SignatureStore::open(temp_dir.path().join("signatures.json")).unwrap();
        store
            .refresh(&json!([
                {"pattern": "x()", "description": "first", "CVE": "CVE-1", "severity": "low"},
                {"pattern": "x()", "description": "second", "CVE": "CVE-2", "severity": "low"}
            ]))
            .unwrap();

        assert_eq!(store.lookup("x()").unwrap().description, "first");
        let stats = store.stats();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.distinct_hashes, 1);
    }

    #[test]
    fn test_stats_by_severity() {
        let temp_dir = TempDir::new().unwrap();
        let store = SignatureStore::open(temp_dir.path().join("signatures.json")).unwrap();
        store.refresh(&feed()).unwrap();

        let stats = store.stats();
        assert_eq!(stats.by_severity.get("high"), Some(&1));
        assert_eq!(stats.by_severity.get("critical"), Some(&1));
    }

    #[test]
    fn test_open_or_empty_recovers_from_corrupt_database() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("signatures.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(SignatureStore::open(&path).is_err());

        let store = SignatureStore::open_or_empty(&path);
        assert_eq!(store.stats().total_records, 0);
        assert_eq!(store.verdict("os.system(x)"), SignatureVerdict::NoMatch);

        store.refresh(&feed()).unwrap();
        assert!(SignatureStore::open(&path).unwrap().lookup("os.system(x)").is_some());
    }

    #[test]
    fn test_refresh_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let feed_path = temp_dir.path().join("feed.json");
        std::fs::write(&feed_path, feed().to_string()).unwrap();

        let store = SignatureStore::open(temp_dir.path().join("signatures.json")).unwrap();
        assert_eq!(store.refresh_from_file(&feed_path).unwrap(), 2);
    }
}
