//! Known vulnerability signatures.

use serde::{Deserialize, Serialize};

/// A known vulnerable code pattern keyed by the SHA-256 of its text.
///
/// Field names on disk follow the signature feed format (`hash`, `CVE`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Source text of the vulnerable pattern
    pub pattern: String,

    /// Lowercase hex SHA-256 of `pattern`
    #[serde(rename = "hash")]
    pub pattern_hash: String,

    pub description: String,

    #[serde(rename = "CVE")]
    pub cve_id: String,

    pub severity: String,
}

impl std::fmt::Display for SignatureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, severity: {})",
            self.description, self.cve_id, self.severity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_field_names() {
        let record = SignatureRecord {
            pattern: "os.system(x)".to_string(),
            pattern_hash: "abc".to_string(),
            description: "Command injection".to_string(),
            cve_id: "CVE-2024-0001".to_string(),
            severity: "high".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["hash"], "abc");
        assert_eq!(value["CVE"], "CVE-2024-0001");
        assert!(value.get("pattern_hash").is_none());
    }
}
