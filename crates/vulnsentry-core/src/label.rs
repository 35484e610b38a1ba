//! Vulnerability label definitions.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VulnError};

/// Label that marks a snippet as free of vulnerabilities unless configured otherwise.
pub const DEFAULT_SAFE_LABEL: &str = "safe";

/// A classification label attached to a dataset record or predicted by the model.
///
/// Labels are free-form category tags such as `sql_injection` or `xss`. One
/// distinguished value (by default [`DEFAULT_SAFE_LABEL`]) denotes "no vulnerability".
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Build a label from user input, trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VulnError::InvalidLabel(
                "label must not be empty".to_string(),
            ));
        }
        if trimmed.contains(['\n', '\r']) {
            return Err(VulnError::InvalidLabel(format!(
                "label must be a single line: {:?}",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this label is the configured "no vulnerability" tag.
    pub fn is_safe(&self, safe_label: &str) -> bool {
        self.0 == safe_label
    }

    /// CWE identifiers for well-known category names
    pub fn cwe_ids(&self) -> Vec<String> {
        match self.0.to_ascii_lowercase().as_str() {
            "sql_injection" | "sqli" => vec!["CWE-89".to_string()],
            "xss" => vec!["CWE-79".to_string(), "CWE-80".to_string()],
            "rce" | "code_injection" | "eval" => vec!["CWE-94".to_string()],
            "command_injection" | "os_command_injection" => vec!["CWE-78".to_string()],
            "path_traversal" | "lfi" => vec!["CWE-22".to_string()],
            "ssrf" => vec!["CWE-918".to_string()],
            "deserialization" | "insecure_deserialization" => vec!["CWE-502".to_string()],
            "hardcoded_secret" | "hardcoded_password" => vec!["CWE-798".to_string()],
            _ => vec![],
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_trims() {
        let label = Label::parse("  xss \t").unwrap();
        assert_eq!(label.as_str(), "xss");
        assert_eq!(format!("{}", label), "xss");
    }

    #[test]
    fn test_label_parse_rejects_empty() {
        assert!(matches!(Label::parse("   "), Err(VulnError::InvalidLabel(_))));
        assert!(matches!(
            Label::parse("a\nb"),
            Err(VulnError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_is_safe() {
        assert!(Label::parse("safe").unwrap().is_safe(DEFAULT_SAFE_LABEL));
        assert!(!Label::parse("Safe").unwrap().is_safe(DEFAULT_SAFE_LABEL));
        assert!(Label::parse("benign").unwrap().is_safe("benign"));
    }

    #[test]
    fn test_cwe_ids() {
        assert_eq!(
            Label::parse("SQL_Injection").unwrap().cwe_ids(),
            vec!["CWE-89".to_string()]
        );
        assert!(Label::parse("custom").unwrap().cwe_ids().is_empty());
    }
}
