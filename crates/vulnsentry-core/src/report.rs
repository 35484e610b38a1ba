//! Detection verdicts and the combined report.

use serde::{Deserialize, Serialize};

use crate::label::Label;
use crate::signature::SignatureRecord;

/// Outcome of the learned classifier for one snippet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MlVerdict {
    /// The full predicted label is kept; `vulnerable` is false only for the safe label.
    Prediction { label: Label, vulnerable: bool },
    ModelUnavailable { reason: String },
}

/// One deny-listed call found by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleFinding {
    pub identifier: String,
    pub description: String,
    /// 1-based line of the call
    pub line: usize,
    /// 1-based column of the call
    pub column: usize,
}

/// Outcome of the syntax-tree rule engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleVerdict {
    Clean,
    Flagged { findings: Vec<RuleFinding> },
    ParseError { message: String },
}

/// Outcome of the known-signature lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignatureVerdict {
    NoMatch,
    Match { record: SignatureRecord },
}

/// Combined per-request report. All three verdicts are always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionReport {
    pub ml_verdict: MlVerdict,
    pub rule_verdict: RuleVerdict,
    pub signature_verdict: SignatureVerdict,
}

impl RuleVerdict {
    pub fn is_flagged(&self) -> bool {
        matches!(self, RuleVerdict::Flagged { .. })
    }
}

impl DetectionReport {
    /// Whether any of the three strategies reported a positive finding.
    pub fn has_findings(&self) -> bool {
        let ml = matches!(
            self.ml_verdict,
            MlVerdict::Prediction {
                vulnerable: true,
                ..
            }
        );
        let signature = matches!(self.signature_verdict, SignatureVerdict::Match { .. });
        ml || self.rule_verdict.is_flagged() || signature
    }

    /// Number of strategies reporting a positive finding (0..=3).
    pub fn agreement(&self) -> usize {
        let ml = matches!(
            self.ml_verdict,
            MlVerdict::Prediction {
                vulnerable: true,
                ..
            }
        );
        let signature = matches!(self.signature_verdict, SignatureVerdict::Match { .. });
        [ml, self.rule_verdict.is_flagged(), signature]
            .into_iter()
            .filter(|hit| *hit)
            .count()
    }
}

impl std::fmt::Display for MlVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MlVerdict::Prediction {
                label,
                vulnerable: true,
            } => {
                let cwes = label.cwe_ids();
                if cwes.is_empty() {
                    write!(f, "vulnerability detected: {}", label)
                } else {
                    write!(f, "vulnerability detected: {} ({})", label, cwes.join(", "))
                }
            }
            MlVerdict::Prediction {
                label,
                vulnerable: false,
            } => write!(f, "no vulnerability ({})", label),
            MlVerdict::ModelUnavailable { reason } => write!(f, "model unavailable: {}", reason),
        }
    }
}

impl std::fmt::Display for RuleVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleVerdict::Clean => write!(f, "no dangerous constructs found"),
            RuleVerdict::ParseError { message } => write!(f, "parse error: {}", message),
            RuleVerdict::Flagged { findings } => {
                write!(f, "flagged")?;
                for finding in findings {
                    write!(
                        f,
                        "\n  {}:{} {}() - {}",
                        finding.line, finding.column, finding.identifier, finding.description
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for SignatureVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureVerdict::NoMatch => write!(f, "no match"),
            SignatureVerdict::Match { record } => write!(f, "match: {}", record),
        }
    }
}

impl std::fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ML analysis:      {}", self.ml_verdict)?;
        writeln!(f, "Rule analysis:    {}", self.rule_verdict)?;
        write!(f, "Signature lookup: {}", self.signature_verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(ml: MlVerdict, rule: RuleVerdict, signature: SignatureVerdict) -> DetectionReport {
        DetectionReport {
            ml_verdict: ml,
            rule_verdict: rule,
            signature_verdict: signature,
        }
    }

    #[test]
    fn test_has_findings() {
        let clean = report(
            MlVerdict::Prediction {
                label: Label::parse("safe").unwrap(),
                vulnerable: false,
            },
            RuleVerdict::Clean,
            SignatureVerdict::NoMatch,
        );
        assert!(!clean.has_findings());
        assert_eq!(clean.agreement(), 0);

        let unavailable = report(
            MlVerdict::ModelUnavailable {
                reason: "no model".to_string(),
            },
            RuleVerdict::ParseError {
                message: "bad".to_string(),
            },
            SignatureVerdict::NoMatch,
        );
        assert!(!unavailable.has_findings());
    }

    #[test]
    fn test_agreement_counts_each_strategy() {
        let flagged = report(
            MlVerdict::Prediction {
                label: Label::parse("rce").unwrap(),
                vulnerable: true,
            },
            RuleVerdict::Flagged {
                findings: vec![RuleFinding {
                    identifier: "eval".to_string(),
                    description: "eval".to_string(),
                    line: 1,
                    column: 1,
                }],
            },
            SignatureVerdict::NoMatch,
        );
        assert!(flagged.has_findings());
        assert_eq!(flagged.agreement(), 2);
    }

    #[test]
    fn test_ml_verdict_keeps_full_label() {
        let verdict = MlVerdict::Prediction {
            label: Label::parse("sql_injection").unwrap(),
            vulnerable: true,
        };
        assert_eq!(
            verdict.to_string(),
            "vulnerability detected: sql_injection (CWE-89)"
        );

        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["status"], "prediction");
        assert_eq!(json["label"], "sql_injection");
    }

    #[test]
    fn test_rule_verdict_serialization() {
        let json = serde_json::to_value(RuleVerdict::Clean).unwrap();
        assert_eq!(json["status"], "clean");

        let json = serde_json::to_value(RuleVerdict::ParseError {
            message: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "parse_error");
        assert_eq!(json["message"], "x");
    }
}
