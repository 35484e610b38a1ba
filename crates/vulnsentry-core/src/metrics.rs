//! Evaluation metrics recorded by full training runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-label precision/recall/f1 with the label's support in the test split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LabelScore {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Weighted scores computed on the held-out split of a training run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    #[serde(default)]
    pub per_label: BTreeMap<String, LabelScore>,
    #[serde(default)]
    pub train_size: usize,
    #[serde(default)]
    pub test_size: usize,
    pub evaluated_at: DateTime<Utc>,
}

impl MetricsRecord {
    /// All three aggregate scores lie in [0, 1].
    pub fn is_well_formed(&self) -> bool {
        [self.precision, self.recall, self.f1_score]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

impl std::fmt::Display for MetricsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "precision: {:.4}", self.precision)?;
        writeln!(f, "recall:    {:.4}", self.recall)?;
        writeln!(f, "f1_score:  {:.4}", self.f1_score)?;
        write!(
            f,
            "train/test: {}/{} (evaluated {})",
            self.train_size,
            self.test_size,
            self.evaluated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        for (label, score) in &self.per_label {
            write!(
                f,
                "\n  {:<20} p={:.3} r={:.3} f1={:.3} n={}",
                label, score.precision, score.recall, score.f1_score, score.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed() {
        let mut record = MetricsRecord {
            precision: 1.0,
            recall: 0.5,
            f1_score: 0.0,
            per_label: BTreeMap::new(),
            train_size: 3,
            test_size: 1,
            evaluated_at: Utc::now(),
        };
        assert!(record.is_well_formed());

        record.recall = f64::NAN;
        assert!(!record.is_well_formed());
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let record: MetricsRecord = serde_json::from_str(
            r#"{"precision":0.5,"recall":0.5,"f1_score":0.5,"evaluated_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(record.per_label.is_empty());
        assert_eq!(record.test_size, 0);
    }
}
