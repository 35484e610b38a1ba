//! Support-weighted precision, recall and f1 over a held-out split.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use vulnsentry_core::{Label, LabelScore, MetricsRecord, Result, VulnError};

#[derive(Default)]
struct Tally {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
    support: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn weighted_mean(weighted_sum: f64, total: f64) -> f64 {
    (weighted_sum / total).clamp(0.0, 1.0)
}

/// Score predictions against the true labels of a test split.
///
/// Per-label scores are computed over every label that occurs in either
/// sequence; undefined ratios count as zero. The aggregate is the average
/// weighted by each label's support in `y_true`.
pub fn evaluate(y_true: &[Label], y_pred: &[Label], train_size: usize) -> Result<MetricsRecord> {
    if y_true.len() != y_pred.len() {
        return Err(VulnError::Dataset(format!(
            "{} true labels but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(VulnError::Dataset(
            "cannot evaluate on an empty test split".to_string(),
        ));
    }

    let labels: BTreeSet<&Label> = y_true.iter().chain(y_pred).collect();
    let mut tallies: BTreeMap<&Label, Tally> =
        labels.into_iter().map(|l| (l, Tally::default())).collect();

    for (truth, predicted) in y_true.iter().zip(y_pred) {
        if let Some(tally) = tallies.get_mut(truth) {
            tally.support += 1;
        }
        if truth == predicted {
            if let Some(tally) = tallies.get_mut(truth) {
                tally.true_positive += 1;
            }
        } else {
            if let Some(tally) = tallies.get_mut(predicted) {
                tally.false_positive += 1;
            }
            if let Some(tally) = tallies.get_mut(truth) {
                tally.false_negative += 1;
            }
        }
    }

    let total = y_true.len() as f64;
    let mut per_label = BTreeMap::new();
    // Support-weighted sums, divided by `total` once at the end
    let (mut precision, mut recall, mut f1_score) = (0.0, 0.0, 0.0);

    for (label, tally) in tallies {
        let p = ratio(tally.true_positive, tally.true_positive + tally.false_positive);
        let r = ratio(tally.true_positive, tally.true_positive + tally.false_negative);
        let f1 = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

        let weight = tally.support as f64;
        precision += p * weight;
        recall += r * weight;
        f1_score += f1 * weight;

        per_label.insert(
            label.to_string(),
            LabelScore {
                precision: p,
                recall: r,
                f1_score: f1,
                support: tally.support,
            },
        );
    }

    Ok(MetricsRecord {
        precision: weighted_mean(precision, total),
        recall: weighted_mean(recall, total),
        f1_score: weighted_mean(f1_score, total),
        per_label,
        train_size,
        test_size: y_true.len(),
        evaluated_at: Utc::now(),
    })
}
