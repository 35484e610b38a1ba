//! Seeded stratified train/test split.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand::rngs::StdRng;
use vulnsentry_core::{Label, Result, VulnError};

/// Record indices assigned to each side of a split, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split record indices so every label keeps its share on both sides.
///
/// Each label with `c` records contributes `round(c * test_ratio)` records to
/// the test side, clamped to `[1, c - 1]`. A label seen only once stays on
/// the train side.
pub fn stratified_split(labels: &[Label], test_ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(VulnError::InvalidConfig(format!(
            "test_ratio must be in (0, 1), got {}",
            test_ratio
        )));
    }

    let mut by_label: BTreeMap<&Label, Vec<usize>> = BTreeMap::new();
    for (index, label) in labels.iter().enumerate() {
        by_label.entry(label).or_default().push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for (label, mut indices) in by_label {
        let count = indices.len();
        if count < 2 {
            log::warn!("Label {} has a single record; keeping it in the train split", label);
            train.extend(indices);
            continue;
        }

        indices.shuffle(&mut rng);
        let n_test = ((count as f64 * test_ratio).round() as usize).clamp(1, count - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    log::debug!("Stratified split: {} train, {} test", train.len(), test.len());
    Ok(SplitIndices { train, test })
}
