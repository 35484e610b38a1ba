//! Training pipeline: full evaluation training and feedback retraining
//!
//! The pipeline is the only writer of the dataset, the model artifacts and
//! the metrics record. Runs are serialized by `train_lock`.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::Serialize;
use vulnsentry_core::{DatasetRecord, Label, MetricsRecord, Result, VulnError};
use vulnsentry_ml::{
    evaluate, stratified_split, ArtifactStore, ModelArtifact, ModelHandle, TfidfConfig,
};

use crate::config::{TrainingConfig, VulnsentryConfig};
use crate::dataset::DatasetStore;

/// Result of a full evaluation training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub run_id: String,
    pub total_records: usize,
    pub used_records: usize,
    /// Labels dropped for having too few records
    pub dropped_labels: Vec<String>,
    pub metrics: MetricsRecord,
}

impl std::fmt::Display for TrainingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "run: {}", self.run_id)?;
        writeln!(
            f,
            "records: {} used of {}",
            self.used_records, self.total_records
        )?;
        if !self.dropped_labels.is_empty() {
            writeln!(f, "dropped labels: {}", self.dropped_labels.join(", "))?;
        }
        write!(f, "{}", self.metrics)
    }
}

/// Result of a feedback retrain
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackOutcome {
    pub run_id: String,
    pub label: Label,
    pub dataset_size: usize,
}

pub struct TrainingPipeline {
    dataset: DatasetStore,
    artifacts: ArtifactStore,
    handle: ModelHandle,
    training: TrainingConfig,
    features: TfidfConfig,
    train_lock: Mutex<()>,
}

impl TrainingPipeline {
    pub fn new(
        dataset: DatasetStore,
        artifacts: ArtifactStore,
        handle: ModelHandle,
        training: TrainingConfig,
        features: TfidfConfig,
    ) -> Self {
        Self {
            dataset,
            artifacts,
            handle,
            training,
            features,
            train_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &VulnsentryConfig, handle: ModelHandle) -> Self {
        Self::new(
            DatasetStore::new(config.paths.dataset_path()),
            ArtifactStore::new(config.paths.model_dir_path(), config.training.keep_runs),
            handle,
            config.training.clone(),
            config.features.to_tfidf_config(),
        )
    }

    pub fn dataset(&self) -> &DatasetStore {
        &self.dataset
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    /// Train and evaluate on a stratified split of the whole dataset.
    ///
    /// Labels with fewer than `min_label_support` records are dropped first.
    /// Nothing is written unless training and evaluation both succeed.
    pub fn train_from_scratch(&self) -> Result<TrainingOutcome> {
        let _guard = self.train_lock.lock();

        let records = self
            .dataset
            .load()?
            .ok_or_else(|| VulnError::DatasetUnavailable {
                path: self.dataset.path().to_path_buf(),
            })?;
        let total_records = records.len();

        let (records, dropped_labels) =
            filter_by_support(records, self.training.min_label_support);
        if !dropped_labels.is_empty() {
            log::warn!(
                "Dropping labels with fewer than {} records: {}",
                self.training.min_label_support,
                dropped_labels.join(", ")
            );
        }

        let distinct: BTreeSet<&Label> = records.iter().map(|r| &r.label).collect();
        if distinct.len() < 2 {
            return Err(VulnError::InsufficientClassDiversity {
                distinct: distinct.len(),
                min_support: self.training.min_label_support,
            });
        }

        let labels: Vec<Label> = records.iter().map(|r| r.label.clone()).collect();
        let split = stratified_split(&labels, self.training.test_ratio, self.training.split_seed)?;

        let pick = |indices: &[usize]| -> (Vec<&str>, Vec<Label>) {
            indices
                .iter()
                .map(|&i| (records[i].code.as_str(), records[i].label.clone()))
                .unzip()
        };
        let (train_codes, train_labels) = pick(&split.train);
        let (test_codes, test_labels) = pick(&split.test);

        log::info!(
            "Training on {} records ({} train / {} test, {} labels)",
            records.len(),
            train_codes.len(),
            test_codes.len(),
            distinct.len()
        );

        let artifact = ModelArtifact::train(
            &train_codes,
            &train_labels,
            &self.features,
            &self.training.to_forest_config(),
        )?;
        let predictions = artifact.predict_many(&test_codes)?;
        let metrics = evaluate(&test_labels, &predictions, train_codes.len())?;

        self.artifacts.commit(&artifact, Some(&metrics))?;
        let artifact = self.handle.publish(artifact);
        log::info!(
            "Training run {} complete: precision={:.3} recall={:.3} f1={:.3}",
            artifact.run_id,
            metrics.precision,
            metrics.recall,
            metrics.f1_score
        );

        Ok(TrainingOutcome {
            run_id: artifact.run_id.clone(),
            total_records,
            used_records: records.len(),
            dropped_labels,
            metrics,
        })
    }

    /// Append a labeled snippet, then refit on the entire dataset.
    ///
    /// The record is durable before retraining starts, so it is kept even
    /// when retraining fails. The previous metrics record is carried over.
    pub fn retrain_with_feedback(&self, code: &str, label: &str) -> Result<FeedbackOutcome> {
        let label = Label::parse(label)?;
        let _guard = self.train_lock.lock();

        self.dataset
            .append(&DatasetRecord::new(code, label.clone()))?;

        let records = self.dataset.load()?.unwrap_or_default();
        let codes: Vec<&str> = records.iter().map(|r| r.code.as_str()).collect();
        let labels: Vec<Label> = records.iter().map(|r| r.label.clone()).collect();

        let artifact = ModelArtifact::train(
            &codes,
            &labels,
            &self.features,
            &self.training.to_forest_config(),
        )?;
        self.artifacts.commit(&artifact, None)?;
        let artifact = self.handle.publish(artifact);
        log::info!(
            "Feedback retrain {} complete on {} records",
            artifact.run_id,
            records.len()
        );

        Ok(FeedbackOutcome {
            run_id: artifact.run_id.clone(),
            label,
            dataset_size: records.len(),
        })
    }
}

/// Keep records whose label occurs at least `min_support` times.
fn filter_by_support(
    records: Vec<DatasetRecord>,
    min_support: usize,
) -> (Vec<DatasetRecord>, Vec<String>) {
    let mut counts: BTreeMap<&Label, usize> = BTreeMap::new();
    for record in &records {
        *counts.entry(&record.label).or_insert(0) += 1;
    }
    let rare: BTreeSet<Label> = counts
        .into_iter()
        .filter(|(_, count)| *count < min_support)
        .map(|(label, _)| label.clone())
        .collect();

    let kept = records
        .into_iter()
        .filter(|r| !rare.contains(&r.label))
        .collect();
    (kept, rare.into_iter().map(|l| l.to_string()).collect())
}
