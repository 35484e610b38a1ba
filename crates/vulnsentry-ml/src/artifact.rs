//! Versioned model artifacts and their on-disk store
//!
//! A trained model is a vocabulary plus the forest fitted against it. Both
//! halves are written into `runs/<run_id>/` and the run becomes current when
//! the `CURRENT` pointer file is atomically replaced. Readers always see one
//! complete run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;
use vulnsentry_core::{Label, MetricsRecord, Result, VulnError};

use crate::forest::{ForestConfig, RandomForest};
use crate::tfidf::{FeatureExtractor, FeatureVector, TfidfConfig, Vocabulary};

const CURRENT_FILE: &str = "CURRENT";
const RUNS_DIR: &str = "runs";
const VOCABULARY_FILE: &str = "vocabulary.json";
const CLASSIFIER_FILE: &str = "classifier.json";
const METRICS_FILE: &str = "metrics.json";

/// Identifier for a new training run: UTC timestamp to the microsecond plus
/// a random suffix. Ids sort in creation order.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%.6f"), &suffix[..8])
}

/// Vocabulary and classifier of one training run.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub run_id: String,
    pub trained_at: DateTime<Utc>,
    vocabulary: Vocabulary,
    classifier: RandomForest,
    extractor: FeatureExtractor,
}

#[derive(Serialize, Deserialize)]
struct ClassifierFile {
    trained_at: DateTime<Utc>,
    forest: RandomForest,
}

impl ModelArtifact {
    /// Fit a vocabulary on `codes` and a forest on the resulting vectors.
    pub fn train<S: AsRef<str>>(
        codes: &[S],
        labels: &[Label],
        features: &TfidfConfig,
        forest: &ForestConfig,
    ) -> Result<Self> {
        if codes.is_empty() {
            return Err(VulnError::EmptyTrainingSet);
        }

        let run_id = new_run_id();
        let extractor = FeatureExtractor::new(features.clone())?;
        let vocabulary = extractor.fit(codes, run_id.clone());
        let vectors = extractor.transform(codes, &vocabulary)?;
        let classifier = RandomForest::fit(forest, &vectors, labels, &vocabulary)?;

        Ok(Self {
            run_id,
            trained_at: Utc::now(),
            vocabulary,
            classifier,
            extractor,
        })
    }

    /// Pair a vocabulary with a classifier, rejecting halves of different runs
    /// and structurally corrupt forests.
    pub fn from_parts(
        vocabulary: Vocabulary,
        classifier: RandomForest,
        trained_at: DateTime<Utc>,
    ) -> Result<Self> {
        if classifier.vocabulary_id != vocabulary.run_id {
            return Err(VulnError::VocabularyMismatch {
                expected: classifier.vocabulary_id,
                found: vocabulary.run_id,
            });
        }
        classifier.validate()?;
        let extractor = FeatureExtractor::for_vocabulary(&vocabulary)?;
        Ok(Self {
            run_id: vocabulary.run_id.clone(),
            trained_at,
            vocabulary,
            classifier,
            extractor,
        })
    }

    pub fn vectorize<S: AsRef<str>>(&self, codes: &[S]) -> Result<Vec<FeatureVector>> {
        self.extractor.transform(codes, &self.vocabulary)
    }

    pub fn predict(&self, code: &str) -> Result<Label> {
        let vectors = self.vectorize(&[code])?;
        match vectors.first() {
            Some(vector) => self.classifier.predict(vector),
            None => Err(VulnError::ModelNotLoaded(
                "feature extraction produced no vector".to_string(),
            )),
        }
    }

    pub fn predict_many<S: AsRef<str>>(&self, codes: &[S]) -> Result<Vec<Label>> {
        self.vectorize(codes)?
            .iter()
            .map(|vector| self.classifier.predict(vector))
            .collect()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }
}

/// Directory of training runs with an atomically swapped `CURRENT` pointer.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    model_dir: PathBuf,
    keep_runs: usize,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(model_dir: P, keep_runs: usize) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            keep_runs: keep_runs.max(1),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.model_dir.join(RUNS_DIR).join(run_id)
    }

    /// Run id named by the `CURRENT` pointer, if any run was committed.
    pub fn current_run_id(&self) -> Result<Option<String>> {
        let pointer = self.model_dir.join(CURRENT_FILE);
        if !pointer.is_file() {
            return Ok(None);
        }
        let run_id = fs::read_to_string(&pointer)?.trim().to_string();
        Ok((!run_id.is_empty()).then_some(run_id))
    }

    /// Write `artifact` as a new run and make it current.
    ///
    /// When `metrics` is `None` the current run's metrics record is carried
    /// over to the new run unchanged.
    pub fn commit(&self, artifact: &ModelArtifact, metrics: Option<&MetricsRecord>) -> Result<()> {
        let carried = match metrics {
            Some(_) => None,
            None => self.load_metrics().unwrap_or_else(|e| {
                log::warn!("Previous metrics record unreadable, not carried over: {}", e);
                None
            }),
        };
        let metrics = metrics.or(carried.as_ref());

        let run_dir = self.run_dir(&artifact.run_id);
        fs::create_dir_all(&run_dir)
            .map_err(|e| VulnError::persist(run_dir.display().to_string(), e))?;

        write_atomic(
            &run_dir.join(VOCABULARY_FILE),
            &serde_json::to_vec(&artifact.vocabulary)?,
        )?;
        write_atomic(
            &run_dir.join(CLASSIFIER_FILE),
            &serde_json::to_vec(&ClassifierFile {
                trained_at: artifact.trained_at,
                forest: artifact.classifier.clone(),
            })?,
        )?;
        if let Some(metrics) = metrics {
            write_atomic(
                &run_dir.join(METRICS_FILE),
                &serde_json::to_vec_pretty(metrics)?,
            )?;
        }

        write_atomic(
            &self.model_dir.join(CURRENT_FILE),
            artifact.run_id.as_bytes(),
        )?;
        log::info!(
            "Committed model run {} to {}",
            artifact.run_id,
            self.model_dir.display()
        );

        self.prune(&artifact.run_id);
        Ok(())
    }

    /// Load the current run. `None` when nothing was committed yet.
    pub fn load_current(&self) -> Result<Option<ModelArtifact>> {
        match self.current_run_id()? {
            Some(run_id) => self.load_run(&run_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn load_run(&self, run_id: &str) -> Result<ModelArtifact> {
        let run_dir = self.run_dir(run_id);
        let vocabulary: Vocabulary = read_json(&run_dir.join(VOCABULARY_FILE))?;
        let classifier: ClassifierFile = read_json(&run_dir.join(CLASSIFIER_FILE))?;

        let artifact =
            ModelArtifact::from_parts(vocabulary, classifier.forest, classifier.trained_at)?;
        if artifact.run_id != run_id {
            return Err(VulnError::VocabularyMismatch {
                expected: run_id.to_string(),
                found: artifact.run_id,
            });
        }
        log::debug!("Loaded model run {}", run_id);
        Ok(artifact)
    }

    /// Metrics record of the current run, if it has one.
    pub fn load_metrics(&self) -> Result<Option<MetricsRecord>> {
        let Some(run_id) = self.current_run_id()? else {
            return Ok(None);
        };
        let path = self.run_dir(&run_id).join(METRICS_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Run ids on disk, oldest first.
    pub fn runs(&self) -> Result<Vec<String>> {
        let runs_dir = self.model_dir.join(RUNS_DIR);
        if !runs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut runs: Vec<String> = fs::read_dir(&runs_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        runs.sort();
        Ok(runs)
    }

    /// Remove all but the newest `keep_runs` runs, never the current one.
    fn prune(&self, current: &str) {
        let runs = match self.runs() {
            Ok(runs) => runs,
            Err(e) => {
                log::warn!("Could not list model runs for pruning: {}", e);
                return;
            }
        };
        let older: Vec<&String> = runs.iter().filter(|r| r.as_str() != current).collect();
        let excess = older.len().saturating_sub(self.keep_runs - 1);
        for run_id in older.into_iter().take(excess) {
            let dir = self.run_dir(run_id);
            match fs::remove_dir_all(&dir) {
                Ok(()) => log::debug!("Pruned model run {}", run_id),
                Err(e) => log::warn!("Failed to prune {}: {}", dir.display(), e),
            }
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let what = path.display().to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| VulnError::persist(&what, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| VulnError::persist(&what, e))?;
    tmp.write_all(content)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| VulnError::persist(&what, e))?;
    tmp.persist(path)
        .map_err(|e| VulnError::persist(&what, e.error))?;
    Ok(())
}

/// Shared handle to the artifact detections run against.
///
/// Readers clone the inner `Arc`, so a detection keeps using one run even
/// if a retrain publishes a new one meanwhile.
#[derive(Debug, Clone, Default)]
pub struct ModelHandle {
    inner: Arc<RwLock<Option<Arc<ModelArtifact>>>>,
}

impl ModelHandle {
    pub fn new(artifact: Option<ModelArtifact>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(artifact.map(Arc::new))),
        }
    }

    pub fn get(&self) -> Option<Arc<ModelArtifact>> {
        self.inner.read().clone()
    }

    pub fn publish(&self, artifact: ModelArtifact) -> Arc<ModelArtifact> {
        let artifact = Arc::new(artifact);
        *self.inner.write() = Some(Arc::clone(&artifact));
        log::debug!("Published model run {}", artifact.run_id);
        artifact
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}
