//! Error taxonomy shared by every vulnsentry crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VulnError {
    /// No training data has been written yet.
    #[error("training dataset not found: {}", path.display())]
    DatasetUnavailable { path: PathBuf },

    /// Fewer than two labels survive the minimum-support filter.
    #[error(
        "insufficient class diversity: {distinct} label(s) left after dropping labels with fewer than {min_support} records (need at least 2)"
    )]
    InsufficientClassDiversity { distinct: usize, min_support: usize },

    /// Feature vectors were produced by a different vocabulary than the classifier expects.
    #[error("vocabulary mismatch: classifier expects run {expected}, got vectors from run {found}")]
    VocabularyMismatch { expected: String, found: String },

    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot train on an empty set of records")]
    EmptyTrainingSet,

    #[error("dataset error: {0}")]
    Dataset(String),

    /// Writing an artifact or store file failed; nothing was published.
    #[error("failed to persist {what}: {source}")]
    Persist {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VulnError {
    pub fn persist(what: impl Into<String>, source: std::io::Error) -> Self {
        VulnError::Persist {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VulnError>;
