//! Statistical side of vulnsentry: TF-IDF features, a random forest
//! classifier, evaluation and the versioned artifact store.

pub mod artifact;
pub mod forest;
pub mod metrics;
pub mod split;
pub mod tfidf;

pub use artifact::{new_run_id, ArtifactStore, ModelArtifact, ModelHandle};
pub use forest::{DecisionTree, ForestConfig, RandomForest};
pub use metrics::evaluate;
pub use split::{stratified_split, SplitIndices};
pub use tfidf::{FeatureExtractor, FeatureVector, TfidfConfig, Vocabulary};
