pub mod cli;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod training;

// Re-export core types for convenience
pub use vulnsentry_core::{DetectionReport, Label, MetricsRecord, VulnError};
