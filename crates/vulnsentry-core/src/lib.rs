//! Core types and traits for vulnsentry.
//!
//! This crate provides the types shared by every vulnsentry component:
//! - Labels and dataset records (Label, DatasetRecord)
//! - Signature records for the known-pattern store
//! - Detection verdicts and the combined report
//! - Evaluation metrics
//! - The error taxonomy (VulnError)

mod error;
mod label;
mod metrics;
mod record;
mod report;
mod signature;

pub use error::{Result, VulnError};
pub use label::{Label, DEFAULT_SAFE_LABEL};
pub use metrics::{LabelScore, MetricsRecord};
pub use record::DatasetRecord;
pub use report::{DetectionReport, MlVerdict, RuleFinding, RuleVerdict, SignatureVerdict};
pub use signature::SignatureRecord;
