//! Labeled dataset records.

use serde::{Deserialize, Serialize};

use crate::label::Label;

/// One row of the training dataset: a code snippet and its label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetRecord {
    pub code: String,
    pub label: Label,
}

impl DatasetRecord {
    pub fn new(code: impl Into<String>, label: Label) -> Self {
        Self {
            code: code.into(),
            label,
        }
    }
}
