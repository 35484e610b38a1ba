//! Detection orchestrator combining the classifier, the rule engine and
//! the signature store into one report.

use std::sync::Arc;

use vulnsentry_core::{DetectionReport, MlVerdict, Result};
use vulnsentry_ml::ModelHandle;
use vulnsentry_parser::RuleEngine;
use vulnsentry_signatures::SignatureStore;

use crate::config::VulnsentryConfig;
use crate::training::{FeedbackOutcome, TrainingOutcome, TrainingPipeline};

pub struct Detector {
    pipeline: TrainingPipeline,
    rules: RuleEngine,
    signatures: Arc<SignatureStore>,
    safe_label: String,
}

impl Detector {
    pub fn new(
        pipeline: TrainingPipeline,
        rules: RuleEngine,
        signatures: Arc<SignatureStore>,
        safe_label: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            rules,
            signatures,
            safe_label: safe_label.into(),
        }
    }

    /// Build every component from `config` and load the current model, if any.
    ///
    /// An unreadable model or signature database is logged and leaves
    /// detection running without that strategy.
    pub fn open(config: &VulnsentryConfig) -> Result<Self> {
        let signatures = Arc::new(SignatureStore::open_or_empty(
            config.paths.signatures_path(),
        ));
        let pipeline = TrainingPipeline::from_config(config, ModelHandle::default());
        let detector = Self::new(
            pipeline,
            RuleEngine::new(config.rules.to_deny_list()),
            signatures,
            config.training.safe_label.clone(),
        );

        if let Err(e) = detector.reload() {
            log::warn!("Could not load the current model: {}", e);
        }
        Ok(detector)
    }

    /// Run all three strategies on `code`. A failing strategy never
    /// prevents the others from reporting.
    pub fn detect(&self, code: &str) -> DetectionReport {
        let ml_verdict = self.ml_verdict(code);
        let rule_verdict = self.rules.analyze(code);
        let signature_verdict = self.signatures.verdict(code);

        let report = DetectionReport {
            ml_verdict,
            rule_verdict,
            signature_verdict,
        };
        log::debug!("Detection finished with {} positive strategies", report.agreement());
        report
    }

    fn ml_verdict(&self, code: &str) -> MlVerdict {
        // One snapshot for the whole prediction
        let Some(artifact) = self.pipeline.handle().get() else {
            return MlVerdict::ModelUnavailable {
                reason: "no trained model; run `vulnsentry train` first".to_string(),
            };
        };

        match artifact.predict(code) {
            Ok(label) => MlVerdict::Prediction {
                vulnerable: !label.is_safe(&self.safe_label),
                label,
            },
            Err(e) => {
                log::warn!("Prediction with model {} failed: {}", artifact.run_id, e);
                MlVerdict::ModelUnavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Record a labeled snippet and retrain. Later detections use the new model.
    pub fn submit_feedback(&self, code: &str, label: &str) -> Result<FeedbackOutcome> {
        self.pipeline.retrain_with_feedback(code, label)
    }

    pub fn train(&self) -> Result<TrainingOutcome> {
        self.pipeline.train_from_scratch()
    }

    /// Re-read the current model from disk. Returns its run id.
    pub fn reload(&self) -> Result<Option<String>> {
        let handle = self.pipeline.handle();
        match self.pipeline.artifacts().load_current()? {
            Some(artifact) => Ok(Some(handle.publish(artifact).run_id.clone())),
            None => {
                handle.clear();
                Ok(None)
            }
        }
    }

    pub fn pipeline(&self) -> &TrainingPipeline {
        &self.pipeline
    }

    pub fn signatures(&self) -> &SignatureStore {
        &self.signatures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use vulnsentry_core::{Label, RuleVerdict, SignatureVerdict};

    fn config(root: &std::path::Path) -> VulnsentryConfig {
        let mut config = VulnsentryConfig::default();
        config.paths.data_dir = root.to_path_buf();
        config.training.n_trees = 10;
        config.training.forest_seed = Some(5);
        config
    }

    #[test]
    fn test_detect_without_model_still_runs_other_strategies() {
        let temp_dir = TempDir::new().unwrap();
        let detector = Detector::open(&config(temp_dir.path())).unwrap();

        let report = detector.detect("eval(user_input)");
        assert!(matches!(report.ml_verdict, MlVerdict::ModelUnavailable { .. }));
        assert!(report.rule_verdict.is_flagged());
        assert_eq!(report.signature_verdict, SignatureVerdict::NoMatch);
    }

    #[test]
    fn test_corrupt_signature_database_still_yields_full_report() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());
        let path = config.paths.signatures_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let detector = Detector::open(&config).unwrap();
        detector.submit_feedback("eval(payload)", "rce").unwrap();

        let report = detector.detect("eval(user_input)");
        assert!(matches!(report.ml_verdict, MlVerdict::Prediction { .. }));
        assert!(report.rule_verdict.is_flagged());
        assert_eq!(report.signature_verdict, SignatureVerdict::NoMatch);
    }

    #[test]
    fn test_detect_parse_error_keeps_other_verdicts() {
        let temp_dir = TempDir::new().unwrap();
        let detector = Detector::open(&config(temp_dir.path())).unwrap();
        detector
            .signatures()
            .refresh(&json!([{
                "pattern": "print((",
                "description": "broken",
                "CVE": "CVE-2024-9999",
                "severity": "low"
            }]))
            .unwrap();

        let report = detector.detect("print((");
        assert!(matches!(report.rule_verdict, RuleVerdict::ParseError { .. }));
        assert!(matches!(report.signature_verdict, SignatureVerdict::Match { .. }));
    }

    #[test]
    fn test_feedback_publishes_model_for_detection() {
        let temp_dir = TempDir::new().unwrap();
        let detector = Detector::open(&config(temp_dir.path())).unwrap();

        detector.submit_feedback("eval(payload)", "rce").unwrap();

        match detector.detect("eval(other)").ml_verdict {
            MlVerdict::Prediction { label, vulnerable } => {
                assert_eq!(label, Label::parse("rce").unwrap());
                assert!(vulnerable);
            }
            other => panic!("expected a prediction, got {:?}", other),
        }
    }

    #[test]
    fn test_safe_prediction_is_not_vulnerable() {
        let temp_dir = TempDir::new().unwrap();
        let detector = Detector::open(&config(temp_dir.path())).unwrap();
        detector.submit_feedback("print(1)", "safe").unwrap();

        let report = detector.detect("print(2)");
        assert_eq!(
            report.ml_verdict,
            MlVerdict::Prediction {
                label: Label::parse("safe").unwrap(),
                vulnerable: false,
            }
        );
        assert!(!report.has_findings());
    }

    #[test]
    fn test_reload_picks_up_model_trained_elsewhere() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());
        let detector = Detector::open(&config).unwrap();
        assert_eq!(detector.reload().unwrap(), None);

        let trainer = Detector::open(&config).unwrap();
        let outcome = trainer.submit_feedback("eval(x)", "rce").unwrap();

        assert_eq!(detector.reload().unwrap(), Some(outcome.run_id));
        assert!(matches!(
            detector.detect("eval(y)").ml_verdict,
            MlVerdict::Prediction { .. }
        ));
    }
}
