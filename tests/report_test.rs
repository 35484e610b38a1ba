use serde_json::json;
use tempfile::TempDir;
use vulnsentry::config::VulnsentryConfig;
use vulnsentry::detector::Detector;

fn detector(root: &std::path::Path) -> Detector {
    let mut config = VulnsentryConfig::default();
    config.paths.data_dir = root.to_path_buf();
    Detector::open(&config).unwrap()
}

#[test]
fn test_report_text_without_model() {
    let temp_dir = TempDir::new().unwrap();
    let report = detector(temp_dir.path()).detect("eval(z)");

    insta::assert_snapshot!(report.to_string(), @r"
ML analysis:      model unavailable: no trained model; run `vulnsentry train` first
Rule analysis:    flagged
  1:1 eval() - Use of eval(): evaluating dynamic input allows arbitrary code execution
Signature lookup: no match
");
}

#[test]
fn test_report_text_with_signature_match() {
    let temp_dir = TempDir::new().unwrap();
    let detector = detector(temp_dir.path());
    detector
        .signatures()
        .refresh(&json!([{
            "pattern": "os.system(x)",
            "description": "OS command injection",
            "CVE": "CVE-2024-1111",
            "severity": "high"
        }]))
        .unwrap();

    let report = detector.detect("os.system(x)");
    insta::assert_snapshot!(
        report.signature_verdict.to_string(),
        @"match: OS command injection (CVE-2024-1111, severity: high)"
    );
    insta::assert_snapshot!(report.rule_verdict.to_string(), @"no dangerous constructs found");

    // One trailing space is a different snippet
    let report = detector.detect("os.system(x) ");
    insta::assert_snapshot!(report.signature_verdict.to_string(), @"no match");
}

#[test]
fn test_report_json_shape() {
    let temp_dir = TempDir::new().unwrap();
    let report = detector(temp_dir.path()).detect("print(\"hello\"");

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["ml_verdict"]["status"], "model_unavailable");
    assert_eq!(value["rule_verdict"]["status"], "parse_error");
    assert_eq!(value["signature_verdict"]["status"], "no_match");
}
