use anyhow::Result;
use std::path::Path;

use crate::cli::args::OutputFormat;
use crate::cli::commands::{print_json, read_snippet};
use crate::config::VulnsentryConfig;
use crate::detector::Detector;

pub async fn run_detect_command(
    config: &VulnsentryConfig,
    file: Option<&Path>,
    code: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let snippet = read_snippet(file, code)?;
    let detector = Detector::open(config)?;
    let report = detector.detect(&snippet);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("{}", report);
            if report.has_findings() {
                println!("\n⚠️  {} of 3 strategies reported a finding", report.agreement());
            }
        }
    }
    Ok(())
}
