use anyhow::Result;
use std::path::Path;

use vulnsentry_ml::ModelHandle;

use crate::cli::args::OutputFormat;
use crate::cli::commands::{print_json, read_snippet};
use crate::config::VulnsentryConfig;
use crate::training::TrainingPipeline;

pub async fn run_feedback_command(
    config: &VulnsentryConfig,
    label: &str,
    file: Option<&Path>,
    code: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let snippet = read_snippet(file, code)?;
    let config = config.clone();
    let label = label.to_string();

    let outcome = tokio::task::spawn_blocking(move || {
        TrainingPipeline::from_config(&config, ModelHandle::default())
            .retrain_with_feedback(&snippet, &label)
    })
    .await??;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => {
            println!("✅ Recorded snippet as {}", outcome.label);
            println!("   Dataset size: {}", outcome.dataset_size);
            println!("   Model run: {}", outcome.run_id);
        }
    }
    Ok(())
}
