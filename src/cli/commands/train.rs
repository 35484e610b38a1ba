use anyhow::Result;

use vulnsentry_ml::ModelHandle;

use crate::cli::args::OutputFormat;
use crate::cli::commands::print_json;
use crate::config::VulnsentryConfig;
use crate::training::TrainingPipeline;

pub async fn run_train_command(config: &VulnsentryConfig, format: OutputFormat) -> Result<()> {
    let config = config.clone();
    let dataset_path = config.paths.dataset_path();

    // Training is CPU bound
    let outcome = tokio::task::spawn_blocking(move || {
        TrainingPipeline::from_config(&config, ModelHandle::default()).train_from_scratch()
    })
    .await??;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => {
            println!("✅ Model trained from {}", dataset_path.display());
            println!("{}", outcome);
        }
    }
    Ok(())
}
