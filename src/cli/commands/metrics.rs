use anyhow::Result;

use vulnsentry_ml::ArtifactStore;

use crate::cli::args::OutputFormat;
use crate::cli::commands::print_json;
use crate::config::VulnsentryConfig;

pub async fn run_metrics_command(config: &VulnsentryConfig, format: OutputFormat) -> Result<()> {
    let store = ArtifactStore::new(config.paths.model_dir_path(), config.training.keep_runs);
    let run_id = store.current_run_id()?;
    let metrics = store.load_metrics()?;

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Text => match (run_id, metrics) {
            (Some(run_id), Some(metrics)) => {
                println!("📊 Metrics of model run {}", run_id);
                println!("{}", metrics);
            }
            (Some(run_id), None) => {
                println!("Model run {} has no evaluation metrics", run_id);
                println!("💡 Run `vulnsentry train` to evaluate on a held-out split");
            }
            (None, _) => {
                println!("No model has been trained yet");
                println!("💡 Run `vulnsentry train` first");
            }
        },
    }
    Ok(())
}
