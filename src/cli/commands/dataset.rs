//! Dataset inspection commands

use anyhow::Result;

use crate::cli::args::{DatasetAction, OutputFormat};
use crate::cli::commands::print_json;
use crate::config::VulnsentryConfig;
use crate::dataset::DatasetStore;

pub async fn handle_dataset_command(action: &DatasetAction, config: &VulnsentryConfig) -> Result<()> {
    let store = DatasetStore::new(config.paths.dataset_path());

    match action {
        DatasetAction::Stats { format } => {
            let stats = store.stats()?;
            if *format == OutputFormat::Json {
                return print_json(&stats);
            }

            println!("📊 Dataset statistics");
            println!("   File: {}", store.path().display());
            println!("   Total records: {}", stats.total_records);

            if stats.labels.is_empty() {
                println!("\n💡 Dataset is empty");
                return Ok(());
            }

            println!("\nLabels:");
            let min_support = config.training.min_label_support;
            for (label, count) in &stats.labels {
                let note = if *count < min_support {
                    "  (dropped by full training)"
                } else {
                    ""
                };
                println!("   {:<24} {:>6}{}", label, count, note);
            }
        }
    }

    Ok(())
}
