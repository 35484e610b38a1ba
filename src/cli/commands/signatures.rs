//! Signature database commands

use anyhow::Result;

use vulnsentry_signatures::SignatureStore;

use crate::cli::args::{OutputFormat, SignatureAction};
use crate::cli::commands::print_json;
use crate::config::VulnsentryConfig;

pub async fn handle_signature_command(
    action: &SignatureAction,
    config: &VulnsentryConfig,
) -> Result<()> {
    match action {
        SignatureAction::Import { file } => {
            // Import replaces the database, so an unreadable one is not fatal
            let store = SignatureStore::open_or_empty(config.paths.signatures_path());
            println!("🔄 Importing signatures");
            println!("   Feed: {}", file.display());
            println!("   Database: {}", store.path().display());

            let count = store.refresh_from_file(file)?;
            println!("\n✅ Signature database replaced with {} records", count);
        }

        SignatureAction::Stats { format } => {
            let store = SignatureStore::open(config.paths.signatures_path())?;
            let stats = store.stats();
            if *format == OutputFormat::Json {
                return print_json(&stats);
            }

            println!("📊 Signature statistics");
            println!("   Database: {}", store.path().display());
            println!("   Total records: {}", stats.total_records);
            println!("   Distinct hashes: {}", stats.distinct_hashes);

            if !stats.by_severity.is_empty() {
                println!("\nSeverity:");
                for (severity, count) in &stats.by_severity {
                    println!("   {:<12} {:>6}", severity, count);
                }
            }
        }
    }

    Ok(())
}
