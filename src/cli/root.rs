use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::collections::HashMap;

use crate::cli::args::{Args, Commands};
use crate::cli::commands::{
    handle_dataset_command, handle_signature_command, run_detect_command, run_feedback_command,
    run_metrics_command, run_train_command,
};
use crate::config::VulnsentryConfig;

pub struct RootCommand;

impl RootCommand {
    pub async fn execute() -> Result<()> {
        let args = Args::parse();
        init_logging(args.verbosity);

        if args.generate_config {
            println!("{}", VulnsentryConfig::generate_default_config());
            return Ok(());
        }

        let Some(command) = args.command else {
            Args::command().print_help()?;
            return Ok(());
        };

        let env_vars: HashMap<String, String> = std::env::vars().collect();
        let config = VulnsentryConfig::load_with_precedence(
            args.config.as_deref(),
            args.data_dir.as_deref(),
            &env_vars,
        )?;
        log::debug!("Using data directory {}", config.paths.data_dir.display());

        match command {
            Commands::Train { format } => run_train_command(&config, format).await,
            Commands::Detect { file, code, format } => {
                run_detect_command(&config, file.as_deref(), code.as_deref(), format).await
            }
            Commands::Feedback {
                label,
                file,
                code,
                format,
            } => {
                run_feedback_command(&config, &label, file.as_deref(), code.as_deref(), format)
                    .await
            }
            Commands::Metrics { format } => run_metrics_command(&config, format).await,
            Commands::Dataset { action } => handle_dataset_command(&action, &config).await,
            Commands::Signatures { action } => handle_signature_command(&action, &config).await,
        }
    }
}

/// `RUST_LOG` wins; otherwise each `-v` raises the level from `warn`.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}
