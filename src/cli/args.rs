use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the dataset, models and signature database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the classifier on the full dataset and record evaluation metrics
    Train {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Analyze a snippet with the classifier, the syntax rules and the signature store
    Detect {
        /// File containing the snippet (stdin when neither FILE nor --code is given)
        file: Option<PathBuf>,

        /// Snippet passed inline
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Add a labeled snippet to the dataset and retrain
    Feedback {
        /// Label of the snippet, e.g. `sql_injection` or `safe`
        #[arg(short, long)]
        label: String,

        file: Option<PathBuf>,

        #[arg(long, conflicts_with = "file")]
        code: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the metrics of the current model
    Metrics {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Inspect the training dataset
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Manage the known-signature database
    Signatures {
        #[command(subcommand)]
        action: SignatureAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatasetAction {
    /// Record count and label histogram
    Stats {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Subcommand, Debug)]
pub enum SignatureAction {
    /// Replace the signature database with a local JSON feed
    Import {
        /// JSON array of {pattern, description, CVE, severity} objects
        file: PathBuf,
    },

    /// Show signature database statistics
    Stats {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_detect() {
        let args = Args::parse_from(["vulnsentry", "detect", "--code", "eval(x)", "-f", "json"]);
        match args.command {
            Some(Commands::Detect { file, code, format }) => {
                assert!(file.is_none());
                assert_eq!(code.as_deref(), Some("eval(x)"));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_detect_file_and_code_conflict() {
        let result = Args::try_parse_from(["vulnsentry", "detect", "a.py", "--code", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "vulnsentry",
            "signatures",
            "import",
            "feed.json",
            "--data-dir",
            "/tmp/vs",
            "-vv",
        ]);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/vs")));
        assert_eq!(args.verbosity, 2);
        assert!(matches!(
            args.command,
            Some(Commands::Signatures {
                action: SignatureAction::Import { .. }
            })
        ));
    }

    #[test]
    fn test_feedback_requires_label() {
        assert!(Args::try_parse_from(["vulnsentry", "feedback", "--code", "x"]).is_err());
        let args =
            Args::parse_from(["vulnsentry", "feedback", "-l", "xss", "--code", "alert(1)"]);
        assert!(matches!(args.command, Some(Commands::Feedback { .. })));
    }
}
