pub mod dataset;
pub mod detect;
pub mod feedback;
pub mod metrics;
pub mod signatures;
pub mod train;

pub use dataset::handle_dataset_command;
pub use detect::run_detect_command;
pub use feedback::run_feedback_command;
pub use metrics::run_metrics_command;
pub use signatures::handle_signature_command;
pub use train::run_train_command;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Snippet from `--code`, a file, or stdin, in that order of preference.
pub fn read_snippet(file: Option<&Path>, code: Option<&str>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code.to_string());
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read snippet from stdin")?;
    if buffer.is_empty() {
        return Err(anyhow!("No snippet given: pass FILE, --code or pipe it on stdin"));
    }
    Ok(buffer)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_inline_code_wins() {
        let snippet = read_snippet(Some(Path::new("/does/not/exist")), Some("eval(x)")).unwrap();
        assert_eq!(snippet, "eval(x)");
    }

    #[test]
    fn test_read_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "print(1)\n").unwrap();
        assert_eq!(read_snippet(Some(file.path()), None).unwrap(), "print(1)\n");
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_snippet(Some(Path::new("/does/not/exist.py")), None).unwrap_err();
        assert!(err.to_string().contains("/does/not/exist.py"));
    }
}
