//! Per-run log file plus console output.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config;
use crate::error::SetupError;

/// `context_test_<model>_<YYYYmmdd_HHMMSS>.log`
///
/// Characters that are awkward in file names (`:` and `/` are common in
/// Ollama tags) become `_`.
pub fn log_file_name(model: &str, timestamp: DateTime<Local>) -> String {
    let safe: String = model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "context_test_{safe}_{}.log",
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Create the log file under `dir` and install the global subscriber.
///
/// Records go to stdout (with ANSI colours) and to the file (plain text).
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(dir: &Path, model: &str) -> Result<PathBuf, SetupError> {
    let path = create_log_file_path(dir, model)?;
    let file = File::create(&path).map_err(|source| SetupError::LogFile {
        path: path.clone(),
        source,
    })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| SetupError::Logging(e.to_string()))?;

    Ok(path)
}

fn create_log_file_path(dir: &Path, model: &str) -> Result<PathBuf, SetupError> {
    fs::create_dir_all(dir).map_err(|source| SetupError::LogDirectory {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(dir.join(log_file_name(model, Local::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn file_name_embeds_model_and_timestamp() {
        assert_eq!(
            log_file_name("llama3", at(2024, 3, 9, 14, 5, 7)),
            "context_test_llama3_20240309_140507.log"
        );
    }

    #[test]
    fn file_name_sanitises_tag_and_namespace() {
        let name = log_file_name("library/codestral:latest", at(2024, 1, 1, 0, 0, 0));
        assert_eq!(name, "context_test_library_codestral_latest_20240101_000000.log");
    }

    #[test]
    fn log_path_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");

        let path = create_log_file_path(&dir, "llama3").unwrap();

        assert!(dir.is_dir());
        assert_eq!(path.parent().unwrap(), dir.as_path());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("context_test_llama3_"));
    }

    #[test]
    fn log_dir_blocked_by_file_is_setup_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("logs");
        fs::write(&blocker, "not a directory").unwrap();

        let err = create_log_file_path(&blocker, "llama3").unwrap_err();
        assert!(matches!(err, SetupError::LogDirectory { .. }));
    }
}
