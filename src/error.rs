use std::path::PathBuf;

use thiserror::Error;

use crate::inference::InferenceError;
use crate::probe::ConfigError;

/// Errors raised before the probe starts. These are the only failures that
/// give the process a non-zero exit status.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot reach Ollama: {0}")]
    Backend(#[from] InferenceError),

    #[error("Cannot create log directory {path}: {source}")]
    LogDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Logging already initialised: {0}")]
    Logging(String),
}
