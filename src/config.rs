use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "ctxprobe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local Ollama endpoint used when neither `--host` nor `OLLAMA_HOST` is set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Environment variable that overrides the Ollama endpoint.
pub const BASE_URL_ENV: &str = "OLLAMA_HOST";

/// Directory (relative to the working directory) that receives run logs.
pub const DEFAULT_LOGS_DIR: &str = "logs";

pub const DEFAULT_MIN_TOKEN_RATE: f64 = 10.0;
pub const DEFAULT_START_SIZE: u32 = 1024;
pub const DEFAULT_STEP_SIZE: u32 = 1024;
pub const DEFAULT_TRIALS: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause between a timed-out attempt and the next one.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on a single GPU memory sample (external tool invocation).
pub const MEMORY_SAMPLE_TIMEOUT: Duration = Duration::from_secs(2);

/// A step is rejected once device memory usage reaches this percentage.
pub const MAX_MEMORY_PERCENT: f64 = 99.0;

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info"
}

/// Resolve the logs directory, honouring an explicit override.
pub fn logs_dir(override_dir: Option<&str>) -> PathBuf {
    PathBuf::from(override_dir.unwrap_or(DEFAULT_LOGS_DIR))
}
