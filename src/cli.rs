use std::path::PathBuf;

use clap::Parser;

use crate::config;
use crate::error::SetupError;
use crate::inference::validate_model_name;
use crate::probe::ProbeConfig;

/// Find the largest context size a local Ollama model can serve at an
/// acceptable generation rate.
#[derive(Parser, Debug, Clone)]
#[command(name = config::APP_NAME)]
#[command(version)]
pub struct Cli {
    /// Name of the Ollama model to test (e.g. llama3:8b)
    pub model: String,

    /// Minimum acceptable tokens per second
    #[arg(long = "min_token_rate", default_value_t = config::DEFAULT_MIN_TOKEN_RATE)]
    pub min_token_rate: f64,

    /// Starting context size
    #[arg(long, default_value_t = config::DEFAULT_START_SIZE)]
    pub start: u32,

    /// Context size increment
    #[arg(long, default_value_t = config::DEFAULT_STEP_SIZE)]
    pub step: u32,

    /// Number of tests per context size
    #[arg(long, default_value_t = config::DEFAULT_TRIALS)]
    pub tests: u32,

    /// Timeout in seconds for each request
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Attempts per request before a timed-out test is given up
    #[arg(long, default_value_t = config::DEFAULT_MAX_RETRIES)]
    pub retries: u32,

    /// Ollama base URL (loopback only)
    #[arg(long, env = config::BASE_URL_ENV, default_value = config::DEFAULT_BASE_URL)]
    pub host: String,

    /// Directory for the run log and JSON report [default: logs]
    #[arg(long = "log_dir")]
    pub log_dir: Option<String>,

    /// Skip writing the JSON report
    #[arg(long = "no_report")]
    pub no_report: bool,
}

impl Cli {
    /// Build and validate the probe configuration.
    pub fn to_probe_config(&self) -> Result<ProbeConfig, SetupError> {
        let config = ProbeConfig {
            model: self.model.clone(),
            start_size: self.start,
            step_size: self.step,
            min_token_rate: self.min_token_rate,
            trials_per_size: self.tests,
            timeout_secs: self.timeout,
            max_retries: self.retries,
        };
        config.validate()?;
        validate_model_name(&config.model)?;
        Ok(config)
    }

    /// Where the run log and JSON report go.
    pub fn logs_dir(&self) -> PathBuf {
        config::logs_dir(self.log_dir.as_deref())
    }

    /// Base URL in the form the HTTP client expects.
    pub fn base_url(&self) -> String {
        normalize_host(&self.host)
    }
}

/// `OLLAMA_HOST` is often set without a scheme (`127.0.0.1:11434`) or to the
/// server's bind address. Add `http://` when missing and map `0.0.0.0` to
/// loopback.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    with_scheme.replacen("://0.0.0.0", "://127.0.0.1", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceError;
    use crate::probe::ConfigError;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ctxprobe"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_probe_defaults() {
        let cli = parse(&["llama3", "--host", "http://localhost:11434"]);
        let config = cli.to_probe_config().unwrap();
        assert_eq!(config, ProbeConfig::new("llama3"));
        assert_eq!(cli.logs_dir(), PathBuf::from("logs"));
        assert!(!cli.no_report);
    }

    #[test]
    fn underscore_flags_are_accepted() {
        let cli = parse(&[
            "codestral:latest",
            "--min_token_rate",
            "25.5",
            "--start",
            "2048",
            "--step",
            "512",
            "--tests",
            "5",
            "--timeout",
            "120",
            "--retries",
            "2",
            "--log_dir",
            "/tmp/probe-logs",
            "--no_report",
        ]);
        let config = cli.to_probe_config().unwrap();
        assert_eq!(config.min_token_rate, 25.5);
        assert_eq!(config.start_size, 2048);
        assert_eq!(config.step_size, 512);
        assert_eq!(config.trials_per_size, 5);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.max_retries, 2);
        assert_eq!(cli.logs_dir(), PathBuf::from("/tmp/probe-logs"));
        assert!(cli.no_report);
    }

    #[test]
    fn model_is_required() {
        assert!(Cli::try_parse_from(["ctxprobe"]).is_err());
    }

    #[test]
    fn zero_step_is_config_error() {
        let cli = parse(&["llama3", "--step", "0"]);
        assert!(matches!(
            cli.to_probe_config(),
            Err(SetupError::Config(ConfigError::ZeroStepSize))
        ));
    }

    #[test]
    fn bad_model_name_is_rejected() {
        let cli = parse(&["../etc/passwd"]);
        assert!(matches!(
            cli.to_probe_config(),
            Err(SetupError::Backend(InferenceError::InvalidModelName(_)))
        ));
    }

    #[test]
    fn host_without_scheme_gets_http() {
        assert_eq!(normalize_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_host("localhost:11434/"), "http://localhost:11434");
    }

    #[test]
    fn bind_all_host_maps_to_loopback() {
        assert_eq!(normalize_host("0.0.0.0:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_host("http://0.0.0.0"), "http://127.0.0.1");
    }

    #[test]
    fn full_url_is_kept() {
        assert_eq!(
            normalize_host("http://localhost:11434"),
            "http://localhost:11434"
        );
    }
}
