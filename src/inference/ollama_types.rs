//! Ollama `/api/generate` wire types and endpoint validators.

use serde::{Deserialize, Serialize};

use super::InferenceError;

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

/// Request body for POST `/api/generate` (non-streaming).
#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions,
}

/// Per-request model options. Only the context window is varied.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct GenerateOptions {
    pub num_ctx: u32,
}

/// Response body from POST `/api/generate`.
///
/// Timing fields are nanoseconds. Ollama omits the counters on some
/// error paths, so every metric is optional.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
}

/// Nanoseconds to seconds.
pub(crate) fn nanos_to_secs(nanos: u64) -> f64 {
    nanos as f64 * 1e-9
}

// ──────────────────────────────────────────────
// Validators
// ──────────────────────────────────────────────

/// Validate that a base URL points to localhost only.
///
/// Accepts: localhost, 127.0.0.1, [::1] (IPv6 loopback).
pub fn validate_base_url(url: &str) -> Result<(), InferenceError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| InferenceError::InvalidUrl(url.to_string()))?;

    let host = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        after_scheme
            .split(':')
            .next()
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("")
    };

    match host {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        "" => Err(InferenceError::InvalidUrl(url.to_string())),
        _ => Err(InferenceError::NonLocalEndpoint),
    }
}

/// Validate a model name against the Ollama naming convention.
///
/// Format: `[namespace/]model[:tag]`, each segment starting alphanumeric.
/// The name also ends up in the log file name, so path separators beyond
/// the single namespace slash are rejected.
pub fn validate_model_name(name: &str) -> Result<(), InferenceError> {
    let valid = regex::Regex::new(
        r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$",
    )
    .expect("static regex");

    if name.is_empty() || !valid.is_match(name) {
        return Err(InferenceError::InvalidModelName(name.to_string()));
    }

    Ok(())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_num_ctx_option() {
        let req = GenerateRequest {
            model: "codestral:latest",
            prompt: "hi",
            stream: false,
            options: GenerateOptions { num_ctx: 4096 },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "codestral:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_ctx"], 4096);
    }

    #[test]
    fn response_deserializes_metrics() {
        let json = r#"{
            "model": "llama3",
            "response": "There are 42 characters.",
            "done": true,
            "eval_count": 100,
            "eval_duration": 500000000,
            "prompt_eval_count": 1024
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.response, "There are 42 characters.");
        assert_eq!(parsed.eval_count, Some(100));
        assert_eq!(parsed.eval_duration, Some(500_000_000));
        assert_eq!(parsed.prompt_eval_count, Some(1024));
    }

    #[test]
    fn response_tolerates_missing_metrics() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"response": "ok"}"#).unwrap();
        assert!(parsed.eval_count.is_none());
        assert!(parsed.eval_duration.is_none());
    }

    #[test]
    fn nanos_convert_to_seconds() {
        assert!((nanos_to_secs(500_000_000) - 0.5).abs() < 1e-12);
        assert_eq!(nanos_to_secs(0), 0.0);
    }

    #[test]
    fn validate_url_accepts_loopback_hosts() {
        assert!(validate_base_url("http://localhost:11434").is_ok());
        assert!(validate_base_url("http://localhost").is_ok());
        assert!(validate_base_url("http://127.0.0.1:11434").is_ok());
        assert!(validate_base_url("http://[::1]:11434").is_ok());
        assert!(validate_base_url("https://localhost:11434/").is_ok());
    }

    #[test]
    fn validate_url_rejects_remote_hosts() {
        assert!(matches!(
            validate_base_url("http://192.168.1.100:11434"),
            Err(InferenceError::NonLocalEndpoint)
        ));
        assert!(matches!(
            validate_base_url("https://api.example.com"),
            Err(InferenceError::NonLocalEndpoint)
        ));
    }

    #[test]
    fn validate_url_rejects_malformed() {
        assert!(matches!(validate_base_url(""), Err(InferenceError::InvalidUrl(_))));
        assert!(matches!(
            validate_base_url("localhost:11434"),
            Err(InferenceError::InvalidUrl(_))
        ));
        assert!(matches!(validate_base_url("http://"), Err(InferenceError::InvalidUrl(_))));
    }

    #[test]
    fn validate_name_accepts_ollama_names() {
        assert!(validate_model_name("codestral:latest").is_ok());
        assert!(validate_model_name("llama3.1:8b").is_ok());
        assert!(validate_model_name("qwen2.5-coder:7b").is_ok());
        assert!(validate_model_name("library/mistral").is_ok());
    }

    #[test]
    fn validate_name_rejects_unsafe_names() {
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("../etc/passwd").is_err());
        assert!(validate_model_name("a/b/c").is_err());
        assert!(validate_model_name("model name").is_err());
        assert!(validate_model_name("-flag").is_err());
    }
}
