//! Inference backend boundary.
//!
//! One generation request at a given context size, converted into the token
//! count and compute time the probe needs. The HTTP client lives in
//! [`ollama`]; [`retry`] wraps any backend with the bounded timeout retry.

pub mod mock;
pub mod ollama;
pub mod ollama_types;
pub mod prompt;
pub mod retry;

pub use mock::*;
pub use ollama::*;
pub use ollama_types::*;
pub use prompt::*;
pub use retry::*;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Ollama is not reachable at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("All {attempts} attempts timed out after {timeout_secs}s each")]
    RetriesExhausted { attempts: u32, timeout_secs: u64 },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    #[error("Only localhost connections are allowed")]
    NonLocalEndpoint,

    #[error("Invalid URL format: '{0}'")]
    InvalidUrl(String),
}

impl InferenceError {
    /// A single attempt exceeded its deadline. The only retryable class.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Errors that stop the whole probe rather than a single trial.
    ///
    /// Unreachable server, rejected request (e.g. unsupported context size)
    /// and unreadable responses. Exhausted retries and transport hiccups only
    /// fail the trial.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Api { .. }
                | Self::ResponseParsing(_)
                | Self::InvalidModelName(_)
                | Self::NonLocalEndpoint
                | Self::InvalidUrl(_)
        )
    }
}

/// Result of one completed generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Tokens produced by the model (`eval_count`).
    pub tokens_generated: u64,
    /// Prompt tokens the server evaluated, when reported.
    pub prompt_tokens: Option<u64>,
    /// Time spent generating, in seconds. `None` when the server omitted it.
    pub compute_time_secs: Option<f64>,
}

impl Generation {
    /// Generated tokens per second, or `None` when compute time is missing or zero.
    pub fn tokens_per_second(&self) -> Option<f64> {
        token_rate(self.tokens_generated, self.compute_time_secs)
    }
}

/// `tokens / seconds`, refusing zero, negative or non-finite durations.
pub fn token_rate(tokens: u64, compute_time_secs: Option<f64>) -> Option<f64> {
    let secs = compute_time_secs?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    let rate = tokens as f64 / secs;
    rate.is_finite().then_some(rate)
}

/// A generation service (allows mocking).
pub trait InferenceBackend {
    /// Issue one generation request, giving up after `timeout`.
    ///
    /// A request that exceeds `timeout` is abandoned client-side and reported
    /// as [`InferenceError::Timeout`]; the server is not told to cancel.
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        context_size: u32,
        timeout: Duration,
    ) -> Result<Generation, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(tokens: u64, secs: Option<f64>) -> Generation {
        Generation {
            text: String::new(),
            tokens_generated: tokens,
            prompt_tokens: None,
            compute_time_secs: secs,
        }
    }

    #[test]
    fn rate_is_tokens_over_seconds() {
        let rate = generation(100, Some(0.5)).tokens_per_second().unwrap();
        assert!((rate - 200.0).abs() < 1e-9);
    }

    #[test]
    fn zero_compute_time_has_no_rate() {
        assert!(generation(100, Some(0.0)).tokens_per_second().is_none());
    }

    #[test]
    fn missing_compute_time_has_no_rate() {
        assert!(generation(100, None).tokens_per_second().is_none());
    }

    #[test]
    fn non_finite_compute_time_has_no_rate() {
        assert!(token_rate(10, Some(f64::NAN)).is_none());
        assert!(token_rate(10, Some(f64::INFINITY)).is_none());
        assert!(token_rate(10, Some(-1.0)).is_none());
    }

    #[test]
    fn zero_tokens_is_a_zero_rate() {
        assert_eq!(token_rate(0, Some(2.0)), Some(0.0));
    }

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(InferenceError::Timeout(60).is_timeout());
        assert!(!InferenceError::Connection("x".into()).is_timeout());
        assert!(!InferenceError::RetriesExhausted { attempts: 3, timeout_secs: 60 }.is_timeout());
    }

    #[test]
    fn fatal_classification() {
        assert!(InferenceError::Connection("http://localhost:11434".into()).is_fatal());
        assert!(InferenceError::Api { status: 500, body: "boom".into() }.is_fatal());
        assert!(InferenceError::ResponseParsing("eof".into()).is_fatal());
        assert!(!InferenceError::Timeout(60).is_fatal());
        assert!(!InferenceError::RetriesExhausted { attempts: 3, timeout_secs: 60 }.is_fatal());
        assert!(!InferenceError::HttpClient("reset".into()).is_fatal());
    }

    #[test]
    fn exhausted_message_names_attempts() {
        let msg = InferenceError::RetriesExhausted { attempts: 3, timeout_secs: 60 }.to_string();
        assert_eq!(msg, "All 3 attempts timed out after 60s each");
    }

    #[test]
    fn backend_is_object_safe() {
        fn _assert_backend(_: &dyn InferenceBackend) {}
    }
}
