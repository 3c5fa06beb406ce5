//! Bounded retry around a single generation request.
//!
//! Each attempt gets its own deadline. Only timeouts are retried; any other
//! error is returned from the attempt that raised it.

use std::time::Duration;

use super::{Generation, InferenceBackend, InferenceError};
use crate::config;

/// Attempt count, per-attempt deadline and pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts,
            timeout,
            delay: config::RETRY_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Run `backend.generate` until it succeeds, fails with a non-timeout error,
/// or `policy.max_attempts` attempts have timed out.
pub fn generate_with_retry(
    backend: &dyn InferenceBackend,
    model: &str,
    prompt: &str,
    context_size: u32,
    policy: &RetryPolicy,
) -> Result<Generation, InferenceError> {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match backend.generate(model, prompt, context_size, policy.timeout) {
            Ok(generation) => return Ok(generation),
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    "Attempt {attempt}/{attempts} timed out after {} seconds",
                    policy.timeout.as_secs()
                );
                if attempt < attempts {
                    tracing::info!("Retrying...");
                    std::thread::sleep(policy.delay);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(InferenceError::RetriesExhausted {
        attempts,
        timeout_secs: policy.timeout.as_secs(),
    })
}
