use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::ConfigError;
use crate::config;
use crate::inference::RetryPolicy;
use crate::memory::MemoryReading;

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Parameters of one probe run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeConfig {
    pub model: String,
    pub start_size: u32,
    pub step_size: u32,
    /// Minimum acceptable generation rate (tokens/sec).
    pub min_token_rate: f64,
    pub trials_per_size: u32,
    /// Per-request deadline, in seconds.
    pub timeout_secs: u64,
    /// Attempts per request when attempts time out.
    pub max_retries: u32,
}

impl ProbeConfig {
    /// Defaults matching the command line.
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            start_size: config::DEFAULT_START_SIZE,
            step_size: config::DEFAULT_STEP_SIZE,
            min_token_rate: config::DEFAULT_MIN_TOKEN_RATE,
            trials_per_size: config::DEFAULT_TRIALS,
            timeout_secs: config::DEFAULT_TIMEOUT_SECS,
            max_retries: config::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if self.start_size == 0 {
            return Err(ConfigError::ZeroStartSize);
        }
        if self.step_size == 0 {
            return Err(ConfigError::ZeroStepSize);
        }
        if self.trials_per_size == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !self.min_token_rate.is_finite() || self.min_token_rate <= 0.0 {
            return Err(ConfigError::InvalidTokenRate(self.min_token_rate));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.timeout())
    }
}

// ═══════════════════════════════════════════════════════════
// Trial / step results
// ═══════════════════════════════════════════════════════════

/// One attempt at one context size. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    /// 1-based position within its step.
    pub trial_number: u32,
    pub context_size: u32,
    pub tokens_generated: u64,
    pub compute_time_secs: Option<f64>,
    pub tokens_per_second: Option<f64>,
    /// Memory sampled right after the attempt.
    pub memory: MemoryReading,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub prompt_chars: usize,
    pub estimated_prompt_tokens: u32,
    /// Prompt tokens the server reports having evaluated.
    pub prompt_tokens_evaluated: Option<u64>,
    pub response_chars: usize,
    pub response_words: usize,
}

impl TrialResult {
    /// Rough token estimate for the response text (words × 1.3).
    pub fn response_estimated_tokens(&self) -> u64 {
        (self.response_words as f64 * 1.3) as u64
    }
}

/// All trials at one context size, aggregated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub context_size: u32,
    pub trials: Vec<TrialResult>,
    /// Mean over successful trials; 0 when none succeeded.
    pub mean_tokens_per_second: f64,
    /// Last memory sample taken during the step, failed attempts included.
    pub memory: MemoryReading,
}

impl StepResult {
    pub fn from_trials(context_size: u32, trials: Vec<TrialResult>, memory: MemoryReading) -> Self {
        let rates: Vec<f64> = trials
            .iter()
            .filter(|t| t.success)
            .filter_map(|t| t.tokens_per_second)
            .collect();

        let mean_tokens_per_second = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };

        Self {
            context_size,
            trials,
            mean_tokens_per_second,
            memory,
        }
    }

    pub fn successful_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.success).count()
    }

    /// No trial at this size succeeded.
    pub fn is_failed(&self) -> bool {
        self.successful_trials() == 0
    }
}

// ═══════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════

/// The answer a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub recommended_context_size: u32,
    /// Rate achieved at the recommended size. [`ProbeOutcome::NO_PRIOR_SUCCESS`]
    /// when not even the first step was accepted.
    pub tokens_per_second: f64,
}

impl ProbeOutcome {
    /// Rate reported when no step was accepted.
    pub const NO_PRIOR_SUCCESS: f64 = f64::INFINITY;

    /// Outcome before any step has been accepted.
    pub fn initial(start_size: u32) -> Self {
        Self {
            recommended_context_size: start_size,
            tokens_per_second: Self::NO_PRIOR_SUCCESS,
        }
    }

    /// Whether `tokens_per_second` is a real measurement.
    pub fn rate_measured(&self) -> bool {
        self.tokens_per_second.is_finite()
    }
}

/// Why a step failed the acceptance policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    TokenRateBelowMinimum { rate: f64, minimum: f64 },
    MemoryTooHigh { percent: f64, limit: f64 },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenRateBelowMinimum { rate, minimum } => write!(
                f,
                "Token rate below minimum threshold of {minimum} ({rate:.2} tokens/sec)"
            ),
            Self::MemoryTooHigh { percent, limit } => {
                write!(f, "VRAM usage too high ({percent:.1}% >= {limit}%)")
            }
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The step at `context_size` failed the acceptance policy.
    Rejected {
        context_size: u32,
        reasons: Vec<RejectionReason>,
    },
    /// The backend failed fatally while measuring `context_size`.
    BackendFailure { context_size: u32, error: String },
    /// The next context size does not fit in a `u32`.
    ContextSizeOverflow { context_size: u32 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reasons, .. } => {
                let joined: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                write!(f, "{}", joined.join(", "))
            }
            Self::BackendFailure {
                context_size,
                error,
            } => write!(f, "Error occurred at context size {context_size}: {error}"),
            Self::ContextSizeOverflow { context_size } => {
                write!(f, "No larger context size representable after {context_size}")
            }
        }
    }
}

/// Full record of a run: outcome plus every measured step in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeRun {
    pub outcome: ProbeOutcome,
    pub steps: Vec<StepResult>,
    pub stop_reason: StopReason,
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
