//! Repeated measurement at a single context size.
//!
//! Attempts run strictly one after another so every memory sample reflects a
//! single request. A failed attempt is recorded and the step continues; only
//! a fatal backend error aborts the step.

use std::time::Duration;

use super::types::{ProbeConfig, StepResult, TrialResult};
use crate::config;
use crate::inference::{build_prompt, generate_with_retry, InferenceBackend, InferenceError};
use crate::memory::MemorySampler;
use crate::report;

pub struct TrialRunner<'a> {
    backend: &'a dyn InferenceBackend,
    memory: &'a dyn MemorySampler,
    retry_delay: Duration,
}

impl<'a> TrialRunner<'a> {
    pub fn new(backend: &'a dyn InferenceBackend, memory: &'a dyn MemorySampler) -> Self {
        Self {
            backend,
            memory,
            retry_delay: config::RETRY_DELAY,
        }
    }

    /// Override the pause between timed-out attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run `config.trials_per_size` attempts at `context_size`.
    ///
    /// Returns `Err` only for fatal backend errors (see
    /// [`InferenceError::is_fatal`]); the partial step is discarded. An
    /// unreachable server counts as fatal only on the first trial.
    pub fn evaluate(
        &self,
        config: &ProbeConfig,
        context_size: u32,
    ) -> Result<StepResult, InferenceError> {
        let _span = tracing::info_span!("step", context_size).entered();

        tracing::info!("Context Size: {context_size}");
        tracing::info!("{}", "-".repeat(50));

        let initial = self.memory.sample();
        tracing::info!("Initial VRAM Usage: {initial}");

        let plan = build_prompt(context_size);
        tracing::debug!(
            estimated_tokens = plan.estimated_tokens,
            repetitions = plan.repetitions,
            "Prompt prepared"
        );

        let policy = config.retry_policy().with_delay(self.retry_delay);
        let mut trials = Vec::with_capacity(config.trials_per_size as usize);
        let mut last_memory = initial;

        for trial_number in 1..=config.trials_per_size {
            let result = generate_with_retry(
                self.backend,
                &config.model,
                &plan.text,
                context_size,
                &policy,
            );

            let memory = self.memory.sample();
            last_memory = memory;

            let base = TrialResult {
                trial_number,
                context_size,
                tokens_generated: 0,
                compute_time_secs: None,
                tokens_per_second: None,
                memory,
                success: false,
                failure_reason: None,
                prompt_chars: plan.text.len(),
                estimated_prompt_tokens: plan.estimated_tokens,
                prompt_tokens_evaluated: None,
                response_chars: 0,
                response_words: 0,
            };

            let trial = match result {
                Ok(generation) => {
                    let measured = TrialResult {
                        tokens_generated: generation.tokens_generated,
                        compute_time_secs: generation.compute_time_secs,
                        prompt_tokens_evaluated: generation.prompt_tokens,
                        response_chars: generation.text.chars().count(),
                        response_words: generation.text.split_whitespace().count(),
                        ..base
                    };
                    match generation.tokens_per_second() {
                        Some(rate) => {
                            let trial = TrialResult {
                                tokens_per_second: Some(rate),
                                success: true,
                                ..measured
                            };
                            report::log_trial(&trial, &plan.text, &generation.text);
                            trial
                        }
                        None => {
                            let reason = "Compute time missing or zero; rate undefined";
                            tracing::error!("Error in test {trial_number}: {reason}");
                            TrialResult {
                                failure_reason: Some(reason.to_string()),
                                ..measured
                            }
                        }
                    }
                }
                Err(e) if aborts_step(&e, trial_number) => {
                    tracing::error!("Error in test {trial_number}: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Error in test {trial_number}: {e}");
                    TrialResult {
                        failure_reason: Some(e.to_string()),
                        ..base
                    }
                }
            };

            trials.push(trial);
        }

        let step = StepResult::from_trials(context_size, trials, last_memory);

        if step.is_failed() {
            tracing::warn!("All tests failed for context size {context_size}");
        } else {
            tracing::info!(
                "Average tokens/sec for context size {context_size}: {:.2}",
                step.mean_tokens_per_second
            );
        }

        Ok(step)
    }
}

/// Fatal errors abort the step. A lost connection only does so on the first
/// trial; later in the step it fails that trial alone.
fn aborts_step(error: &InferenceError, trial_number: u32) -> bool {
    match error {
        InferenceError::Connection(_) => trial_number == 1,
        e => e.is_fatal(),
    }
}
