//! Human-readable run records and the JSON run report.
//!
//! Everything here goes through `tracing`, so the same records land on the
//! console and in the per-run log file.

use std::path::Path;

use serde::Serialize;

use crate::config;
use crate::memory::MemoryReading;
use crate::probe::{
    ProbeConfig, ProbeOutcome, ProbeRun, StepResult, StopReason, TrialResult, Verdict,
};

/// Characters of prompt/response text echoed per trial.
const PREVIEW_CHARS: usize = 200;

const RULE_WIDTH: usize = 50;
const SUMMARY_RULE_WIDTH: usize = 60;

/// First `max_chars` characters of `text` (char-boundary safe).
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn log_run_header(config: &ProbeConfig) {
    tracing::info!("Starting maximum context size test for model: {}", config.model);
    tracing::info!("Parameters:");
    tracing::info!("  Minimum acceptable token rate: {} tokens/sec", config.min_token_rate);
    tracing::info!("  Starting context size: {}", config.start_size);
    tracing::info!("  Step size: {}", config.step_size);
    tracing::info!("  Tests per context size: {}", config.trials_per_size);
    tracing::info!("  Request timeout: {}s ({} attempts)", config.timeout_secs, config.max_retries);
    tracing::info!("{}", "=".repeat(RULE_WIDTH));
}

/// Detailed record for one successful trial.
pub fn log_trial(trial: &TrialResult, prompt: &str, response: &str) {
    let n = trial.trial_number;
    tracing::info!(
        test = n,
        context_size = trial.context_size,
        tokens = trial.tokens_generated,
        tokens_per_sec = trial.tokens_per_second.unwrap_or(0.0),
        "Test {n} Details:"
    );
    tracing::info!("  Test Number: {n}");
    tracing::info!("  Prompt Length (chars): {}", trial.prompt_chars);
    tracing::info!("  Prompt Tokens: {}", trial.estimated_prompt_tokens);
    if let Some(evaluated) = trial.prompt_tokens_evaluated {
        tracing::info!("  Prompt Tokens Evaluated: {evaluated}");
    }
    tracing::info!("  Response Length (chars): {}", trial.response_chars);
    tracing::info!("  Response Words: {}", trial.response_words);
    tracing::info!("  Response Estimated Tokens: {}", trial.response_estimated_tokens());
    tracing::info!("  Total Tokens Processed: {}", trial.tokens_generated);
    tracing::info!("  Tokens/sec: {:.2}", trial.tokens_per_second.unwrap_or(0.0));
    tracing::info!("  Eval Duration: {:.2}s", trial.compute_time_secs.unwrap_or(0.0));
    tracing::info!("  VRAM Usage: {}", trial.memory);
    tracing::info!("Prompt Preview (first {PREVIEW_CHARS} chars):");
    tracing::info!("  {}...", preview(prompt, PREVIEW_CHARS));
    tracing::info!("Response Preview (first {PREVIEW_CHARS} chars):");
    tracing::info!("  {}...", preview(response, PREVIEW_CHARS));
}

/// Memory as shown per step. The zero reading means no tool answered.
pub fn memory_status(reading: &MemoryReading) -> String {
    if reading.is_available() {
        reading.to_string()
    } else {
        "unavailable (memory check inconclusive)".to_string()
    }
}

pub fn log_step(step: &StepResult, verdict: &Verdict) {
    tracing::info!(
        context_size = step.context_size,
        successful = step.successful_trials(),
        attempted = step.trials.len(),
        "Status: {}",
        verdict.label()
    );
    tracing::info!("Token Rate: {:.2} tokens/sec", step.mean_tokens_per_second);
    tracing::info!("VRAM Usage: {}", memory_status(&step.memory));
}

pub fn log_stop(reason: &StopReason) {
    match reason {
        StopReason::Rejected { .. } => tracing::info!("Stopping due to: {reason}"),
        StopReason::BackendFailure { .. } => tracing::error!("{reason}"),
        StopReason::ContextSizeOverflow { .. } => tracing::warn!("Stopping: {reason}"),
    }
}

/// Rate as shown in the summary. The no-success sentinel is spelled out.
pub fn format_rate(outcome: &ProbeOutcome) -> String {
    if outcome.rate_measured() {
        format!("{:.2}", outcome.tokens_per_second)
    } else {
        format!("{} (no context size met the threshold)", outcome.tokens_per_second)
    }
}

/// Final summary block. Emitted for every completed run.
pub fn log_summary(outcome: &ProbeOutcome, config: &ProbeConfig) {
    tracing::info!("{}", "=".repeat(SUMMARY_RULE_WIDTH));
    tracing::info!("FINAL RESULTS:");
    tracing::info!(
        "Maximum recommended context size: {}",
        outcome.recommended_context_size
    );
    tracing::info!(
        "Average tokens per second at max context: {}",
        format_rate(outcome)
    );
    tracing::info!("Minimum token rate threshold: {}", config.min_token_rate);
    tracing::info!("{}", "=".repeat(SUMMARY_RULE_WIDTH));
}

// ═══════════════════════════════════════════════════════════
// JSON report
// ═══════════════════════════════════════════════════════════

/// Serialized form of a whole run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub app: &'static str,
    pub version: &'static str,
    pub generated_at: String,
    pub config: &'a ProbeConfig,
    pub outcome: &'a ProbeOutcome,
    pub rate_measured: bool,
    pub stop_reason: &'a StopReason,
    pub steps: &'a [StepResult],
}

impl<'a> RunReport<'a> {
    pub fn new(config: &'a ProbeConfig, run: &'a ProbeRun) -> Self {
        Self {
            app: config::APP_NAME,
            version: config::APP_VERSION,
            generated_at: chrono::Local::now().to_rfc3339(),
            config,
            outcome: &run.outcome,
            rate_measured: run.outcome.rate_measured(),
            stop_reason: &run.stop_reason,
            steps: &run.steps,
        }
    }
}

/// Write the run as pretty-printed JSON.
pub fn write_json_report(
    path: &Path,
    config: &ProbeConfig,
    run: &ProbeRun,
) -> std::io::Result<()> {
    let report = RunReport::new(config, run);
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)?;
    tracing::debug!(path = %path.display(), "Run report written");
    Ok(())
}
