//! Greedy monotone boundary search over context sizes.
//!
//! Starts at `start_size`, advances by `step_size` after every accepted step
//! and stops at the first rejection or fatal backend error. No backtracking:
//! the recommendation is the last accepted size.

use super::policy::{AcceptancePolicy, Verdict};
use super::trial::TrialRunner;
use super::types::{ProbeConfig, ProbeOutcome, ProbeRun, StopReason};
use crate::report;

/// Controller state between steps.
#[derive(Debug, Clone, PartialEq)]
enum ProbeState {
    /// About to measure `context_size`.
    Probing { context_size: u32 },
    /// `context_size` was accepted; the next size is chosen from here.
    AcceptedStep { context_size: u32 },
    Stopped(StopReason),
}

pub struct ProbeController<'a> {
    config: &'a ProbeConfig,
    runner: TrialRunner<'a>,
    policy: AcceptancePolicy,
}

impl<'a> ProbeController<'a> {
    pub fn new(config: &'a ProbeConfig, runner: TrialRunner<'a>) -> Self {
        Self {
            config,
            runner,
            policy: AcceptancePolicy::from_config(config),
        }
    }

    /// Probe until the stopping rule fires.
    ///
    /// If the first step is rejected the outcome keeps the start size and the
    /// [`ProbeOutcome::NO_PRIOR_SUCCESS`] rate.
    pub fn run(&self) -> ProbeRun {
        let _span = tracing::info_span!("probe", model = %self.config.model).entered();
        report::log_run_header(self.config);

        let mut best = ProbeOutcome::initial(self.config.start_size);
        let mut steps = Vec::new();
        let mut state = ProbeState::Probing {
            context_size: self.config.start_size,
        };

        let stop_reason = loop {
            state = match state {
                ProbeState::Probing { context_size } => {
                    tracing::info!("Testing context size: {context_size}");

                    match self.runner.evaluate(self.config, context_size) {
                        Ok(step) => {
                            let verdict = self.policy.judge(&step);
                            report::log_step(&step, &verdict);

                            let next = match verdict {
                                Verdict::Accepted => {
                                    best = ProbeOutcome {
                                        recommended_context_size: context_size,
                                        tokens_per_second: step.mean_tokens_per_second,
                                    };
                                    ProbeState::AcceptedStep { context_size }
                                }
                                Verdict::Rejected(reasons) => {
                                    ProbeState::Stopped(StopReason::Rejected {
                                        context_size,
                                        reasons,
                                    })
                                }
                            };
                            steps.push(step);
                            next
                        }
                        Err(e) => ProbeState::Stopped(StopReason::BackendFailure {
                            context_size,
                            error: e.to_string(),
                        }),
                    }
                }
                ProbeState::AcceptedStep { context_size } => {
                    match context_size.checked_add(self.config.step_size) {
                        Some(next) => ProbeState::Probing { context_size: next },
                        None => ProbeState::Stopped(StopReason::ContextSizeOverflow {
                            context_size,
                        }),
                    }
                }
                ProbeState::Stopped(reason) => break reason,
            };
        };

        report::log_stop(&stop_reason);

        ProbeRun {
            outcome: best,
            steps,
            stop_reason,
        }
    }
}
