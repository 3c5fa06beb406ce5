use serde::Serialize;

use super::types::{ProbeConfig, RejectionReason, StepResult};
use crate::config;

/// Outcome of judging one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", content = "reasons", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(Vec<RejectionReason>),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Status label written to the log.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "GOOD",
            Self::Rejected(_) => "SLOW/HIGH VRAM",
        }
    }
}

/// A step is accepted iff its mean rate meets the minimum and memory stays
/// below the limit. Either violation alone rejects it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptancePolicy {
    pub min_token_rate: f64,
    pub max_memory_percent: f64,
}

impl AcceptancePolicy {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            min_token_rate: config.min_token_rate,
            max_memory_percent: config::MAX_MEMORY_PERCENT,
        }
    }

    pub fn judge(&self, step: &StepResult) -> Verdict {
        let mut reasons = Vec::new();

        if step.mean_tokens_per_second < self.min_token_rate {
            reasons.push(RejectionReason::TokenRateBelowMinimum {
                rate: step.mean_tokens_per_second,
                minimum: self.min_token_rate,
            });
        }

        let memory_percent = step.memory.percent();
        if memory_percent >= self.max_memory_percent {
            reasons.push(RejectionReason::MemoryTooHigh {
                percent: memory_percent,
                limit: self.max_memory_percent,
            });
        }

        if reasons.is_empty() {
            Verdict::Accepted
        } else {
            Verdict::Rejected(reasons)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryReading;

    fn step(rate: f64, used: f64, total: f64) -> StepResult {
        StepResult {
            context_size: 2048,
            trials: vec![],
            mean_tokens_per_second: rate,
            memory: MemoryReading::new(used, total),
        }
    }

    fn policy() -> AcceptancePolicy {
        AcceptancePolicy::from_config(&ProbeConfig::new("llama3"))
    }

    #[test]
    fn fast_and_roomy_is_accepted() {
        let verdict = policy().judge(&step(200.0, 1000.0, 8000.0));
        assert_eq!(verdict, Verdict::Accepted);
        assert_eq!(verdict.label(), "GOOD");
    }

    #[test]
    fn rate_exactly_at_minimum_is_accepted() {
        assert!(policy().judge(&step(10.0, 1000.0, 8000.0)).is_accepted());
    }

    #[test]
    fn slow_step_is_rejected() {
        let verdict = policy().judge(&step(0.1, 1000.0, 8000.0));
        match verdict {
            Verdict::Rejected(reasons) => {
                assert_eq!(reasons.len(), 1);
                assert!(matches!(reasons[0], RejectionReason::TokenRateBelowMinimum { .. }));
            }
            Verdict::Accepted => panic!("slow step must be rejected"),
        }
    }

    #[test]
    fn memory_above_limit_is_rejected() {
        let verdict = policy().judge(&step(200.0, 7960.0, 8000.0));
        assert!(matches!(
            verdict,
            Verdict::Rejected(ref r) if matches!(r[0], RejectionReason::MemoryTooHigh { .. })
        ));
        assert_eq!(verdict.label(), "SLOW/HIGH VRAM");
    }

    #[test]
    fn both_violations_are_reported() {
        match policy().judge(&step(1.0, 7990.0, 8000.0)) {
            Verdict::Rejected(reasons) => assert_eq!(reasons.len(), 2),
            Verdict::Accepted => panic!("expected rejection"),
        }
    }

    #[test]
    fn unknown_memory_does_not_reject() {
        assert!(policy().judge(&step(50.0, 0.0, 0.0)).is_accepted());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(!policy().judge(&step(0.0, 0.0, 0.0)).is_accepted());
    }
}
