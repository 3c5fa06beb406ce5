//! Adaptive context-size probe.
//!
//! [`TrialRunner`] measures one context size, [`AcceptancePolicy`] judges the
//! measurement, and [`ProbeController`] walks the context size upward until a
//! step is rejected or the backend fails.

pub mod controller;
pub mod policy;
pub mod trial;
pub mod types;

pub use controller::*;
pub use policy::*;
pub use trial::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Model name must not be empty")]
    EmptyModel,

    #[error("Starting context size must be positive")]
    ZeroStartSize,

    #[error("Step size must be positive")]
    ZeroStepSize,

    #[error("At least one test per context size is required")]
    ZeroTrials,

    #[error("At least one attempt per request is required")]
    ZeroRetries,

    #[error("Request timeout must be at least one second")]
    ZeroTimeout,

    #[error("Minimum token rate must be a positive number, got {0}")]
    InvalidTokenRate(f64),
}
