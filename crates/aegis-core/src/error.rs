//! Typed errors returned by the core components
//!
//! Configuration, validation and capacity problems surface as these enums.
//! Safety faults during chaos runs are not errors; they end up as aborted
//! experiment results.

use std::time::Duration;
use thiserror::Error;

/// Errors from the alert manager and rule engine
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert rule not found: {0}")]
    RuleNotFound(String),

    #[error("alert not found: {0}")]
    AlertNotFound(String),

    #[error("alert {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },
}

/// Errors from the failure predictor
#[derive(Debug, Error, PartialEq)]
pub enum PredictorError {
    #[error("expected {expected} features, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("insufficient training data: need {required} examples, have {available}")]
    InsufficientTrainingData { required: usize, available: usize },
}

/// A chaos experiment failed validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("experiment id is required")]
    MissingId,

    #[error("experiment name is required")]
    MissingName,

    #[error("target service is required")]
    MissingTargetService,

    #[error("at least one target node is required")]
    NoTargetNodes,

    #[error("at least one failure scenario is required")]
    NoFailureScenarios,

    #[error("experiment duration must be positive")]
    NonPositiveDuration,

    #[error("experiment duration exceeds the maximum of {max:?}")]
    DurationTooLong { max: Duration },

    #[error("safety limits are required")]
    MissingSafetyLimits,
}

/// Errors from the chaos framework
#[derive(Debug, Error)]
pub enum ChaosError {
    #[error("unknown experiment template: {0}")]
    UnknownTemplate(String),

    #[error("invalid experiment: {0}")]
    Validation(#[from] ValidationError),

    #[error("concurrency limit exceeded: {max} experiments already running")]
    ConcurrencyLimitExceeded { max: usize },

    #[error("resilience score {score:.2} is below the required {required:.2}")]
    ResilienceTooLow { score: f64, required: f64 },

    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("experiment {0} is already running")]
    AlreadyRunning(String),

    #[error("fault injection failed: {0}")]
    Injection(String),
}

/// Engine configuration rejected at load time
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}
