//! Chaos engineering for resilience validation
//!
//! This module provides:
//! - Experiment definitions, built directly or from predefined templates
//! - Validation and admission limits before anything is injected
//! - Safety monitoring of the target service with automatic rollback
//! - A resilience score derived from past experiment outcomes
//!
//! Fault injection and service health are pluggable through the
//! [`FailureInjector`] and [`ServiceMetricsSource`] traits.

mod experiment;
mod framework;
mod injector;
mod resilience;
mod source;
mod templates;

#[cfg(test)]
mod tests;

pub use experiment::{
    validate_experiment, ChaosExperiment, ExperimentMetrics, ExperimentPhase, ExperimentResult,
    ExperimentStatus, ExperimentType, FailureScenario, RollbackStatus, SafetyLimits, ScenarioType,
    ServiceHealth,
};
pub use framework::{
    ChaosConfig, ChaosFramework, DEFAULT_MAX_CONCURRENT_EXPERIMENTS,
    DEFAULT_MAX_EXPERIMENT_DURATION,
};
pub use injector::{FailureInjector, SimulatedInjector};
pub use resilience::resilience_score;
pub use source::{FeedMetricsSource, ServiceMetricsSource};
pub use templates::{default_templates, ExperimentTemplate, SUCCESS_CRITERIA, TEMPLATE_ROLLBACK_TIMEOUT};
