//! Experiment definition, lifecycle and results

use crate::error::ValidationError;
use crate::models::{serde_secs, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    Infrastructure,
    Network,
    Resource,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    NodeShutdown,
    LatencyInjection,
    MemoryStress,
    RandomRestart,
}

impl ScenarioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioType::NodeShutdown => "node_shutdown",
            ScenarioType::LatencyInjection => "latency_injection",
            ScenarioType::MemoryStress => "memory_stress",
            ScenarioType::RandomRestart => "random_restart",
        }
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fault to inject on every target node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureScenario {
    pub id: String,
    pub name: String,
    pub scenario_type: ScenarioType,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// How long the fault stays injected
    #[serde(rename = "duration_secs", with = "serde_secs")]
    pub duration: Duration,
    pub severity: Severity,
}

impl FailureScenario {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        scenario_type: ScenarioType,
        duration: Duration,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scenario_type,
            parameters: HashMap::new(),
            duration,
            severity,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of a target service's health during an experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub availability: f64,
    pub error_rate: f64,
    /// Latency relative to the pre-experiment baseline, 1.0 is unchanged
    pub latency_increase: f64,
    /// Fraction of baseline throughput lost
    pub throughput_drop: f64,
    pub resource_usage: f64,
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self {
            availability: 1.0,
            error_rate: 0.0,
            latency_increase: 1.0,
            throughput_drop: 0.0,
            resource_usage: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_error_rate: f64,
    pub max_latency_increase: f64,
    #[serde(default)]
    pub max_throughput_drop: Option<f64>,
    #[serde(default)]
    pub max_resource_usage: Option<f64>,
    #[serde(rename = "monitoring_window_secs", with = "serde_secs")]
    pub monitoring_window: Duration,
    #[serde(rename = "rollback_timeout_secs", with = "serde_secs")]
    pub rollback_timeout: Duration,
}

impl SafetyLimits {
    /// Every limit the snapshot breaks, as readable descriptions
    pub fn violations(&self, health: &ServiceHealth) -> Vec<String> {
        let mut violations = Vec::new();
        if health.error_rate > self.max_error_rate {
            violations.push(format!(
                "error rate {:.3} exceeds {:.3}",
                health.error_rate, self.max_error_rate
            ));
        }
        if health.latency_increase > self.max_latency_increase {
            violations.push(format!(
                "latency increase {:.2}x exceeds {:.2}x",
                health.latency_increase, self.max_latency_increase
            ));
        }
        if let Some(max) = self.max_throughput_drop {
            if health.throughput_drop > max {
                violations.push(format!(
                    "throughput drop {:.2} exceeds {:.2}",
                    health.throughput_drop, max
                ));
            }
        }
        if let Some(max) = self.max_resource_usage {
            if health.resource_usage > max {
                violations.push(format!(
                    "resource usage {:.2} exceeds {:.2}",
                    health.resource_usage, max
                ));
            }
        }
        violations
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosExperiment {
    pub id: String,
    pub name: String,
    pub experiment_type: ExperimentType,
    pub description: String,
    pub target_service: String,
    pub target_nodes: Vec<String>,
    pub failure_scenarios: Vec<FailureScenario>,
    #[serde(rename = "duration_secs", with = "serde_secs")]
    pub duration: Duration,
    pub safety_limits: Option<SafetyLimits>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub hypothesis: String,
    pub created_at: DateTime<Utc>,
}

/// Check an experiment is runnable, reporting the first missing piece
pub fn validate_experiment(
    experiment: &ChaosExperiment,
    max_duration: Duration,
) -> Result<(), ValidationError> {
    if experiment.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }
    if experiment.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if experiment.target_service.trim().is_empty() {
        return Err(ValidationError::MissingTargetService);
    }
    if experiment.target_nodes.is_empty() {
        return Err(ValidationError::NoTargetNodes);
    }
    if experiment.failure_scenarios.is_empty() {
        return Err(ValidationError::NoFailureScenarios);
    }
    if experiment.duration.is_zero() {
        return Err(ValidationError::NonPositiveDuration);
    }
    if experiment.duration > max_duration {
        return Err(ValidationError::DurationTooLong { max: max_duration });
    }
    if experiment.safety_limits.is_none() {
        return Err(ValidationError::MissingSafetyLimits);
    }
    Ok(())
}

/// Lifecycle of a single experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    Created,
    Started,
    Running,
    Completed,
    Aborted,
    RolledBack,
}

impl ExperimentPhase {
    pub fn can_transition_to(&self, next: ExperimentPhase) -> bool {
        use ExperimentPhase::*;
        matches!(
            (self, next),
            (Created, Started)
                | (Started, Running)
                | (Started, Aborted)
                | (Running, Completed)
                | (Running, Aborted)
                | (Aborted, RolledBack)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExperimentPhase::Completed | ExperimentPhase::Aborted | ExperimentPhase::RolledBack
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Started,
    Running,
    Completed,
    Aborted,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Started => "started",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    NotRequired,
    Succeeded,
    Failed,
}

/// Running averages of the target service's health
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetrics {
    pub availability: f64,
    pub error_rate: f64,
    pub latency_increase: f64,
    pub throughput_drop: f64,
    pub samples: u64,
}

impl Default for ExperimentMetrics {
    fn default() -> Self {
        Self {
            availability: 1.0,
            error_rate: 0.0,
            latency_increase: 1.0,
            throughput_drop: 0.0,
            samples: 0,
        }
    }
}

impl ExperimentMetrics {
    pub fn record(&mut self, health: &ServiceHealth) {
        let n = self.samples as f64;
        let avg = |current: f64, sample: f64| (current * n + sample) / (n + 1.0);
        self.availability = avg(self.availability, health.availability);
        self.error_rate = avg(self.error_rate, health.error_rate);
        self.latency_increase = avg(self.latency_increase, health.latency_increase);
        self.throughput_drop = avg(self.throughput_drop, health.throughput_drop);
        self.samples += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "duration_secs", with = "serde_secs")]
    pub duration: Duration,
    pub metrics: ExperimentMetrics,
    pub abort_reason: Option<String>,
    pub rollback: RollbackStatus,
    pub safety_violations: Vec<String>,
}

impl ExperimentResult {
    pub fn started(experiment_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            status: ExperimentStatus::Started,
            started_at,
            ended_at: None,
            duration: Duration::ZERO,
            metrics: ExperimentMetrics::default(),
            abort_reason: None,
            rollback: RollbackStatus::NotRequired,
            safety_violations: Vec::new(),
        }
    }

    /// Faults may still be active; needs an operator
    pub fn rollback_failed(&self) -> bool {
        self.rollback == RollbackStatus::Failed
    }

    pub fn is_success(&self) -> bool {
        self.status == ExperimentStatus::Completed
    }
}
