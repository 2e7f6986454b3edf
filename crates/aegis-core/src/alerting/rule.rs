//! Alert rule definitions

use crate::models::{names, serde_secs, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Id of the built-in rule used for prediction-driven alerts
pub const PREDICTIVE_RULE_ID: &str = "predictive_failure";

/// Comparison applied between a sample and a rule threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Gt,
    Lt,
    Eq,
    Ne,
}

impl Condition {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Condition::Gt => value > threshold,
            Condition::Lt => value < threshold,
            Condition::Eq => (value - threshold).abs() < f64::EPSILON,
            Condition::Ne => (value - threshold).abs() >= f64::EPSILON,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Condition::Gt => ">",
            Condition::Lt => "<",
            Condition::Eq => "==",
            Condition::Ne => "!=",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Threshold rule evaluated against the latest sample of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric_name: String,
    pub condition: Condition,
    pub threshold: f64,
    /// How long the condition must hold before an alert fires
    #[serde(default, with = "serde_secs")]
    pub duration: Duration,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric_name: impl Into<String>,
        condition: Condition,
        threshold: f64,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric_name: metric_name.into(),
            condition,
            threshold,
            duration: Duration::ZERO,
            severity,
            enabled: true,
            tags: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether a sample value breaches this rule
    pub fn matches(&self, value: f64) -> bool {
        self.enabled && self.condition.evaluate(value, self.threshold)
    }
}

/// Rules installed when configuration supplies none
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "cpu_high",
            "High CPU utilization",
            names::CPU_UTILIZATION,
            Condition::Gt,
            0.8,
            Severity::High,
        )
        .with_duration(Duration::from_secs(60))
        .with_tag("resource"),
        AlertRule::new(
            "memory_high",
            "High memory utilization",
            names::MEMORY_UTILIZATION,
            Condition::Gt,
            0.85,
            Severity::High,
        )
        .with_duration(Duration::from_secs(60))
        .with_tag("resource"),
        AlertRule::new(
            "disk_critical",
            "Disk nearly full",
            names::DISK_UTILIZATION,
            Condition::Gt,
            0.9,
            Severity::Critical,
        )
        .with_tag("resource"),
        AlertRule::new(
            "error_rate_high",
            "Elevated error rate",
            names::ERROR_RATE,
            Condition::Gt,
            0.05,
            Severity::Critical,
        )
        .with_duration(Duration::from_secs(30))
        .with_tag("service"),
        AlertRule::new(
            PREDICTIVE_RULE_ID,
            "Predicted node failure",
            names::FAILURE_PROBABILITY,
            Condition::Gt,
            0.8,
            Severity::Critical,
        )
        .with_tag("predictive"),
    ]
}
