//! Alert priority scoring
//!
//! Linear model over six features, in fixed order:
//! - severity
//! - metric value (capped at 1.0)
//! - relative deviation from the threshold
//! - node criticality
//! - business-hours indicator
//! - historical frequency
//!
//! `priority = bias + Σ wᵢ·fᵢ`, clamped to [0, 1]. Weights come from
//! configuration so the policy can be tuned without a rebuild.

use super::alert::Alert;
use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of prioritizer input features
pub const PRIORITY_FEATURES: usize = 6;

/// Feature names, in weight order
pub const FEATURE_NAMES: [&str; PRIORITY_FEATURES] = [
    "severity",
    "metric_value",
    "threshold_deviation",
    "node_criticality",
    "time_of_day",
    "historical_frequency",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityModelConfig {
    pub weights: [f64; PRIORITY_FEATURES],
    pub bias: f64,
    /// Criticality used for nodes without an explicit entry
    pub default_node_criticality: f64,
    pub node_criticality: HashMap<String, f64>,
    pub historical_frequency: f64,
    /// First business hour (inclusive, local time)
    pub business_hours_start: u32,
    /// Last business hour (inclusive, local time)
    pub business_hours_end: u32,
    pub off_hours_score: f64,
}

impl Default for PriorityModelConfig {
    fn default() -> Self {
        Self {
            weights: [0.5, 0.2, 0.15, 0.05, 0.05, 0.05],
            bias: 0.15,
            default_node_criticality: 0.5,
            node_criticality: HashMap::new(),
            historical_frequency: 0.3,
            business_hours_start: 9,
            business_hours_end: 17,
            off_hours_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Prioritizer {
    config: PriorityModelConfig,
}

impl Prioritizer {
    pub fn new(config: PriorityModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriorityModelConfig {
        &self.config
    }

    /// Score an alert using the local hour of its creation time
    pub fn calculate_priority(&self, alert: &Alert) -> f64 {
        let hour = alert.created_at.with_timezone(&Local).hour();
        self.calculate_priority_at(alert, hour)
    }

    pub fn calculate_priority_at(&self, alert: &Alert, hour: u32) -> f64 {
        let features = self.features(alert, hour);
        let score = self
            .config
            .weights
            .iter()
            .zip(features.iter())
            .fold(self.config.bias, |acc, (w, f)| acc + w * f);

        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Feature vector for an alert at the given hour
    pub fn features(&self, alert: &Alert, hour: u32) -> [f64; PRIORITY_FEATURES] {
        let value = finite_or_zero(alert.metric_value);

        let deviation = if alert.threshold > 0.0 {
            finite_or_zero((value - alert.threshold).abs() / alert.threshold)
        } else {
            0.0
        };

        let criticality = self
            .config
            .node_criticality
            .get(&alert.node_id)
            .copied()
            .unwrap_or(self.config.default_node_criticality);

        [
            severity_feature(alert.severity.as_str()),
            value.min(1.0),
            deviation,
            criticality,
            self.time_of_day_feature(hour),
            self.config.historical_frequency,
        ]
    }

    fn time_of_day_feature(&self, hour: u32) -> f64 {
        if (self.config.business_hours_start..=self.config.business_hours_end).contains(&hour) {
            1.0
        } else {
            self.config.off_hours_score
        }
    }
}

/// Severity label to feature value. Unknown labels get the lowest score.
pub fn severity_feature(label: &str) -> f64 {
    match label {
        "critical" => 1.0,
        "high" => 0.8,
        "medium" => 0.6,
        "low" => 0.4,
        _ => 0.2,
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
