//! Alert records and their lifecycle

use super::rule::AlertRule;
use crate::models::{names, Impact, Metric, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Escalated,
}

impl AlertStatus {
    /// Allowed lifecycle moves. `Resolved` is terminal.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (Active, Acknowledged)
                | (Active, Resolved)
                | (Active, Escalated)
                | (Escalated, Acknowledged)
                | (Escalated, Resolved)
                | (Acknowledged, Resolved)
        )
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Escalated => "escalated",
        };
        f.write_str(s)
    }
}

/// A materialized rule breach for one metric on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub priority: f64,
    pub status: AlertStatus,
    pub node_id: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub threshold: f64,
    pub description: String,
    pub predicted_impact: Impact,
    pub recommended_actions: Vec<String>,
    pub correlated_alert_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
}

impl Alert {
    /// Build an active alert from a rule and the sample that breached it.
    ///
    /// Priority and correlations are filled in later by the manager.
    pub fn from_rule(rule: &AlertRule, metric: &Metric, now: DateTime<Utc>) -> Self {
        let node_id = metric.node_id().to_string();
        let description = format!(
            "{}: {} is {:.2} on node {} (threshold {} {:.2})",
            rule.name, metric.name, metric.value, node_id, rule.condition, rule.threshold
        );

        let mut recommended_actions = recommended_actions(&metric.name);
        for action in &rule.actions {
            if !recommended_actions.contains(action) {
                recommended_actions.push(action.clone());
            }
        }

        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            severity: rule.severity,
            priority: 0.0,
            status: AlertStatus::Active,
            node_id,
            metric_name: metric.name.clone(),
            metric_value: metric.value,
            threshold: rule.threshold,
            description,
            predicted_impact: Impact::from_value(metric.value),
            recommended_actions,
            correlated_alert_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
            escalated_at: None,
            acknowledged_by: None,
        }
    }

    /// Fatigue/dedup key
    pub fn source_key(&self) -> (String, String) {
        (self.node_id.clone(), self.metric_name.clone())
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Canned remediation advice for a metric
pub fn recommended_actions(metric_name: &str) -> Vec<String> {
    let actions: &[&str] = match metric_name {
        names::CPU_UTILIZATION => &["Scale up CPU resources", "Optimize CPU-intensive processes"],
        names::MEMORY_UTILIZATION => &["Increase memory allocation", "Check for memory leaks"],
        names::DISK_UTILIZATION => &["Clean up disk space", "Archive old data"],
        _ => &["Investigate metric anomaly", "Check system health"],
    };
    actions.iter().map(|a| a.to_string()).collect()
}
