//! Time-windowed alert correlation
//!
//! Each enabled [`CorrelationRule`] projects an alert onto a grouping key
//! (node, metric, rule, or a combination). Alerts sharing a key whose open
//! group was touched within the rule's window join that group; otherwise a
//! fresh group is opened and the stale one is closed.

use super::alert::Alert;
use crate::models::{serde_secs, Impact};
use crate::store::ConcurrentStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Default correlation window (5 minutes)
pub const DEFAULT_CORRELATION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Alert attribute a correlation rule groups on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    NodeId,
    MetricName,
    RuleId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub id: String,
    pub name: String,
    #[serde(with = "serde_secs")]
    pub time_window: Duration,
    pub group_by: Vec<GroupBy>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl CorrelationRule {
    /// Group alerts raised on the same node
    pub fn same_node(window: Duration) -> Self {
        Self {
            id: "same_node".to_string(),
            name: "Alerts on the same node".to_string(),
            time_window: window,
            group_by: vec![GroupBy::NodeId],
            enabled: true,
        }
    }

    fn key_for(&self, alert: &Alert) -> String {
        self.group_by
            .iter()
            .map(|field| match field {
                GroupBy::NodeId => alert.node_id.as_str(),
                GroupBy::MetricName => alert.metric_name.as_str(),
                GroupBy::RuleId => alert.rule_id.as_str(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.time_window).unwrap_or_else(|_| chrono::Duration::days(365))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Open,
    Closed,
}

/// Correlation cluster of related alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroup {
    pub id: String,
    /// Correlation rule that formed the group
    pub rule_id: String,
    pub key: String,
    pub alert_ids: Vec<String>,
    pub status: GroupStatus,
    pub summary: String,
    pub impact: Impact,
    pub node_id: String,
    metric_names: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertGroup {
    fn open(rule: &CorrelationRule, key: String, alert: &Alert) -> Self {
        let mut group = Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            key,
            alert_ids: Vec::new(),
            status: GroupStatus::Open,
            summary: String::new(),
            impact: alert.predicted_impact,
            node_id: alert.node_id.clone(),
            metric_names: BTreeSet::new(),
            created_at: alert.created_at,
            updated_at: alert.created_at,
        };
        group.push(alert);
        group
    }

    fn push(&mut self, alert: &Alert) {
        if !self.alert_ids.contains(&alert.id) {
            self.alert_ids.push(alert.id.clone());
        }
        self.metric_names.insert(alert.metric_name.clone());
        self.impact = self.impact.max(alert.predicted_impact);
        self.updated_at = self.updated_at.max(alert.created_at);
        self.summary = format!(
            "{} related alerts on node {}: {}",
            self.alert_ids.len(),
            self.node_id,
            self.metric_names.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    fn is_live(&self, at: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.status == GroupStatus::Open && at.signed_duration_since(self.updated_at) <= window
    }
}

type GroupKey = (String, String);

pub struct CorrelationEngine {
    rules: Vec<CorrelationRule>,
    open: ConcurrentStore<GroupKey, AlertGroup>,
    closed: ConcurrentStore<String, AlertGroup>,
    /// How long closed groups stay listed
    retention: chrono::Duration,
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(vec![CorrelationRule::same_node(DEFAULT_CORRELATION_WINDOW)])
    }
}

impl CorrelationEngine {
    pub fn new(rules: Vec<CorrelationRule>) -> Self {
        Self {
            rules,
            open: ConcurrentStore::new(),
            closed: ConcurrentStore::new(),
            retention: chrono::Duration::hours(1),
        }
    }

    pub fn rules(&self) -> &[CorrelationRule] {
        &self.rules
    }

    /// Ids of alerts already grouped with this one under any enabled rule.
    ///
    /// Read-only: the alert is not added to any group.
    pub fn find_correlations(&self, alert: &Alert) -> Vec<String> {
        let mut related: Vec<String> = Vec::new();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            let key = (rule.id.clone(), rule.key_for(alert));
            let Some(group) = self.open.get(&key) else {
                continue;
            };
            if !group.is_live(alert.created_at, rule.window()) {
                continue;
            }
            for id in group.alert_ids {
                if id != alert.id && !related.contains(&id) {
                    related.push(id);
                }
            }
        }

        related
    }

    /// Add an alert to its groups, opening new ones where needed
    pub fn register(&self, alert: &Alert) {
        for rule in self.rules.iter().filter(|r| r.enabled) {
            let group_key = rule.key_for(alert);
            let window = rule.window();

            let expired = self.open.upsert(
                (rule.id.clone(), group_key.clone()),
                || AlertGroup::open(rule, group_key.clone(), alert),
                |group| {
                    if group.alert_ids.contains(&alert.id) {
                        return None;
                    }
                    if group.is_live(alert.created_at, window) {
                        group.push(alert);
                        None
                    } else {
                        let fresh = AlertGroup::open(rule, group_key.clone(), alert);
                        Some(std::mem::replace(group, fresh))
                    }
                },
            );

            if let Some(mut stale) = expired {
                debug!(group_id = %stale.id, rule_id = %rule.id, "Closing expired alert group");
                stale.status = GroupStatus::Closed;
                self.closed.insert(stale.id.clone(), stale);
            }
        }
    }

    /// Close groups whose window has passed and drop old closed groups
    pub fn close_expired(&self, now: DateTime<Utc>) {
        for ((rule_id, key), group) in self.open.snapshot() {
            let window = self
                .rules
                .iter()
                .find(|r| r.id == rule_id)
                .map(CorrelationRule::window)
                .unwrap_or_else(|| chrono::Duration::zero());
            if group.is_live(now, window) {
                continue;
            }
            let removed = self
                .open
                .remove_if(&(rule_id, key), |g| !g.is_live(now, window));
            if let Some(mut stale) = removed {
                stale.status = GroupStatus::Closed;
                self.closed.insert(stale.id.clone(), stale);
            }
        }

        let retention = self.retention;
        self.closed
            .retain(|_, group| now.signed_duration_since(group.updated_at) <= retention);
    }

    /// All groups, open first, newest first within each status
    pub fn groups(&self) -> Vec<AlertGroup> {
        let mut groups = self.open.values();
        groups.extend(self.closed.values());
        groups.sort_by(|a, b| {
            (a.status == GroupStatus::Closed)
                .cmp(&(b.status == GroupStatus::Closed))
                .then(b.updated_at.cmp(&a.updated_at))
        });
        groups
    }

    pub fn open_groups(&self) -> Vec<AlertGroup> {
        self.open.values()
    }
}
