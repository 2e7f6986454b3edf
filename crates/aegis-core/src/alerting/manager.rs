//! Alert lifecycle orchestration
//!
//! The manager owns the rule table, the active set and the history under one
//! write lock. Creating an alert runs prioritization, correlation lookup and
//! fatigue suppression inside that lock; those components guard their own
//! state with sharded sync locks, so nothing awaits another component's lock
//! while the manager's is held. Notifications go out after the lock is
//! released.

use super::alert::{Alert, AlertStatus};
use super::correlation::{AlertGroup, CorrelationEngine, CorrelationRule, DEFAULT_CORRELATION_WINDOW};
use super::fatigue::{FatigueConfig, FatigueReducer};
use super::prioritizer::{Prioritizer, PriorityModelConfig};
use super::rule::{default_rules, AlertRule};
use crate::error::AlertError;
use crate::integration::IntegrationManager;
use crate::models::{serde_secs, Metric};
use crate::observability::{EngineMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

/// Delay before an unacknowledged critical alert escalates
pub const DEFAULT_ESCALATION_DELAY: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_AUTO_RESOLVE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub max_active_alerts: usize,
    pub max_history: usize,
    /// Alerts not updated for this long are resolved automatically
    #[serde(with = "serde_secs")]
    pub auto_resolve_timeout: Duration,
    pub escalation_enabled: bool,
    #[serde(with = "serde_secs")]
    pub escalation_delay: Duration,
    pub fatigue: FatigueConfig,
    pub priority: PriorityModelConfig,
    pub correlation_rules: Vec<CorrelationRule>,
    /// Rule table; the built-in rules are used when empty
    pub rules: Vec<AlertRule>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_active_alerts: 1000,
            max_history: 10_000,
            auto_resolve_timeout: DEFAULT_AUTO_RESOLVE_TIMEOUT,
            escalation_enabled: true,
            escalation_delay: DEFAULT_ESCALATION_DELAY,
            fatigue: FatigueConfig::default(),
            priority: PriorityModelConfig::default(),
            correlation_rules: vec![CorrelationRule::same_node(DEFAULT_CORRELATION_WINDOW)],
            rules: Vec::new(),
        }
    }
}

#[derive(Default)]
struct AlertState {
    rules: HashMap<String, AlertRule>,
    active: HashMap<String, Alert>,
    history: VecDeque<Alert>,
}

impl AlertState {
    fn record(&mut self, alert: Alert, max_history: usize) {
        self.history.push_back(alert);
        while self.history.len() > max_history {
            self.history.pop_front();
        }
    }

    /// Replace the history entry for an alert with its latest state
    fn refresh_history(&mut self, alert: &Alert) {
        if let Some(entry) = self.history.iter_mut().rev().find(|a| a.id == alert.id) {
            *entry = alert.clone();
        }
    }

    /// Mark open alerts from a source as still firing
    fn touch_source(&mut self, source: &(String, String), now: DateTime<Utc>) -> usize {
        let touched: Vec<Alert> = self
            .active
            .values_mut()
            .filter(|a| a.status.is_open() && &a.source_key() == source)
            .map(|a| {
                a.updated_at = a.updated_at.max(now);
                a.clone()
            })
            .collect();
        for alert in &touched {
            self.refresh_history(alert);
        }
        touched.len()
    }

    fn transition(
        &mut self,
        alert_id: &str,
        next: AlertStatus,
        now: DateTime<Utc>,
    ) -> Result<Alert, AlertError> {
        let alert = self
            .active
            .get_mut(alert_id)
            .ok_or_else(|| AlertError::AlertNotFound(alert_id.to_string()))?;

        if !alert.status.can_transition_to(next) {
            return Err(AlertError::InvalidTransition {
                id: alert_id.to_string(),
                from: alert.status.to_string(),
                to: next.to_string(),
            });
        }

        alert.status = next;
        alert.updated_at = now;
        match next {
            AlertStatus::Resolved => alert.resolved_at = Some(now),
            AlertStatus::Escalated => alert.escalated_at = Some(now),
            _ => {}
        }

        let snapshot = alert.clone();
        if next == AlertStatus::Resolved {
            self.active.remove(alert_id);
        }
        self.refresh_history(&snapshot);
        Ok(snapshot)
    }
}

pub struct AlertManager {
    config: AlertConfig,
    state: RwLock<AlertState>,
    prioritizer: Prioritizer,
    correlation: CorrelationEngine,
    fatigue: FatigueReducer,
    integrations: Arc<IntegrationManager>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    shutdown: watch::Sender<bool>,
}

impl AlertManager {
    pub fn new(
        config: AlertConfig,
        integrations: Arc<IntegrationManager>,
        logger: StructuredLogger,
    ) -> Self {
        let rules = if config.rules.is_empty() {
            default_rules()
        } else {
            config.rules.clone()
        };

        let state = AlertState {
            rules: rules.into_iter().map(|r| (r.id.clone(), r)).collect(),
            ..Default::default()
        };

        let (shutdown, _) = watch::channel(false);

        Self {
            prioritizer: Prioritizer::new(config.priority.clone()),
            correlation: CorrelationEngine::new(config.correlation_rules.clone()),
            fatigue: FatigueReducer::new(config.fatigue.clone()),
            state: RwLock::new(state),
            integrations,
            metrics: EngineMetrics::new(),
            logger,
            shutdown,
            config,
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub async fn add_rule(&self, rule: AlertRule) {
        info!(rule_id = %rule.id, metric = %rule.metric_name, "Registering alert rule");
        self.state.write().await.rules.insert(rule.id.clone(), rule);
    }

    pub async fn remove_rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.state.write().await.rules.remove(rule_id)
    }

    pub async fn rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.state.read().await.rules.get(rule_id).cloned()
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self.state.read().await.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Materialize an alert for a rule breach.
    ///
    /// Returns `Ok(None)` when the fatigue reducer mutes it.
    pub async fn create_alert(
        self: &Arc<Self>,
        rule_id: &str,
        metric: &Metric,
    ) -> Result<Option<Alert>, AlertError> {
        self.create_alert_at(rule_id, metric, Utc::now()).await
    }

    pub async fn create_alert_at(
        self: &Arc<Self>,
        rule_id: &str,
        metric: &Metric,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, AlertError> {
        self.materialize(rule_id, metric, now, None).await
    }

    /// Like [`create_alert`](Self::create_alert), with caller-supplied remediation advice
    pub async fn create_alert_with_actions(
        self: &Arc<Self>,
        rule_id: &str,
        metric: &Metric,
        actions: Vec<String>,
    ) -> Result<Option<Alert>, AlertError> {
        self.materialize(rule_id, metric, Utc::now(), Some(actions)).await
    }

    async fn materialize(
        self: &Arc<Self>,
        rule_id: &str,
        metric: &Metric,
        now: DateTime<Utc>,
        actions: Option<Vec<String>>,
    ) -> Result<Option<Alert>, AlertError> {
        let mut state = self.state.write().await;

        let rule = state
            .rules
            .get(rule_id)
            .cloned()
            .ok_or_else(|| AlertError::RuleNotFound(rule_id.to_string()))?;

        let mut alert = Alert::from_rule(&rule, metric, now);
        if let Some(actions) = actions.filter(|a| !a.is_empty()) {
            alert.recommended_actions = actions;
        }
        alert.priority = self.prioritizer.calculate_priority(&alert);
        alert.correlated_alert_ids = self.correlation.find_correlations(&alert);

        if self.fatigue.should_suppress(&alert) {
            let touched = state.touch_source(&alert.source_key(), now);
            drop(state);
            debug!(
                node_id = %alert.node_id,
                metric = %alert.metric_name,
                touched = touched,
                "Refreshed open alerts for muted source"
            );
            self.metrics.inc_alerts_suppressed();
            self.logger
                .log_alert_suppressed(&alert.node_id, &alert.metric_name, &alert.rule_id);
            return Ok(None);
        }

        self.correlation.register(&alert);
        for sibling_id in &alert.correlated_alert_ids {
            let updated = state.active.get_mut(sibling_id).map(|sibling| {
                sibling.correlated_alert_ids.push(alert.id.clone());
                sibling.clone()
            });
            if let Some(sibling) = updated {
                state.refresh_history(&sibling);
            }
        }

        state.active.insert(alert.id.clone(), alert.clone());
        state.record(alert.clone(), self.config.max_history);
        let evicted = self.enforce_capacity(&mut state, &alert.id, now);
        let active_count = state.active.len();
        drop(state);

        for id in evicted {
            debug!(alert_id = %id, "Resolved lowest-priority alert to stay under the active cap");
        }
        self.metrics.inc_alerts_created(alert.severity.as_str());
        self.metrics.set_active_alerts(active_count);
        self.logger.log_alert_created(&alert);

        if alert.is_critical() {
            self.integrations.dispatch_alert(&alert).await;
            if self.config.escalation_enabled {
                self.schedule_escalation(alert.id.clone());
            }
        }

        Ok(Some(alert))
    }

    /// Resolve the lowest-priority alerts beyond the cap, never `keep`
    fn enforce_capacity(
        &self,
        state: &mut AlertState,
        keep: &str,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut evicted = Vec::new();
        while state.active.len() > self.config.max_active_alerts {
            let victim = state
                .active
                .values()
                .filter(|a| a.id != keep)
                .min_by(|a, b| {
                    a.priority
                        .total_cmp(&b.priority)
                        .then(a.created_at.cmp(&b.created_at))
                })
                .map(|a| a.id.clone());

            let Some(victim) = victim else { break };
            if state.transition(&victim, AlertStatus::Resolved, now).is_err() {
                state.active.remove(&victim);
            }
            evicted.push(victim);
        }
        evicted
    }

    fn schedule_escalation(self: &Arc<Self>, alert_id: String) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return;
        }

        let manager = Arc::clone(self);
        let delay = self.config.escalation_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    match manager.escalate(&alert_id).await {
                        Ok(Some(_)) => {}
                        Ok(None) => debug!(alert_id = %alert_id, "Alert handled before escalation"),
                        Err(e) => debug!(alert_id = %alert_id, error = %e, "Escalation skipped"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!(alert_id = %alert_id, "Escalation timer cancelled");
                }
            }
        });
    }

    /// Escalate an alert that is still active and notify integrations.
    ///
    /// Returns `Ok(None)` if it was acknowledged or escalated meanwhile.
    pub async fn escalate(&self, alert_id: &str) -> Result<Option<Alert>, AlertError> {
        let escalated = {
            let mut state = self.state.write().await;
            let status = state
                .active
                .get(alert_id)
                .map(|a| a.status)
                .ok_or_else(|| AlertError::AlertNotFound(alert_id.to_string()))?;
            if status != AlertStatus::Active {
                return Ok(None);
            }
            state.transition(alert_id, AlertStatus::Escalated, Utc::now())?
        };

        self.metrics.inc_alerts_escalated();
        self.logger.log_alert_escalated(&escalated);
        self.integrations.dispatch_alert(&escalated).await;
        Ok(Some(escalated))
    }

    pub async fn acknowledge(&self, alert_id: &str, by: &str) -> Result<Alert, AlertError> {
        let mut state = self.state.write().await;
        let mut alert = state.transition(alert_id, AlertStatus::Acknowledged, Utc::now())?;
        if let Some(active) = state.active.get_mut(alert_id) {
            active.acknowledged_by = Some(by.to_string());
            alert = active.clone();
        }
        state.refresh_history(&alert);
        info!(alert_id = %alert_id, by = %by, "Alert acknowledged");
        Ok(alert)
    }

    pub async fn resolve(&self, alert_id: &str) -> Result<Alert, AlertError> {
        let mut state = self.state.write().await;
        let alert = state.transition(alert_id, AlertStatus::Resolved, Utc::now())?;
        self.metrics.set_active_alerts(state.active.len());
        info!(alert_id = %alert_id, "Alert resolved");
        Ok(alert)
    }

    /// Resolve alerts that have not been touched within the timeout
    pub async fn auto_resolve(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let timeout = chrono::Duration::from_std(self.config.auto_resolve_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365));

        let mut state = self.state.write().await;
        let stale: Vec<String> = state
            .active
            .values()
            .filter(|a| now.signed_duration_since(a.updated_at) >= timeout)
            .map(|a| a.id.clone())
            .collect();

        let resolved: Vec<Alert> = stale
            .iter()
            .filter_map(|id| state.transition(id, AlertStatus::Resolved, now).ok())
            .collect();

        if !resolved.is_empty() {
            info!(count = resolved.len(), "Auto-resolved stale alerts");
            self.metrics.set_active_alerts(state.active.len());
        }
        resolved
    }

    /// Close stale correlation groups and drop idle fatigue counters
    pub fn housekeeping(&self, now: DateTime<Utc>) {
        self.correlation.close_expired(now);
        self.fatigue.prune(now);
    }

    /// Open alerts, highest priority first
    pub async fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.state.read().await.active.values().cloned().collect();
        alerts.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        alerts
    }

    pub async fn escalated_alerts(&self) -> Vec<Alert> {
        self.active_alerts()
            .await
            .into_iter()
            .filter(|a| a.status == AlertStatus::Escalated)
            .collect()
    }

    pub async fn alert(&self, alert_id: &str) -> Option<Alert> {
        let state = self.state.read().await;
        state
            .active
            .get(alert_id)
            .cloned()
            .or_else(|| state.history.iter().rev().find(|a| a.id == alert_id).cloned())
    }

    pub async fn history(&self) -> Vec<Alert> {
        self.state.read().await.history.iter().cloned().collect()
    }

    pub fn alert_groups(&self) -> Vec<AlertGroup> {
        self.correlation.groups()
    }

    /// Cancel pending escalation timers
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rule::{Condition, PREDICTIVE_RULE_ID};
    use crate::integration::testing::RecordingIntegration;
    use crate::models::{names, Severity};

    fn manager_with(config: AlertConfig) -> (Arc<AlertManager>, Arc<RecordingIntegration>) {
        let recorder = Arc::new(RecordingIntegration::default());
        let integrations = Arc::new(IntegrationManager::new().with_integration(recorder.clone()));
        let manager = Arc::new(AlertManager::new(
            config,
            integrations,
            StructuredLogger::new("test"),
        ));
        (manager, recorder)
    }

    fn manager() -> Arc<AlertManager> {
        manager_with(AlertConfig::default()).0
    }

    fn cpu(node: &str, value: f64) -> Metric {
        Metric::new(names::CPU_UTILIZATION, value).with_node(node)
    }

    #[tokio::test]
    async fn test_unknown_rule_is_rejected() {
        let manager = manager();
        let err = manager.create_alert("nope", &cpu("n1", 0.9)).await.unwrap_err();
        assert!(matches!(err, AlertError::RuleNotFound(id) if id == "nope"));
        assert!(manager.active_alerts().await.is_empty());
        assert!(manager.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_alert_registers_active_alert() {
        let manager = manager();
        let alert = manager
            .create_alert("cpu_high", &cpu("n1", 0.95))
            .await
            .unwrap()
            .unwrap();

        assert!((0.0..=1.0).contains(&alert.priority));
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(manager.active_alerts().await.len(), 1);
        assert_eq!(manager.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fatigue_suppresses_repeats() {
        let manager = manager();
        let t0 = Utc::now();
        let mut created = 0;
        for i in 0..8 {
            let at = t0 + chrono::Duration::seconds(i * 10);
            if manager
                .create_alert_at("cpu_high", &cpu("n1", 0.9), at)
                .await
                .unwrap()
                .is_some()
            {
                created += 1;
            }
        }
        assert_eq!(created, 5);
        assert_eq!(manager.active_alerts().await.len(), 5);
    }

    #[tokio::test]
    async fn test_sustained_breach_stays_active() {
        let manager = manager();
        let t0 = Utc::now();
        let mut created = 0;

        // Breach every 30s for two hours, auto-resolving at each step
        for step in 0..240 {
            let at = t0 + chrono::Duration::seconds(step * 30);
            if manager
                .create_alert_at("cpu_high", &cpu("n1", 0.9), at)
                .await
                .unwrap()
                .is_some()
            {
                created += 1;
            }
            manager.auto_resolve(at).await;
        }

        assert!(created > 5);
        let active = manager.active_alerts().await;
        assert!(!active.is_empty());
        let last = t0 + chrono::Duration::seconds(239 * 30);
        assert!(active.iter().all(|a| a.updated_at >= t0 + chrono::Duration::minutes(60)));
        assert!(active.iter().any(|a| a.updated_at == last));
    }

    #[tokio::test]
    async fn test_muted_repeat_refreshes_open_alert() {
        let manager = manager();
        let t0 = Utc::now();
        for i in 0..5 {
            manager
                .create_alert_at("cpu_high", &cpu("n1", 0.9), t0 + chrono::Duration::seconds(i))
                .await
                .unwrap();
        }
        let later = t0 + chrono::Duration::minutes(2);
        assert!(manager
            .create_alert_at("cpu_high", &cpu("n1", 0.9), later)
            .await
            .unwrap()
            .is_none());

        let active = manager.active_alerts().await;
        assert_eq!(active.len(), 5);
        assert!(active.iter().all(|a| a.updated_at == later));
        assert!(manager.history().await.iter().all(|a| a.updated_at == later));
    }

    #[tokio::test]
    async fn test_correlation_links_reach_history() {
        let manager = manager();
        let first = manager
            .create_alert("cpu_high", &cpu("n1", 0.9))
            .await
            .unwrap()
            .unwrap();
        let second = manager
            .create_alert(
                "memory_high",
                &Metric::new(names::MEMORY_UTILIZATION, 0.9).with_node("n1"),
            )
            .await
            .unwrap()
            .unwrap();

        let history = manager.history().await;
        let first_record = history.iter().find(|a| a.id == first.id).unwrap();
        assert_eq!(first_record.correlated_alert_ids, vec![second.id.clone()]);
    }

    #[tokio::test]
    async fn test_correlated_alerts_reference_each_other() {
        let manager = manager();
        let first = manager
            .create_alert("cpu_high", &cpu("n1", 0.9))
            .await
            .unwrap()
            .unwrap();
        let second = manager
            .create_alert(
                "memory_high",
                &Metric::new(names::MEMORY_UTILIZATION, 0.9).with_node("n1"),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.correlated_alert_ids, vec![first.id.clone()]);
        let first_now = manager.alert(&first.id).await.unwrap();
        assert_eq!(first_now.correlated_alert_ids, vec![second.id.clone()]);
        assert_eq!(manager.alert_groups().len(), 1);
    }

    #[tokio::test]
    async fn test_active_alerts_sorted_by_priority() {
        let manager = manager();
        manager
            .create_alert("cpu_high", &cpu("a", 0.81))
            .await
            .unwrap();
        manager
            .create_alert(
                "disk_critical",
                &Metric::new(names::DISK_UTILIZATION, 0.99).with_node("b"),
            )
            .await
            .unwrap();

        let alerts = manager.active_alerts().await;
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].priority >= alerts[1].priority);
        assert_eq!(alerts[0].rule_id, "disk_critical");
    }

    #[tokio::test]
    async fn test_acknowledge_and_resolve() {
        let manager = manager();
        let alert = manager
            .create_alert("cpu_high", &cpu("n1", 0.9))
            .await
            .unwrap()
            .unwrap();

        let acked = manager.acknowledge(&alert.id, "oncall").await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("oncall"));

        let resolved = manager.resolve(&alert.id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert!(manager.active_alerts().await.is_empty());

        let history = manager.history().await;
        assert_eq!(history[0].status, AlertStatus::Resolved);

        let err = manager.resolve(&alert.id).await.unwrap_err();
        assert!(matches!(err, AlertError::AlertNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_alert_escalates_after_delay() {
        let (manager, recorder) = manager_with(AlertConfig::default());
        let alert = manager
            .create_alert(
                "disk_critical",
                &Metric::new(names::DISK_UTILIZATION, 0.97).with_node("n1"),
            )
            .await
            .unwrap()
            .unwrap();
        // Critical alerts are dispatched on creation
        assert_eq!(recorder.alerts.lock().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert!(manager.escalated_alerts().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        let escalated = manager.escalated_alerts().await;
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].id, alert.id);
        assert!(escalated[0].escalated_at.is_some());

        let delivered = recorder.alerts.lock().await;
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[1].status, AlertStatus::Escalated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_alert_does_not_escalate() {
        let manager = manager();
        let alert = manager
            .create_alert(
                "disk_critical",
                &Metric::new(names::DISK_UTILIZATION, 0.97).with_node("n1"),
            )
            .await
            .unwrap()
            .unwrap();

        manager.acknowledge(&alert.id, "oncall").await.unwrap();
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;

        assert!(manager.escalated_alerts().await.is_empty());
        assert_eq!(
            manager.alert(&alert.id).await.unwrap().status,
            AlertStatus::Acknowledged
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_escalation() {
        let manager = manager();
        manager
            .create_alert(
                "disk_critical",
                &Metric::new(names::DISK_UTILIZATION, 0.97).with_node("n1"),
            )
            .await
            .unwrap();
        manager.shutdown();
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        assert!(manager.escalated_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_escalate_only_once() {
        let manager = manager();
        let alert = manager
            .create_alert("cpu_high", &cpu("n1", 0.9))
            .await
            .unwrap()
            .unwrap();
        assert!(manager.escalate(&alert.id).await.unwrap().is_some());
        assert!(manager.escalate(&alert.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_cap_evicts_lowest_priority() {
        let config = AlertConfig {
            max_active_alerts: 2,
            ..Default::default()
        };
        let (manager, _) = manager_with(config);

        let low = manager
            .create_alert("cpu_high", &cpu("a", 0.81))
            .await
            .unwrap()
            .unwrap();
        manager
            .create_alert(
                "disk_critical",
                &Metric::new(names::DISK_UTILIZATION, 0.99).with_node("b"),
            )
            .await
            .unwrap();
        manager
            .create_alert(
                "error_rate_high",
                &Metric::new(names::ERROR_RATE, 0.4).with_node("c"),
            )
            .await
            .unwrap();

        let active = manager.active_alerts().await;
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|a| a.id != low.id));
        assert_eq!(
            manager.alert(&low.id).await.unwrap().status,
            AlertStatus::Resolved
        );
    }

    #[tokio::test]
    async fn test_auto_resolve_stale_alerts() {
        let manager = manager();
        let t0 = Utc::now();
        manager
            .create_alert_at("cpu_high", &cpu("n1", 0.9), t0)
            .await
            .unwrap();

        assert!(manager.auto_resolve(t0 + chrono::Duration::minutes(30)).await.is_empty());
        let resolved = manager.auto_resolve(t0 + chrono::Duration::minutes(61)).await;
        assert_eq!(resolved.len(), 1);
        assert!(manager.active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_rule_table_management() {
        let manager = manager();
        assert!(manager.rule(PREDICTIVE_RULE_ID).await.is_some());

        manager
            .add_rule(AlertRule::new(
                "queue",
                "Queue backlog",
                names::QUEUE_DEPTH,
                Condition::Gt,
                50.0,
                Severity::Medium,
            ))
            .await;
        let alert = manager
            .create_alert("queue", &Metric::new(names::QUEUE_DEPTH, 80.0).with_node("n1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            alert.recommended_actions,
            vec!["Investigate metric anomaly", "Check system health"]
        );

        assert!(manager.remove_rule("queue").await.is_some());
        assert!(manager.create_alert("queue", &cpu("n1", 1.0)).await.is_err());
    }
}
