//! Rule evaluation against the metrics feed
//!
//! A rule with a non-zero `duration` must see its condition hold across
//! consecutive evaluations for that long before an alert fires. Breaches
//! that clear reset the pending timer.

use super::alert::Alert;
use super::manager::AlertManager;
use super::rule::PREDICTIVE_RULE_ID;
use crate::feed::MetricsFeed;
use crate::models::{names, Metric};
use crate::observability::EngineMetrics;
use crate::predictor::FailurePrediction;
use crate::store::ConcurrentStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

type BreachKey = (String, String);

pub struct RuleEvaluator {
    manager: Arc<AlertManager>,
    /// First time each (rule, node) breach was seen
    pending: ConcurrentStore<BreachKey, DateTime<Utc>>,
    /// Timestamp of the last prediction turned into an alert, per node
    alerted_predictions: ConcurrentStore<String, DateTime<Utc>>,
    metrics: EngineMetrics,
}

impl RuleEvaluator {
    pub fn new(manager: Arc<AlertManager>) -> Self {
        Self {
            manager,
            pending: ConcurrentStore::new(),
            alerted_predictions: ConcurrentStore::new(),
            metrics: EngineMetrics::new(),
        }
    }

    pub async fn evaluate(&self, feed: &MetricsFeed) -> Vec<Alert> {
        self.evaluate_at(feed, Utc::now()).await
    }

    /// Evaluate every enabled rule against each node's latest sample
    pub async fn evaluate_at(&self, feed: &MetricsFeed, now: DateTime<Utc>) -> Vec<Alert> {
        let start = Instant::now();
        let mut created = Vec::new();

        for rule in self.manager.rules().await.into_iter().filter(|r| r.enabled) {
            if rule.id == PREDICTIVE_RULE_ID {
                continue;
            }

            for metric in feed.latest(&rule.metric_name) {
                let key = (rule.id.clone(), metric.node_id().to_string());

                if !rule.matches(metric.value) {
                    self.pending.remove(&key);
                    continue;
                }

                let since = self.pending.upsert(key.clone(), || now, |first| *first);
                let held = now.signed_duration_since(since);
                let required = chrono::Duration::from_std(rule.duration)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                if held < required {
                    debug!(
                        rule_id = %rule.id,
                        node_id = %metric.node_id(),
                        held_secs = held.num_seconds(),
                        "Breach pending"
                    );
                    continue;
                }

                self.pending.remove(&key);
                match self.manager.create_alert_at(&rule.id, &metric, now).await {
                    Ok(Some(alert)) => created.push(alert),
                    Ok(None) => {}
                    Err(e) => warn!(rule_id = %rule.id, error = %e, "Failed to create alert"),
                }
            }
        }

        self.metrics
            .observe_evaluation_latency(start.elapsed().as_secs_f64());
        created
    }

    /// Raise alerts for fresh predictions breaching the predictive rule
    pub async fn evaluate_predictions(
        &self,
        predictions: &HashMap<String, FailurePrediction>,
    ) -> Vec<Alert> {
        let Some(rule) = self.manager.rule(PREDICTIVE_RULE_ID).await else {
            debug!("Predictive alert rule not configured");
            return Vec::new();
        };

        let mut created = Vec::new();
        for (node_id, prediction) in predictions {
            if !rule.matches(prediction.probability) {
                continue;
            }
            let already_alerted = self
                .alerted_predictions
                .get(node_id)
                .map(|ts| ts >= prediction.timestamp)
                .unwrap_or(false);
            if already_alerted {
                continue;
            }

            let metric = Metric::new(names::FAILURE_PROBABILITY, prediction.probability)
                .with_node(node_id.clone())
                .with_label("failure_type", prediction.failure_type.to_string())
                .with_timestamp(prediction.timestamp);

            let outcome = self
                .manager
                .create_alert_with_actions(
                    PREDICTIVE_RULE_ID,
                    &metric,
                    prediction.recommendations.clone(),
                )
                .await;
            match outcome {
                Ok(Some(alert)) => created.push(alert),
                Ok(None) => {}
                Err(e) => warn!(node_id = %node_id, error = %e, "Failed to create predictive alert"),
            }
            self.alerted_predictions
                .insert(node_id.clone(), prediction.timestamp);
        }
        created
    }

    pub fn pending_breaches(&self) -> usize {
        self.pending.len()
    }
}
