//! Latest-value view over the incoming metric stream
//!
//! Keeps the most recent sample per `(node_id, metric)` and, for samples
//! carrying a `service` label, per `(service, metric)`. Rule evaluation,
//! failure prediction and chaos safety monitoring all read from here.
//! Series that stop reporting are dropped by [`MetricsFeed::evict_stale`].

use crate::models::Metric;
use crate::store::ConcurrentStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

type SeriesKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct MetricsFeed {
    by_node: ConcurrentStore<SeriesKey, Metric>,
    by_service: ConcurrentStore<SeriesKey, Metric>,
}

impl MetricsFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, replacing an older one for the same series
    pub fn ingest(&self, metric: Metric) {
        if !metric.value.is_finite() {
            debug!(metric = %metric.name, node_id = %metric.node_id(), "Dropping non-finite sample");
            return;
        }

        if let Some(service) = metric.service() {
            let key = (service.to_string(), metric.name.clone());
            Self::keep_newest(&self.by_service, key, metric.clone());
        }

        let key = (metric.node_id().to_string(), metric.name.clone());
        Self::keep_newest(&self.by_node, key, metric);
    }

    pub fn ingest_batch(&self, metrics: impl IntoIterator<Item = Metric>) {
        for metric in metrics {
            self.ingest(metric);
        }
    }

    fn keep_newest(store: &ConcurrentStore<SeriesKey, Metric>, key: SeriesKey, metric: Metric) {
        store.upsert(
            key,
            || metric.clone(),
            |current| {
                if metric.timestamp >= current.timestamp {
                    *current = metric.clone();
                }
            },
        );
    }

    /// Drop series whose latest sample is at least `max_age` old.
    ///
    /// Returns the number of node series removed.
    pub fn evict_stale(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age =
            chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(365));
        let fresh = |metric: &Metric| now.signed_duration_since(metric.timestamp) < max_age;

        let before = self.by_node.len();
        self.by_node.retain(|_, metric| fresh(metric));
        self.by_service.retain(|_, metric| fresh(metric));
        let evicted = before.saturating_sub(self.by_node.len());
        if evicted > 0 {
            debug!(evicted, "Evicted stale metric series");
        }
        evicted
    }

    /// Node ids with at least one sample, sorted
    pub fn nodes(&self) -> Vec<String> {
        let nodes: BTreeSet<String> = self
            .by_node
            .snapshot()
            .into_iter()
            .map(|((node, _), _)| node)
            .collect();
        nodes.into_iter().collect()
    }

    /// Latest value of every metric reported by a node
    pub fn node_metrics(&self, node_id: &str) -> HashMap<String, f64> {
        self.by_node
            .snapshot()
            .into_iter()
            .filter(|((node, _), _)| node == node_id)
            .map(|((_, name), metric)| (name, metric.value))
            .collect()
    }

    /// Latest sample of one metric across all nodes
    pub fn latest(&self, metric_name: &str) -> Vec<Metric> {
        self.by_node
            .filter_values(|metric| metric.name == metric_name)
    }

    /// Latest value of every metric reported for a service
    pub fn service_metrics(&self, service: &str) -> HashMap<String, f64> {
        self.by_service
            .snapshot()
            .into_iter()
            .filter(|((svc, _), _)| svc == service)
            .map(|((_, name), metric)| (name, metric.value))
            .collect()
    }

    /// Every latest sample, for integrations that ship raw metrics
    pub fn all(&self) -> Vec<Metric> {
        self.by_node.values()
    }

    pub fn series_count(&self) -> usize {
        self.by_node.len()
    }
}
