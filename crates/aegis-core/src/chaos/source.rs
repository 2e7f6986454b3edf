//! Target service health for safety monitoring

use super::experiment::ServiceHealth;
use crate::feed::MetricsFeed;
use crate::models::names;
use crate::store::ConcurrentStore;
use anyhow::{bail, Result};
use async_trait::async_trait;

/// Trait for reading a service's current health
#[async_trait]
pub trait ServiceMetricsSource: Send + Sync {
    async fn current_metrics(&self, service: &str) -> Result<ServiceHealth>;

    /// Forget any baseline held for `service`; called when an experiment starts
    fn reset_baseline(&self, _service: &str) {}
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    latency: Option<f64>,
    throughput: Option<f64>,
}

/// Reads service-labelled samples from the metrics feed
///
/// Latency and throughput are compared against the first values seen for
/// the service since the last baseline reset.
#[derive(Clone)]
pub struct FeedMetricsSource {
    feed: MetricsFeed,
    baselines: ConcurrentStore<String, Baseline>,
}

impl FeedMetricsSource {
    pub fn new(feed: MetricsFeed) -> Self {
        Self {
            feed,
            baselines: ConcurrentStore::new(),
        }
    }
}

#[async_trait]
impl ServiceMetricsSource for FeedMetricsSource {
    async fn current_metrics(&self, service: &str) -> Result<ServiceHealth> {
        let metrics = self.feed.service_metrics(service);
        if metrics.is_empty() {
            bail!("no metrics reported for service {service}");
        }
        let get = |name: &str| metrics.get(name).copied();

        let latency = get(names::LATENCY).or_else(|| get(names::RESPONSE_TIME));
        let throughput = get(names::THROUGHPUT);
        let baseline = self.baselines.upsert(
            service.to_string(),
            || Baseline { latency, throughput },
            |b| *b,
        );

        let latency_increase = match (latency, baseline.latency) {
            (Some(current), Some(base)) if base > 0.0 => current / base,
            _ => 1.0,
        };
        let throughput_drop = match (throughput, baseline.throughput) {
            (Some(current), Some(base)) if base > 0.0 => (1.0 - current / base).clamp(0.0, 1.0),
            _ => 0.0,
        };
        let resource_usage = get(names::CPU_UTILIZATION)
            .unwrap_or(0.0)
            .max(get(names::MEMORY_UTILIZATION).unwrap_or(0.0));

        Ok(ServiceHealth {
            availability: get(names::AVAILABILITY).unwrap_or(1.0),
            error_rate: get(names::ERROR_RATE).unwrap_or(0.0),
            latency_increase,
            throughput_drop,
            resource_usage,
        })
    }

    fn reset_baseline(&self, service: &str) {
        self.baselines.remove(&service.to_string());
    }
}
