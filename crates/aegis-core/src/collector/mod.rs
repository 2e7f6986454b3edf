//! Metric sources for the monitoring engine
//!
//! Collectors are polled on the collection loop and their samples are
//! pushed into the [`MetricsFeed`](crate::feed::MetricsFeed). A failing
//! collector is logged and skipped for that tick.

mod host;

pub use host::HostCollector;

use crate::models::Metric;
use anyhow::Result;
use async_trait::async_trait;

/// Trait for metric source implementations
#[async_trait]
pub trait MetricCollector: Send + Sync {
    /// Collect the current samples
    async fn collect(&self) -> Result<Vec<Metric>>;

    fn name(&self) -> &str;
}

/// Collector replaying a fixed set of samples, for tests and demos
pub struct StaticCollector {
    name: String,
    metrics: Vec<Metric>,
}

impl StaticCollector {
    pub fn new(name: impl Into<String>, metrics: Vec<Metric>) -> Self {
        Self {
            name: name.into(),
            metrics,
        }
    }
}

#[async_trait]
impl MetricCollector for StaticCollector {
    async fn collect(&self) -> Result<Vec<Metric>> {
        let now = chrono::Utc::now();
        Ok(self
            .metrics
            .iter()
            .cloned()
            .map(|m| m.with_timestamp(now))
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
