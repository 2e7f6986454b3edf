//! Delivery of alerts and metrics to external systems
//!
//! Integrations (paging, chat, metric sinks) sit behind the [`Integration`]
//! trait. The manager fans out to every enabled one; a failed delivery is
//! logged and counted, never propagated to the alerting path.

use crate::alerting::Alert;
use crate::models::Metric;
use crate::observability::EngineMetrics;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Integration: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<()>;

    async fn send_metrics(&self, metrics: &[Metric]) -> Result<()>;

    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;
}

/// Integration that writes deliveries to the log
#[derive(Debug, Clone)]
pub struct LogIntegration {
    enabled: bool,
}

impl Default for LogIntegration {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl LogIntegration {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Integration for LogIntegration {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        info!(
            integration = "log",
            alert_id = %alert.id,
            status = %alert.status,
            severity = %alert.severity,
            node_id = %alert.node_id,
            description = %alert.description,
            "Alert notification"
        );
        Ok(())
    }

    async fn send_metrics(&self, metrics: &[Metric]) -> Result<()> {
        debug!(integration = "log", count = metrics.len(), "Metrics batch");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Default)]
pub struct IntegrationManager {
    integrations: Vec<Arc<dyn Integration>>,
    metrics: EngineMetrics,
}

impl IntegrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.integrations.push(integration);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.integrations.iter().map(|i| i.name().to_string()).collect()
    }

    /// Deliver an alert to every enabled integration.
    ///
    /// Returns how many deliveries succeeded.
    pub async fn dispatch_alert(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for integration in self.integrations.iter().filter(|i| i.is_enabled()) {
            match integration.send_alert(alert).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        integration = %integration.name(),
                        alert_id = %alert.id,
                        error = %e,
                        "Failed to deliver alert"
                    );
                    self.metrics.inc_integration_failures(integration.name());
                }
            }
        }
        delivered
    }

    pub async fn dispatch_metrics(&self, metrics: &[Metric]) -> usize {
        if metrics.is_empty() {
            return 0;
        }
        let mut delivered = 0;
        for integration in self.integrations.iter().filter(|i| i.is_enabled()) {
            match integration.send_metrics(metrics).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        integration = %integration.name(),
                        count = metrics.len(),
                        error = %e,
                        "Failed to deliver metrics"
                    );
                    self.metrics.inc_integration_failures(integration.name());
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Integration that records what it receives
    #[derive(Default)]
    pub struct RecordingIntegration {
        pub alerts: Mutex<Vec<Alert>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        async fn send_alert(&self, alert: &Alert) -> Result<()> {
            if self.fail {
                anyhow::bail!("endpoint unreachable");
            }
            self.alerts.lock().await.push(alert.clone());
            Ok(())
        }

        async fn send_metrics(&self, _metrics: &[Metric]) -> Result<()> {
            if self.fail {
                anyhow::bail!("endpoint unreachable");
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingIntegration;
    use super::*;
    use crate::alerting::{AlertRule, Condition};
    use crate::models::Severity;
    use chrono::Utc;

    fn sample_alert() -> Alert {
        let rule = AlertRule::new("r", "rule", "cpu_utilization", Condition::Gt, 0.8, Severity::Critical);
        Alert::from_rule(&rule, &Metric::new("cpu_utilization", 0.99), Utc::now())
    }

    #[tokio::test]
    async fn test_dispatch_to_enabled_integrations() {
        let recorder = Arc::new(RecordingIntegration::default());
        let manager = IntegrationManager::new()
            .with_integration(recorder.clone())
            .with_integration(Arc::new(LogIntegration::new(false)));

        let delivered = manager.dispatch_alert(&sample_alert()).await;
        assert_eq!(delivered, 1);
        assert_eq!(recorder.alerts.lock().await.len(), 1);
        assert_eq!(manager.names(), vec!["recording", "log"]);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_not_fatal() {
        let failing = Arc::new(RecordingIntegration {
            fail: true,
            ..Default::default()
        });
        let manager = IntegrationManager::new()
            .with_integration(failing)
            .with_integration(Arc::new(LogIntegration::default()));

        assert_eq!(manager.dispatch_alert(&sample_alert()).await, 1);
        assert_eq!(
            manager
                .dispatch_metrics(&[Metric::new("cpu_utilization", 0.5)])
                .await,
            1
        );
    }

    #[tokio::test]
    async fn test_empty_metrics_batch_skipped() {
        let manager = IntegrationManager::new().with_integration(Arc::new(LogIntegration::default()));
        assert_eq!(manager.dispatch_metrics(&[]).await, 0);
    }
}
