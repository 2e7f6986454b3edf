//! The monitoring engine
//!
//! Wires the metrics feed, alert manager, failure predictor and chaos
//! framework together and drives them from five periodic loops:
//!
//! - metric collection from the registered [`MetricCollector`]s
//! - alert evaluation, which also auto-resolves stale alerts, refreshes
//!   node failure predictions and raises predictive alerts
//! - dashboard refresh, published on a watch channel
//! - prediction cleanup
//! - model retraining
//!
//! All loops stop together on [`MonitoringEngine::stop`], which also cancels
//! pending escalations and rolls back running chaos experiments.

use crate::alerting::{Alert, AlertGroup, AlertManager, AlertStatus, GroupStatus, RuleEvaluator};
use crate::chaos::{
    resilience_score, ChaosFramework, ExperimentResult, FailureInjector, FeedMetricsSource,
    SimulatedInjector,
};
use crate::collector::MetricCollector;
use crate::config::EngineConfig;
use crate::error::PredictorError;
use crate::feed::MetricsFeed;
use crate::health::{components, HealthRegistry};
use crate::integration::{IntegrationManager, LogIntegration};
use crate::models::Metric;
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::predictor::{FailurePrediction, FailurePredictor};
use crate::scheduler::TaskScheduler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Point-in-time summary for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// `None` until the first refresh
    pub generated_at: Option<DateTime<Utc>>,
    pub nodes: usize,
    pub series: usize,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub escalated_alerts: usize,
    pub open_groups: usize,
    /// Nodes with a live failure prediction, most likely first
    pub at_risk_nodes: Vec<String>,
    pub running_experiments: usize,
    pub failed_rollbacks: usize,
    pub resilience_score: f64,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            generated_at: None,
            nodes: 0,
            series: 0,
            active_alerts: 0,
            critical_alerts: 0,
            escalated_alerts: 0,
            open_groups: 0,
            at_risk_nodes: Vec::new(),
            running_experiments: 0,
            failed_rollbacks: 0,
            resilience_score: 1.0,
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    feed: MetricsFeed,
    alerts: Arc<AlertManager>,
    evaluator: RuleEvaluator,
    predictor: FailurePredictor,
    chaos: ChaosFramework,
    integrations: Arc<IntegrationManager>,
    collectors: Mutex<Vec<Arc<dyn MetricCollector>>>,
    health: HealthRegistry,
    dashboard: watch::Sender<DashboardSnapshot>,
    metrics: EngineMetrics,
}

pub struct MonitoringEngine {
    inner: Arc<EngineInner>,
    scheduler: TaskScheduler,
    started: AtomicBool,
    logger: StructuredLogger,
}

impl MonitoringEngine {
    /// Engine with log-only integrations and simulated fault injection
    pub fn new(config: EngineConfig) -> Self {
        let integrations =
            IntegrationManager::new().with_integration(Arc::new(LogIntegration::default()));
        Self::with_components(config, integrations, Arc::new(SimulatedInjector::new()))
    }

    pub fn with_components(
        config: EngineConfig,
        integrations: IntegrationManager,
        injector: Arc<dyn FailureInjector>,
    ) -> Self {
        let logger = StructuredLogger::new(config.instance.clone());
        let feed = MetricsFeed::new();
        let integrations = Arc::new(integrations);

        let alerts = Arc::new(AlertManager::new(
            config.alerting.clone(),
            integrations.clone(),
            logger.clone(),
        ));
        let evaluator = RuleEvaluator::new(alerts.clone());
        let predictor = FailurePredictor::new(config.predictor.clone(), logger.clone());
        let chaos = ChaosFramework::new(
            config.chaos.clone(),
            injector,
            Arc::new(FeedMetricsSource::new(feed.clone())),
            logger.clone(),
        );
        let (dashboard, _) = watch::channel(DashboardSnapshot::default());

        info!(
            instance = %config.instance,
            integrations = ?integrations.names(),
            "Monitoring engine created"
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                feed,
                alerts,
                evaluator,
                predictor,
                chaos,
                integrations,
                collectors: Mutex::new(Vec::new()),
                health: HealthRegistry::new(),
                dashboard,
                metrics: EngineMetrics::new(),
            }),
            scheduler: TaskScheduler::new(),
            started: AtomicBool::new(false),
            logger,
        }
    }

    pub fn with_collector(self, collector: Arc<dyn MetricCollector>) -> Self {
        self.add_collector(collector);
        self
    }

    /// Register a collector; picked up on the next collection tick
    pub fn add_collector(&self, collector: Arc<dyn MetricCollector>) {
        info!(collector = collector.name(), "Registered metric collector");
        self.inner
            .collectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(collector);
    }

    /// Push a sample straight into the feed
    pub fn ingest(&self, metric: Metric) {
        self.inner.ingest(vec![metric]);
    }

    pub fn ingest_batch(&self, metrics: Vec<Metric>) {
        self.inner.ingest(metrics);
    }

    /// Spawn the background loops. Calling it twice is a no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Monitoring engine already started");
            return;
        }

        let health = &self.inner.health;
        health.register_all().await;

        let intervals = self.inner.config.scheduler.clone();
        self.spawn_loop("metric_collection", intervals.collection_interval, |inner| async move {
            inner.collect_metrics().await
        });
        self.spawn_loop("alert_evaluation", intervals.evaluation_interval, |inner| async move {
            inner.evaluate().await
        });
        self.spawn_loop(
            "dashboard_refresh",
            intervals.dashboard_refresh_interval,
            |inner| async move { inner.refresh_dashboard().await },
        );
        self.spawn_loop(
            "prediction_cleanup",
            intervals.prediction_cleanup_interval,
            |inner| async move { inner.cleanup_predictions() },
        );
        self.spawn_loop("model_retrain", intervals.retrain_interval, |inner| async move {
            inner.retrain().await
        });

        health.set_ready(true).await;
        self.logger.log_startup(ENGINE_VERSION);
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: std::time::Duration, body: F)
    where
        F: Fn(Arc<EngineInner>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let inner = self.inner.clone();
        self.scheduler
            .spawn_periodic(name, period, move || body(inner.clone()));
    }

    /// Stop every loop, cancel escalations and roll back running experiments
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.logger.log_shutdown("stop requested");
        self.inner.health.set_ready(false).await;
        self.scheduler.stop().await;
        self.inner.alerts.shutdown();
        self.inner.chaos.shutdown().await;
        info!("Monitoring engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.scheduler.task_names()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.inner.alerts.active_alerts().await
    }

    pub async fn escalated_alerts(&self) -> Vec<Alert> {
        self.inner.alerts.escalated_alerts().await
    }

    pub fn alert_groups(&self) -> Vec<AlertGroup> {
        self.inner.alerts.alert_groups()
    }

    pub fn predictions(&self) -> HashMap<String, FailurePrediction> {
        self.inner.predictor.predictions()
    }

    pub async fn experiment_history(&self) -> Vec<ExperimentResult> {
        self.inner.chaos.history().await
    }

    pub async fn resilience_score(&self) -> f64 {
        self.inner.chaos.resilience_score().await
    }

    /// Latest dashboard snapshot, updated on every refresh tick
    pub fn dashboard(&self) -> watch::Receiver<DashboardSnapshot> {
        self.inner.dashboard.subscribe()
    }

    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.inner.alerts
    }

    pub fn predictor(&self) -> &FailurePredictor {
        &self.inner.predictor
    }

    pub fn chaos(&self) -> &ChaosFramework {
        &self.inner.chaos
    }

    pub fn feed(&self) -> &MetricsFeed {
        &self.inner.feed
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.inner.health
    }
}

impl EngineInner {
    fn ingest(&self, metrics: Vec<Metric>) {
        let count = metrics.len() as u64;
        self.feed.ingest_batch(metrics);
        self.metrics.inc_metrics_ingested(count);
    }

    async fn collect_metrics(&self) {
        let collectors: Vec<_> = self
            .collectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = Vec::new();
        for collector in collectors {
            match collector.collect().await {
                Ok(metrics) => {
                    debug!(collector = collector.name(), count = metrics.len(), "Collected metrics");
                    self.integrations.dispatch_metrics(&metrics).await;
                    self.ingest(metrics);
                }
                Err(e) => {
                    warn!(collector = collector.name(), error = %e, "Metric collection failed");
                    failures.push(format!("{}: {}", collector.name(), e));
                }
            }
        }

        if failures.is_empty() {
            self.health.set_healthy(components::INGESTION).await;
        } else {
            self.health
                .set_degraded(components::INGESTION, failures.join("; "))
                .await;
        }
    }

    async fn evaluate(&self) {
        let now = Utc::now();
        self.feed.evict_stale(now, self.config.max_sample_age);
        let created = self.evaluator.evaluate_at(&self.feed, now).await;
        let resolved = self.alerts.auto_resolve(now).await;
        self.alerts.housekeeping(now);
        self.health.set_healthy(components::ALERTING).await;

        let mut failed = Vec::new();
        for node_id in self.feed.nodes() {
            let metrics = self.feed.node_metrics(&node_id);
            if let Err(e) = self.predictor.predict_failure_at(&node_id, &metrics, now).await {
                warn!(node_id = %node_id, error = %e, "Failure prediction failed");
                failed.push(node_id);
            }
        }
        if failed.is_empty() {
            self.health.set_healthy(components::PREDICTOR).await;
        } else {
            self.health
                .set_degraded(
                    components::PREDICTOR,
                    format!("prediction failed for {}", failed.join(", ")),
                )
                .await;
        }

        let predictive = if self.config.predictive_alerts {
            self.evaluator
                .evaluate_predictions(&self.predictor.predictions())
                .await
        } else {
            Vec::new()
        };

        debug!(
            created = created.len(),
            predictive = predictive.len(),
            resolved = resolved.len(),
            pending = self.evaluator.pending_breaches(),
            "Evaluation cycle complete"
        );
    }

    async fn refresh_dashboard(&self) {
        let alerts = self.alerts.active_alerts().await;
        let history = self.chaos.history().await;

        let mut predictions: Vec<FailurePrediction> =
            self.predictor.predictions().into_values().collect();
        predictions.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        let failed_rollbacks = history.iter().filter(|r| r.rollback_failed()).count();
        if failed_rollbacks == 0 {
            self.health.set_healthy(components::CHAOS).await;
        } else {
            self.health
                .set_degraded(
                    components::CHAOS,
                    format!("{failed_rollbacks} experiment rollback(s) failed"),
                )
                .await;
        }

        let snapshot = DashboardSnapshot {
            generated_at: Some(Utc::now()),
            nodes: self.feed.nodes().len(),
            series: self.feed.series_count(),
            active_alerts: alerts.len(),
            critical_alerts: alerts.iter().filter(|a| a.is_critical()).count(),
            escalated_alerts: alerts
                .iter()
                .filter(|a| a.status == AlertStatus::Escalated)
                .count(),
            open_groups: self
                .alerts
                .alert_groups()
                .iter()
                .filter(|g| g.status == GroupStatus::Open)
                .count(),
            at_risk_nodes: predictions.into_iter().map(|p| p.node_id).collect(),
            running_experiments: self.chaos.running_count(),
            failed_rollbacks,
            resilience_score: resilience_score(&history),
        };
        self.dashboard.send_replace(snapshot);
    }

    fn cleanup_predictions(&self) {
        let evicted = self.predictor.cleanup(Utc::now());
        if evicted > 0 {
            debug!(evicted, "Cleaned up stale predictions");
        }
    }

    async fn retrain(&self) {
        match self.predictor.retrain().await {
            Ok(stats) => {
                info!(
                    examples = stats.trained_examples,
                    accuracy = stats.accuracy,
                    "Failure model retrained"
                );
                self.health.set_healthy(components::PREDICTOR).await;
            }
            Err(PredictorError::InsufficientTrainingData { required, available }) => {
                debug!(required, available, "Skipping retrain, not enough training data");
            }
            Err(e) => {
                warn!(error = %e, "Failure model retrain failed");
                self.health
                    .set_degraded(components::PREDICTOR, e.to_string())
                    .await;
            }
        }
    }
}
