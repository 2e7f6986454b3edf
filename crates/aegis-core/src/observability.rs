//! Observability for the monitoring engine
//!
//! Provides:
//! - Prometheus metrics (alert volume, evaluation latency, predictions, chaos runs)
//! - Structured event logging with tracing

use crate::alerting::Alert;
use crate::chaos::ExperimentResult;
use crate::predictor::FailurePrediction;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for evaluation cycles (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    metrics_ingested: IntCounter,
    alerts_created: IntCounterVec,
    alerts_suppressed: IntCounter,
    alerts_escalated: IntCounter,
    active_alerts: IntGauge,
    evaluation_latency_seconds: Histogram,
    predictions_generated: IntCounter,
    anomalies_detected: IntCounter,
    model_accuracy: Gauge,
    experiments: IntCounterVec,
    running_experiments: IntGauge,
    resilience_score: Gauge,
    integration_failures: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            metrics_ingested: register_int_counter!(
                "aegis_metrics_ingested_total",
                "Total number of metric samples ingested"
            )
            .expect("Failed to register metrics_ingested"),

            alerts_created: register_int_counter_vec!(
                "aegis_alerts_created_total",
                "Total number of alerts registered, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_created"),

            alerts_suppressed: register_int_counter!(
                "aegis_alerts_suppressed_total",
                "Total number of alerts muted by fatigue suppression"
            )
            .expect("Failed to register alerts_suppressed"),

            alerts_escalated: register_int_counter!(
                "aegis_alerts_escalated_total",
                "Total number of critical alerts escalated"
            )
            .expect("Failed to register alerts_escalated"),

            active_alerts: register_int_gauge!(
                "aegis_active_alerts",
                "Number of alerts currently open"
            )
            .expect("Failed to register active_alerts"),

            evaluation_latency_seconds: register_histogram!(
                "aegis_rule_evaluation_seconds",
                "Time spent evaluating alert rules per cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            predictions_generated: register_int_counter!(
                "aegis_predictions_generated_total",
                "Total number of failure predictions produced"
            )
            .expect("Failed to register predictions_generated"),

            anomalies_detected: register_int_counter!(
                "aegis_anomalies_detected_total",
                "Total number of anomalous feature vectors"
            )
            .expect("Failed to register anomalies_detected"),

            model_accuracy: register_gauge!(
                "aegis_failure_model_accuracy",
                "Accuracy estimate from the last retraining"
            )
            .expect("Failed to register model_accuracy"),

            experiments: register_int_counter_vec!(
                "aegis_chaos_experiments_total",
                "Chaos experiment lifecycle events, by outcome",
                &["outcome"]
            )
            .expect("Failed to register experiments"),

            running_experiments: register_int_gauge!(
                "aegis_chaos_running_experiments",
                "Number of chaos experiments in flight"
            )
            .expect("Failed to register running_experiments"),

            resilience_score: register_gauge!(
                "aegis_resilience_score",
                "Aggregate resilience score from experiment history"
            )
            .expect("Failed to register resilience_score"),

            integration_failures: register_int_counter_vec!(
                "aegis_integration_failures_total",
                "Failed deliveries to external integrations",
                &["integration"]
            )
            .expect("Failed to register integration_failures"),
        }
    }
}

/// Handle to the process-wide engine metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone, Debug)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn inc_metrics_ingested(&self, count: u64) {
        self.inner().metrics_ingested.inc_by(count);
    }

    pub fn inc_alerts_created(&self, severity: &str) {
        self.inner()
            .alerts_created
            .with_label_values(&[severity])
            .inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner().alerts_suppressed.inc();
    }

    pub fn inc_alerts_escalated(&self) {
        self.inner().alerts_escalated.inc();
    }

    pub fn set_active_alerts(&self, count: usize) {
        self.inner().active_alerts.set(count as i64);
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions_generated(&self) {
        self.inner().predictions_generated.inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn set_model_accuracy(&self, accuracy: f64) {
        self.inner().model_accuracy.set(accuracy);
    }

    /// Count a chaos lifecycle event (`started`, `completed`, `aborted`, `rollback_failed`)
    pub fn inc_experiments(&self, outcome: &str) {
        self.inner().experiments.with_label_values(&[outcome]).inc();
    }

    pub fn set_running_experiments(&self, count: usize) {
        self.inner().running_experiments.set(count as i64);
    }

    pub fn set_resilience_score(&self, score: f64) {
        self.inner().resilience_score.set(score);
    }

    pub fn inc_integration_failures(&self, integration: &str) {
        self.inner()
            .integration_failures
            .with_label_values(&[integration])
            .inc();
    }
}

/// Structured logger for engine events
///
/// Every line carries `event` and `instance` fields so log pipelines can
/// route alert, prediction and chaos events without parsing messages.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_alert_created(&self, alert: &Alert) {
        info!(
            event = "alert_created",
            instance = %self.instance,
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            node_id = %alert.node_id,
            metric = %alert.metric_name,
            value = alert.metric_value,
            severity = %alert.severity,
            priority = alert.priority,
            correlated = alert.correlated_alert_ids.len(),
            "Alert created"
        );
    }

    pub fn log_alert_suppressed(&self, node_id: &str, metric: &str, rule_id: &str) {
        info!(
            event = "alert_suppressed",
            instance = %self.instance,
            node_id = %node_id,
            metric = %metric,
            rule_id = %rule_id,
            "Alert suppressed by fatigue reducer"
        );
    }

    pub fn log_alert_escalated(&self, alert: &Alert) {
        warn!(
            event = "alert_escalated",
            instance = %self.instance,
            alert_id = %alert.id,
            node_id = %alert.node_id,
            metric = %alert.metric_name,
            "Critical alert unacknowledged, escalating"
        );
    }

    pub fn log_prediction(&self, prediction: &FailurePrediction) {
        let level_warn = prediction.probability >= 0.9;
        if level_warn {
            warn!(
                event = "failure_predicted",
                instance = %self.instance,
                node_id = %prediction.node_id,
                failure_type = %prediction.failure_type,
                probability = prediction.probability,
                confidence = prediction.confidence,
                time_to_failure_secs = prediction.time_to_failure.as_secs(),
                "Imminent node failure predicted"
            );
        } else {
            info!(
                event = "failure_predicted",
                instance = %self.instance,
                node_id = %prediction.node_id,
                failure_type = %prediction.failure_type,
                probability = prediction.probability,
                confidence = prediction.confidence,
                time_to_failure_secs = prediction.time_to_failure.as_secs(),
                "Node failure predicted"
            );
        }
    }

    pub fn log_anomaly(&self, node_id: &str, score: f64, extreme_dimensions: usize) {
        info!(
            event = "anomaly_detected",
            instance = %self.instance,
            node_id = %node_id,
            score = score,
            extreme_dimensions = extreme_dimensions,
            "Anomalous feature vector"
        );
    }

    pub fn log_model_retrained(&self, examples: usize, accuracy: f64) {
        info!(
            event = "model_retrained",
            instance = %self.instance,
            examples = examples,
            accuracy = accuracy,
            "Failure model retrained"
        );
    }

    pub fn log_experiment_started(&self, experiment_id: &str, service: &str, nodes: usize) {
        info!(
            event = "experiment_started",
            instance = %self.instance,
            experiment_id = %experiment_id,
            target_service = %service,
            target_nodes = nodes,
            "Chaos experiment started"
        );
    }

    pub fn log_experiment_finished(&self, result: &ExperimentResult) {
        if result.rollback_failed() {
            error!(
                event = "experiment_rollback_failed",
                instance = %self.instance,
                experiment_id = %result.experiment_id,
                reason = ?result.abort_reason,
                "Rollback failed, operator intervention required"
            );
            return;
        }

        info!(
            event = "experiment_finished",
            instance = %self.instance,
            experiment_id = %result.experiment_id,
            status = %result.status,
            duration_secs = result.duration.as_secs_f64(),
            availability = result.metrics.availability,
            error_rate = result.metrics.error_rate,
            violations = result.safety_violations.len(),
            "Chaos experiment finished"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            "Monitoring engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Monitoring engine shutting down"
        );
    }
}
