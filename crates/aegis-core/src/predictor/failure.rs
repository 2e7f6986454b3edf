//! Node failure prediction
//!
//! Turns a node's latest metrics into a [`FailurePrediction`] when the
//! failure model and the anomaly detector agree the node is at risk.
//! Predictions are cached per node until they age out of the prediction
//! window. Labeled outcomes feed the training buffer used by `retrain`.

use super::features::{extract_features, FeatureVector, CPU, DISK, ERROR_RATE, MEMORY};
use super::model::{FailureModel, ModelStats, RiskWeights, TrainingExample};
use crate::anomaly::{AnomalyConfig, AnomalyDetector};
use crate::error::PredictorError;
use crate::models::{serde_secs, Severity};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::ConcurrentStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default prediction window
pub const DEFAULT_PREDICTION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default minimum probability for a prediction to be emitted
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    CpuExhaustion,
    MemoryExhaustion,
    DiskExhaustion,
    ServiceDegradation,
    GeneralFailure,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::CpuExhaustion => "cpu_exhaustion",
            FailureType::MemoryExhaustion => "memory_exhaustion",
            FailureType::DiskExhaustion => "disk_exhaustion",
            FailureType::ServiceDegradation => "service_degradation",
            FailureType::GeneralFailure => "general_failure",
        }
    }

    /// Classify the dominant failure mode, first match wins
    pub fn classify(features: &FeatureVector) -> Self {
        if features[CPU] > 0.9 {
            FailureType::CpuExhaustion
        } else if features[MEMORY] > 0.9 {
            FailureType::MemoryExhaustion
        } else if features[DISK] > 0.9 {
            FailureType::DiskExhaustion
        } else if features[ERROR_RATE] > 0.1 {
            FailureType::ServiceDegradation
        } else {
            FailureType::GeneralFailure
        }
    }

    pub fn root_cause(&self) -> &'static str {
        match self {
            FailureType::CpuExhaustion => "High CPU utilization detected",
            FailureType::MemoryExhaustion => "High memory utilization detected",
            FailureType::DiskExhaustion => "High disk utilization detected",
            FailureType::ServiceDegradation => "High error rate detected",
            FailureType::GeneralFailure => "Multiple system indicators showing stress",
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        let actions: &[&str] = match self {
            FailureType::CpuExhaustion => &[
                "Scale up CPU resources",
                "Optimize CPU-intensive processes",
                "Consider load balancing",
            ],
            FailureType::MemoryExhaustion => &[
                "Increase memory allocation",
                "Check for memory leaks",
                "Optimize memory usage",
            ],
            FailureType::DiskExhaustion => &[
                "Clean up disk space",
                "Archive old data",
                "Add storage capacity",
            ],
            FailureType::ServiceDegradation => &[
                "Check service health",
                "Review recent deployments",
                "Monitor error logs",
            ],
            FailureType::GeneralFailure => &[
                "Monitor system closely",
                "Prepare for maintenance",
                "Check all system components",
            ],
        };
        actions.iter().map(|a| a.to_string()).collect()
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToFailureBand {
    pub min_probability: f64,
    #[serde(rename = "time_to_failure_secs", with = "serde_secs")]
    pub time_to_failure: Duration,
}

impl TimeToFailureBand {
    pub fn new(min_probability: f64, time_to_failure: Duration) -> Self {
        Self {
            min_probability,
            time_to_failure,
        }
    }
}

/// Probability bands mapping onto time to failure and severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionBands {
    /// Checked in order, first band whose minimum is met wins
    pub time_to_failure: Vec<TimeToFailureBand>,
    #[serde(rename = "fallback_time_to_failure_secs", with = "serde_secs")]
    pub fallback_time_to_failure: Duration,
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PredictionBands {
    fn default() -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        Self {
            time_to_failure: vec![
                TimeToFailureBand::new(0.9, minutes(5)),
                TimeToFailureBand::new(0.8, minutes(15)),
                TimeToFailureBand::new(0.7, minutes(30)),
                TimeToFailureBand::new(0.6, minutes(60)),
            ],
            fallback_time_to_failure: minutes(120),
            critical: 0.9,
            high: 0.7,
            medium: 0.5,
        }
    }
}

impl PredictionBands {
    pub fn time_to_failure(&self, probability: f64) -> Duration {
        self.time_to_failure
            .iter()
            .find(|band| probability >= band.min_probability)
            .map(|band| band.time_to_failure)
            .unwrap_or(self.fallback_time_to_failure)
    }

    pub fn severity(&self, probability: f64) -> Severity {
        if probability >= self.critical {
            Severity::Critical
        } else if probability >= self.high {
            Severity::High
        } else if probability >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Below all of these (and with no anomaly) a node is considered healthy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthyLimits {
    pub cpu: f64,
    pub memory: f64,
    pub error_rate: f64,
}

impl Default for HealthyLimits {
    fn default() -> Self {
        Self {
            cpu: 0.7,
            memory: 0.7,
            error_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub confidence_threshold: f64,
    #[serde(rename = "prediction_window_secs", with = "serde_secs")]
    pub prediction_window: Duration,
    pub max_training_examples: usize,
    pub min_training_examples: usize,
    pub training_epochs: usize,
    pub learning_rate: f64,
    pub risk: RiskWeights,
    pub bands: PredictionBands,
    pub healthy: HealthyLimits,
    pub anomaly: AnomalyConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            prediction_window: DEFAULT_PREDICTION_WINDOW,
            max_training_examples: 10_000,
            min_training_examples: 10,
            training_epochs: 10,
            learning_rate: 0.01,
            risk: RiskWeights::default(),
            bands: PredictionBands::default(),
            healthy: HealthyLimits::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub node_id: String,
    pub failure_type: FailureType,
    pub probability: f64,
    pub confidence: f64,
    #[serde(rename = "time_to_failure_secs", with = "serde_secs")]
    pub time_to_failure: Duration,
    pub predicted_time: DateTime<Utc>,
    pub root_cause: String,
    pub severity: Severity,
    pub recommendations: Vec<String>,
    pub anomaly_score: f64,
    pub learned_probability: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct FailurePredictor {
    config: PredictorConfig,
    model: RwLock<FailureModel>,
    training: RwLock<VecDeque<TrainingExample>>,
    anomaly: AnomalyDetector,
    predictions: ConcurrentStore<String, FailurePrediction>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl FailurePredictor {
    pub fn new(config: PredictorConfig, logger: StructuredLogger) -> Self {
        Self {
            model: RwLock::new(FailureModel::new(config.risk.clone())),
            training: RwLock::new(VecDeque::new()),
            anomaly: AnomalyDetector::new(config.anomaly.clone()),
            predictions: ConcurrentStore::new(),
            metrics: EngineMetrics::new(),
            logger,
            config,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn anomaly_detector(&self) -> &AnomalyDetector {
        &self.anomaly
    }

    pub async fn predict_failure(
        &self,
        node_id: &str,
        metrics: &HashMap<String, f64>,
    ) -> Result<Option<FailurePrediction>, PredictorError> {
        self.predict_failure_at(node_id, metrics, Utc::now()).await
    }

    /// Predict whether `node_id` is heading for failure
    ///
    /// Returns `Ok(None)` for nodes below the confidence threshold or
    /// within healthy limits. A returned prediction replaces the cached one.
    pub async fn predict_failure_at(
        &self,
        node_id: &str,
        metrics: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Result<Option<FailurePrediction>, PredictorError> {
        let features = extract_features(node_id, metrics, now);
        let output = self.model.read().await.predict(&features)?;
        let anomaly = self.anomaly.detect_anomaly(&features);

        let mut probability = output.probability;
        if anomaly.is_anomaly {
            self.metrics.inc_anomalies_detected();
            self.logger
                .log_anomaly(node_id, anomaly.score, anomaly.extreme_count);
            probability = probability.max(anomaly.score);
        }

        if probability < self.config.confidence_threshold {
            debug!(node_id = %node_id, probability, "Failure probability below threshold");
            return Ok(None);
        }

        let healthy = &self.config.healthy;
        if features[CPU] < healthy.cpu
            && features[MEMORY] < healthy.memory
            && features[ERROR_RATE] < healthy.error_rate
            && !anomaly.is_anomaly
        {
            debug!(node_id = %node_id, "Node within healthy limits");
            return Ok(None);
        }

        let failure_type = FailureType::classify(&features);
        let time_to_failure = self.config.bands.time_to_failure(probability);
        let predicted_time = now
            + chrono::Duration::from_std(time_to_failure)
                .unwrap_or_else(|_| chrono::Duration::zero());

        let prediction = FailurePrediction {
            node_id: node_id.to_string(),
            failure_type,
            probability,
            confidence: output.confidence,
            time_to_failure,
            predicted_time,
            root_cause: failure_type.root_cause().to_string(),
            severity: self.config.bands.severity(probability),
            recommendations: failure_type.recommendations(),
            anomaly_score: anomaly.score,
            learned_probability: output.learned_probability,
            timestamp: now,
        };

        self.predictions
            .insert(node_id.to_string(), prediction.clone());
        self.metrics.inc_predictions_generated();
        self.logger.log_prediction(&prediction);
        Ok(Some(prediction))
    }

    /// Record a labeled outcome for the next retrain
    pub async fn add_training_data(
        &self,
        node_id: &str,
        metrics: &HashMap<String, f64>,
        failed: bool,
    ) {
        let now = Utc::now();
        let example = TrainingExample {
            features: extract_features(node_id, metrics, now),
            label: if failed { 1.0 } else { 0.0 },
            weight: 1.0,
            node_id: node_id.to_string(),
            time: now,
        };

        let mut training = self.training.write().await;
        training.push_back(example);
        while training.len() > self.config.max_training_examples {
            training.pop_front();
        }
    }

    pub async fn training_examples(&self) -> usize {
        self.training.read().await.len()
    }

    /// Retrain the learned weights on the buffered examples
    pub async fn retrain(&self) -> Result<ModelStats, PredictorError> {
        let examples: Vec<TrainingExample> = {
            let training = self.training.read().await;
            if training.len() < self.config.min_training_examples {
                return Err(PredictorError::InsufficientTrainingData {
                    required: self.config.min_training_examples,
                    available: training.len(),
                });
            }
            training.iter().cloned().collect()
        };

        let mut candidate = self.model.read().await.clone();
        candidate.train(
            &examples,
            self.config.training_epochs,
            self.config.learning_rate,
        );
        let stats = candidate.stats().clone();
        *self.model.write().await = candidate;

        self.metrics.set_model_accuracy(stats.accuracy);
        self.logger
            .log_model_retrained(stats.trained_examples, stats.accuracy);
        Ok(stats)
    }

    pub async fn model_stats(&self) -> ModelStats {
        self.model.read().await.stats().clone()
    }

    pub fn predictions(&self) -> HashMap<String, FailurePrediction> {
        self.predictions.snapshot().into_iter().collect()
    }

    pub fn prediction(&self, node_id: &str) -> Option<FailurePrediction> {
        self.predictions.get(&node_id.to_string())
    }

    /// Drop predictions older than the prediction window
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let window = chrono::Duration::from_std(self.config.prediction_window)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let before = self.predictions.len();
        self.predictions
            .retain(|_, p| now.signed_duration_since(p.timestamp) <= window);
        let evicted = before.saturating_sub(self.predictions.len());
        if evicted > 0 {
            info!(evicted, "Evicted stale predictions");
        }
        evicted
    }
}
