//! Explainable failure scoring model
//!
//! The failure probability is a rule-weighted sum of how far the key
//! indicators sit past their safe cutoffs. The multipliers live in
//! [`RiskWeights`] so they can be tuned from configuration. A small
//! logistic model is trained alongside it from labeled history; its output
//! is reported as `learned_probability` and tracked for accuracy, but the
//! rule score remains the one that gates predictions.

use super::features::{FeatureVector, CPU, DISK, ERROR_RATE, FEATURE_COUNT, MEMORY, RESPONSE_TIME};
use crate::error::PredictorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Utilization above this counts towards the score
    pub utilization_cutoff: f64,
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub disk_weight: f64,
    pub error_rate_cutoff: f64,
    pub error_rate_weight: f64,
    pub response_time_cutoff: f64,
    pub response_time_weight: f64,
    /// Confidence when any indicator is extreme
    pub high_confidence: f64,
    /// Confidence when every indicator is clearly low
    pub calm_confidence: f64,
    pub default_confidence: f64,
    pub extreme_utilization: f64,
    pub extreme_error_rate: f64,
    pub calm_utilization: f64,
    pub calm_error_rate: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            utilization_cutoff: 0.8,
            cpu_weight: 2.0,
            memory_weight: 2.0,
            disk_weight: 1.5,
            error_rate_cutoff: 0.05,
            error_rate_weight: 5.0,
            response_time_cutoff: 1.0,
            response_time_weight: 0.5,
            high_confidence: 0.9,
            calm_confidence: 0.8,
            default_confidence: 0.5,
            extreme_utilization: 0.9,
            extreme_error_rate: 0.1,
            calm_utilization: 0.3,
            calm_error_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub probability: f64,
    pub confidence: f64,
    /// Output of the trained logistic model
    pub learned_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: FeatureVector,
    /// 1.0 for a node that failed, 0.0 otherwise
    pub label: f64,
    pub weight: f64,
    pub node_id: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    /// `1 - mean |label - output|` over the last training set
    pub accuracy: f64,
    pub trained_examples: usize,
    pub epochs: usize,
    pub last_trained: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FailureModel {
    risk: RiskWeights,
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    stats: ModelStats,
}

impl Default for FailureModel {
    fn default() -> Self {
        Self::new(RiskWeights::default())
    }
}

impl FailureModel {
    pub fn new(risk: RiskWeights) -> Self {
        let mut weights = [0.0; FEATURE_COUNT];
        for (j, w) in weights.iter_mut().enumerate() {
            *w = (j as f64).cos() * 0.01;
        }
        Self {
            risk,
            weights,
            bias: 0.0,
            stats: ModelStats::default(),
        }
    }

    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    pub fn weights(&self) -> &[f64; FEATURE_COUNT] {
        &self.weights
    }

    /// Score a feature vector
    pub fn predict(&self, features: &[f64]) -> Result<ModelOutput, PredictorError> {
        let features: &FeatureVector =
            features
                .try_into()
                .map_err(|_| PredictorError::FeatureCountMismatch {
                    expected: FEATURE_COUNT,
                    actual: features.len(),
                })?;

        let r = &self.risk;
        let cpu = features[CPU];
        let memory = features[MEMORY];
        let disk = features[DISK];
        let error_rate = features[ERROR_RATE];
        let response_time = features[RESPONSE_TIME];

        let mut score = 0.0;
        score += excess(cpu, r.utilization_cutoff) * r.cpu_weight;
        score += excess(memory, r.utilization_cutoff) * r.memory_weight;
        score += excess(disk, r.utilization_cutoff) * r.disk_weight;
        if error_rate > r.error_rate_cutoff {
            score += error_rate * r.error_rate_weight;
        }
        if response_time > r.response_time_cutoff {
            score += (response_time - r.response_time_cutoff) * r.response_time_weight;
        }
        let probability = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let extreme = cpu > r.extreme_utilization
            || memory > r.extreme_utilization
            || error_rate > r.extreme_error_rate;
        let calm = cpu < r.calm_utilization
            && memory < r.calm_utilization
            && error_rate < r.calm_error_rate;
        let confidence = if extreme {
            r.high_confidence
        } else if calm {
            r.calm_confidence
        } else {
            r.default_confidence
        };

        Ok(ModelOutput {
            probability,
            confidence,
            learned_probability: self.learned_probability(features),
        })
    }

    pub fn learned_probability(&self, features: &FeatureVector) -> f64 {
        let z = self
            .weights
            .iter()
            .zip(features.iter())
            .fold(self.bias, |acc, (w, x)| acc + w * x);
        sigmoid(z)
    }

    /// Run `epochs` passes of per-example gradient steps and refresh accuracy
    pub fn train(&mut self, examples: &[TrainingExample], epochs: usize, learning_rate: f64) {
        for _ in 0..epochs {
            for example in examples {
                let output = self.learned_probability(&example.features);
                let gradient = (example.label - output) * example.weight;
                for (w, x) in self.weights.iter_mut().zip(example.features.iter()) {
                    *w += learning_rate * gradient * x;
                }
                self.bias += learning_rate * gradient;
            }
        }

        let error: f64 = examples
            .iter()
            .map(|e| (e.label - self.learned_probability(&e.features)).abs())
            .sum();
        let accuracy = if examples.is_empty() {
            0.0
        } else {
            (1.0 - error / examples.len() as f64).clamp(0.0, 1.0)
        };

        self.stats = ModelStats {
            accuracy,
            trained_examples: examples.len(),
            epochs,
            last_trained: Some(Utc::now()),
        };
    }
}

fn excess(value: f64, cutoff: f64) -> f64 {
    (value - cutoff).max(0.0)
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(cpu: f64, memory: f64, disk: f64, error_rate: f64) -> FeatureVector {
        let mut f = [0.0; FEATURE_COUNT];
        f[CPU] = cpu;
        f[MEMORY] = memory;
        f[DISK] = disk;
        f[ERROR_RATE] = error_rate;
        f
    }

    #[test]
    fn test_predict_rejects_wrong_length() {
        let model = FailureModel::default();
        let err = model.predict(&[0.5; 3]).unwrap_err();
        assert_eq!(
            err,
            PredictorError::FeatureCountMismatch {
                expected: 15,
                actual: 3
            }
        );
        assert!(model.predict(&[0.0; 16]).is_err());
    }

    #[test]
    fn test_healthy_vector_scores_zero() {
        let model = FailureModel::default();
        let out = model.predict(&vector(0.5, 0.6, 0.4, 0.01)).unwrap();
        assert_eq!(out.probability, 0.0);
        assert_eq!(out.confidence, 0.5);
    }

    #[test]
    fn test_stressed_vector_saturates() {
        let model = FailureModel::default();
        let out = model.predict(&vector(0.95, 0.92, 0.0, 0.15)).unwrap();
        assert_eq!(out.probability, 1.0);
        assert_eq!(out.confidence, 0.9);
    }

    #[test]
    fn test_partial_excess() {
        let model = FailureModel::default();
        // (0.9 - 0.8) * 2.0 + (0.9 - 0.8) * 1.5
        let out = model.predict(&vector(0.9, 0.0, 0.9, 0.0)).unwrap();
        assert!((out.probability - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_calm_confidence() {
        let model = FailureModel::default();
        let out = model.predict(&vector(0.1, 0.2, 0.1, 0.0)).unwrap();
        assert_eq!(out.confidence, 0.8);
    }

    #[test]
    fn test_initial_weights() {
        let model = FailureModel::default();
        assert!((model.weights()[0] - 0.01).abs() < 1e-12);
        assert!((model.weights()[1] - 1f64.cos() * 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_training_moves_towards_labels() {
        let mut model = FailureModel::default();
        let now = Utc::now();
        let mut examples = Vec::new();
        for i in 0..20 {
            let failed = i % 2 == 0;
            let features = if failed {
                vector(0.95, 0.95, 0.9, 0.2)
            } else {
                vector(0.2, 0.3, 0.2, 0.0)
            };
            examples.push(TrainingExample {
                features,
                label: if failed { 1.0 } else { 0.0 },
                weight: 1.0,
                node_id: format!("n{i}"),
                time: now,
            });
        }

        let before = model.learned_probability(&vector(0.95, 0.95, 0.9, 0.2));
        model.train(&examples, 10, 0.01);
        let after = model.learned_probability(&vector(0.95, 0.95, 0.9, 0.2));

        assert!(after > before);
        let stats = model.stats();
        assert_eq!(stats.trained_examples, 20);
        assert!(stats.accuracy > 0.0 && stats.accuracy <= 1.0);
        assert!(stats.last_trained.is_some());
    }
}
