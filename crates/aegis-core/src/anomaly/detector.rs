//! Feature-vector anomaly scoring
//!
//! Scores a normalized feature vector by how many dimensions sit at the
//! extremes of their range and how far they deviate from the midpoint.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Default anomaly threshold
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.7;

/// Default number of scores kept in the history
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Values outside this band count as extreme
const EXTREME_HIGH: f64 = 0.95;
const EXTREME_LOW: f64 = 0.05;

/// Only deviations from the midpoint larger than this contribute to the score
const DEVIATION_CUTOFF: f64 = 0.4;

/// More extreme dimensions than this always flag an anomaly
const MAX_EXTREME_DIMS: usize = 3;

/// Scale applied to the threshold when comparing the score
const SCORE_SCALE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub threshold: f64,
    pub history_size: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ANOMALY_THRESHOLD,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub score: f64,
    pub is_anomaly: bool,
    pub threshold: f64,
    pub extreme_count: usize,
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
    history: Mutex<VecDeque<f64>>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        let capacity = config.history_size.min(DEFAULT_HISTORY_SIZE);
        Self {
            config,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Score a feature vector and record the score in the history
    pub fn detect_anomaly(&self, features: &[f64]) -> AnomalyResult {
        let threshold = self.config.threshold;

        let (score, extreme_count) = if features.is_empty() {
            (0.0, 0)
        } else {
            let extreme_count = features
                .iter()
                .filter(|f| **f > EXTREME_HIGH || **f < EXTREME_LOW)
                .count();
            let deviation: f64 = features
                .iter()
                .map(|f| (f - 0.5).abs())
                .filter(|d| *d > DEVIATION_CUTOFF)
                .sum();
            (deviation / features.len() as f64, extreme_count)
        };

        let is_anomaly = score > threshold * SCORE_SCALE || extreme_count > MAX_EXTREME_DIMS;
        self.record(score);

        AnomalyResult {
            score,
            is_anomaly,
            threshold,
            extreme_count,
        }
    }

    fn record(&self, score: f64) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if self.config.history_size == 0 {
            return;
        }
        while history.len() >= self.config.history_size {
            history.pop_front();
        }
        history.push_back(score);
    }

    /// Recorded scores, oldest first
    pub fn history(&self) -> Vec<f64> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn mean_score(&self) -> f64 {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.is_empty() {
            return 0.0;
        }
        history.iter().sum::<f64>() / history.len() as f64
    }
}
