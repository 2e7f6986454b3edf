//! Anomaly detection over normalized feature vectors

mod detector;

pub use detector::{
    AnomalyConfig, AnomalyDetector, AnomalyResult, DEFAULT_ANOMALY_THRESHOLD,
    DEFAULT_HISTORY_SIZE,
};
