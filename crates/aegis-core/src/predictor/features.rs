//! Feature extraction for failure prediction
//!
//! Maps a node's latest metric values onto a fixed-length vector of 15
//! normalized features:
//! - resource utilization: cpu, memory, disk, network
//! - performance: response time, error rate, throughput
//! - system health: load average, connections, queue depth
//! - trends: cpu, memory, error rate
//! - time: hour of day, day of week
//!
//! Missing metrics default to 0.0.

use crate::models::names;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::HashMap;

/// Number of features the failure model expects
pub const FEATURE_COUNT: usize = 15;

pub type FeatureVector = [f64; FEATURE_COUNT];

pub const CPU: usize = 0;
pub const MEMORY: usize = 1;
pub const DISK: usize = 2;
pub const NETWORK: usize = 3;
pub const RESPONSE_TIME: usize = 4;
pub const ERROR_RATE: usize = 5;
pub const THROUGHPUT: usize = 6;
pub const LOAD_AVERAGE: usize = 7;
pub const CONNECTIONS: usize = 8;
pub const QUEUE_DEPTH: usize = 9;
pub const CPU_TREND: usize = 10;
pub const MEMORY_TREND: usize = 11;
pub const ERROR_TREND: usize = 12;
pub const HOUR_OF_DAY: usize = 13;
pub const DAY_OF_WEEK: usize = 14;

/// Scale divisors for unbounded metrics
const THROUGHPUT_SCALE: f64 = 1000.0;
const LOAD_SCALE: f64 = 10.0;
const CONNECTION_SCALE: f64 = 1000.0;
const QUEUE_SCALE: f64 = 100.0;

/// Build the feature vector for a node at a given instant.
///
/// Deterministic for a fixed `metrics` map and `at`.
pub fn extract_features(
    _node_id: &str,
    metrics: &HashMap<String, f64>,
    at: DateTime<Utc>,
) -> FeatureVector {
    let get = |name: &str| sanitize(metrics.get(name).copied().unwrap_or(0.0));

    let mut features = [0.0; FEATURE_COUNT];
    features[CPU] = normalize_ratio(get(names::CPU_UTILIZATION));
    features[MEMORY] = normalize_ratio(get(names::MEMORY_UTILIZATION));
    features[DISK] = normalize_ratio(get(names::DISK_UTILIZATION));
    features[NETWORK] = normalize_ratio(get(names::NETWORK_UTILIZATION));

    features[RESPONSE_TIME] = normalize_ratio(get(names::RESPONSE_TIME));
    features[ERROR_RATE] = normalize_ratio(get(names::ERROR_RATE));
    features[THROUGHPUT] = normalize_scaled(get(names::THROUGHPUT), THROUGHPUT_SCALE);

    features[LOAD_AVERAGE] = normalize_scaled(get(names::LOAD_AVERAGE), LOAD_SCALE);
    features[CONNECTIONS] = normalize_scaled(get(names::CONNECTION_COUNT), CONNECTION_SCALE);
    features[QUEUE_DEPTH] = normalize_scaled(get(names::QUEUE_DEPTH), QUEUE_SCALE);

    features[CPU_TREND] = normalize_ratio(get(names::CPU_TREND));
    features[MEMORY_TREND] = normalize_ratio(get(names::MEMORY_TREND));
    features[ERROR_TREND] = normalize_ratio(get(names::ERROR_TREND));

    features[HOUR_OF_DAY] = at.hour() as f64 / 24.0;
    // Sunday = 0
    features[DAY_OF_WEEK] = at.weekday().num_days_from_sunday() as f64 / 7.0;

    features
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Clamp a value already expressed as a ratio
fn normalize_ratio(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn normalize_scaled(v: f64, scale: f64) -> f64 {
    (v / scale).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metrics(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_extract_features_layout() {
        // 2024-06-05 was a Wednesday
        let at = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        let m = metrics(&[
            (names::CPU_UTILIZATION, 0.5),
            (names::MEMORY_UTILIZATION, 0.6),
            (names::DISK_UTILIZATION, 0.4),
            (names::RESPONSE_TIME, 2.5),
            (names::ERROR_RATE, 0.01),
            (names::THROUGHPUT, 500.0),
            (names::LOAD_AVERAGE, 25.0),
            (names::CONNECTION_COUNT, 100.0),
            (names::QUEUE_DEPTH, 10.0),
        ]);

        let f = extract_features("n1", &m, at);
        assert_eq!(f.len(), FEATURE_COUNT);
        assert_eq!(f[CPU], 0.5);
        assert_eq!(f[MEMORY], 0.6);
        assert_eq!(f[DISK], 0.4);
        assert_eq!(f[NETWORK], 0.0);
        assert_eq!(f[RESPONSE_TIME], 1.0);
        assert_eq!(f[ERROR_RATE], 0.01);
        assert_eq!(f[THROUGHPUT], 0.5);
        assert_eq!(f[LOAD_AVERAGE], 1.0);
        assert!((f[CONNECTIONS] - 0.1).abs() < 1e-12);
        assert!((f[QUEUE_DEPTH] - 0.1).abs() < 1e-12);
        assert_eq!(f[HOUR_OF_DAY], 0.5);
        assert!((f[DAY_OF_WEEK] - 3.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_metrics_default_to_zero() {
        let at = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let f = extract_features("n1", &HashMap::new(), at);
        assert!(f.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_extraction_is_deterministic_and_bounded() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
        let m = metrics(&[
            (names::CPU_UTILIZATION, 4.0),
            (names::ERROR_RATE, -1.0),
            (names::THROUGHPUT, f64::NAN),
        ]);
        let a = extract_features("n1", &m, at);
        let b = extract_features("n1", &m, at);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
