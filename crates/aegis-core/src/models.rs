//! Core data models shared by the alerting, prediction and chaos components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Label carrying the node a sample was taken on
pub const NODE_ID_LABEL: &str = "node_id";

/// Label carrying the service a sample belongs to
pub const SERVICE_LABEL: &str = "service";

/// Node id used when a sample carries no `node_id` label
pub const UNKNOWN_NODE: &str = "unknown";

/// Well-known metric names
pub mod names {
    pub const CPU_UTILIZATION: &str = "cpu_utilization";
    pub const MEMORY_UTILIZATION: &str = "memory_utilization";
    pub const DISK_UTILIZATION: &str = "disk_utilization";
    pub const NETWORK_UTILIZATION: &str = "network_utilization";
    pub const RESPONSE_TIME: &str = "response_time";
    pub const ERROR_RATE: &str = "error_rate";
    pub const THROUGHPUT: &str = "throughput";
    pub const LOAD_AVERAGE: &str = "load_average";
    pub const CONNECTION_COUNT: &str = "connection_count";
    pub const QUEUE_DEPTH: &str = "queue_depth";
    pub const CPU_TREND: &str = "cpu_trend";
    pub const MEMORY_TREND: &str = "memory_trend";
    pub const ERROR_TREND: &str = "error_trend";
    pub const AVAILABILITY: &str = "availability";
    pub const LATENCY: &str = "latency";
    pub const FAILURE_PROBABILITY: &str = "failure_probability";
}

/// A single labeled telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: Utc::now(),
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_node(self, node_id: impl Into<String>) -> Self {
        self.with_label(NODE_ID_LABEL, node_id)
    }

    pub fn with_service(self, service: impl Into<String>) -> Self {
        self.with_label(SERVICE_LABEL, service)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Node the sample came from, `"unknown"` when the label is missing
    pub fn node_id(&self) -> &str {
        self.labels
            .get(NODE_ID_LABEL)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_NODE)
    }

    pub fn service(&self) -> Option<&str> {
        self.labels.get(SERVICE_LABEL).map(String::as_str)
    }
}

/// Alert and prediction severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a configured severity label, `None` for anything unrecognized
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted blast radius of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    /// Tier a metric value: above 0.9 is high, above 0.7 medium
    pub fn from_value(value: f64) -> Self {
        if value > 0.9 {
            Impact::High
        } else if value > 0.7 {
            Impact::Medium
        } else {
            Impact::Low
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
        }
    }
}

/// Serialize `std::time::Duration` as fractional seconds
pub mod serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!("invalid duration of {secs} seconds: {e}"))
        })
    }
}
