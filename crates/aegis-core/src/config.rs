//! Engine configuration
//!
//! Every section has serde defaults, so a partial document (or none at all)
//! yields a runnable engine.

use crate::alerting::AlertConfig;
use crate::chaos::ChaosConfig;
use crate::error::ConfigError;
use crate::models::serde_secs;
use crate::predictor::PredictorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_DASHBOARD_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PREDICTION_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RETRAIN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Series without a newer sample for this long are treated as departed
pub const DEFAULT_MAX_SAMPLE_AGE: Duration = Duration::from_secs(5 * 60);

/// Periods of the engine's background loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(rename = "collection_interval_secs", with = "serde_secs")]
    pub collection_interval: Duration,
    #[serde(rename = "evaluation_interval_secs", with = "serde_secs")]
    pub evaluation_interval: Duration,
    #[serde(rename = "dashboard_refresh_interval_secs", with = "serde_secs")]
    pub dashboard_refresh_interval: Duration,
    #[serde(rename = "prediction_cleanup_interval_secs", with = "serde_secs")]
    pub prediction_cleanup_interval: Duration,
    #[serde(rename = "retrain_interval_secs", with = "serde_secs")]
    pub retrain_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
            dashboard_refresh_interval: DEFAULT_DASHBOARD_REFRESH_INTERVAL,
            prediction_cleanup_interval: DEFAULT_PREDICTION_CLEANUP_INTERVAL,
            retrain_interval: DEFAULT_RETRAIN_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Reject loop periods the runtime cannot tick at
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("collection_interval_secs", self.collection_interval),
            ("evaluation_interval_secs", self.evaluation_interval),
            ("dashboard_refresh_interval_secs", self.dashboard_refresh_interval),
            ("prediction_cleanup_interval_secs", self.prediction_cleanup_interval),
            ("retrain_interval_secs", self.retrain_interval),
        ];
        match periods.into_iter().find(|(_, period)| period.is_zero()) {
            Some((field, _)) => Err(ConfigError::ZeroDuration { field }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name attached to structured log events
    pub instance: String,
    /// Turn fresh failure predictions into alerts
    pub predictive_alerts: bool,
    #[serde(rename = "max_sample_age_secs", with = "serde_secs")]
    pub max_sample_age: Duration,
    pub alerting: AlertConfig,
    pub predictor: PredictorConfig,
    pub chaos: ChaosConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance: "aegis".to_string(),
            predictive_alerts: true,
            max_sample_age: DEFAULT_MAX_SAMPLE_AGE,
            alerting: AlertConfig::default(),
            predictor: PredictorConfig::default(),
            chaos: ChaosConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sample_age.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "max_sample_age_secs",
            });
        }
        self.scheduler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "instance": "edge-1",
                "scheduler": { "evaluation_interval_secs": 5 },
                "chaos": { "max_concurrent_experiments": 1 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.instance, "edge-1");
        assert!(config.predictive_alerts);
        assert_eq!(config.scheduler.evaluation_interval, Duration::from_secs(5));
        assert_eq!(
            config.scheduler.collection_interval,
            DEFAULT_COLLECTION_INTERVAL
        );
        assert_eq!(config.chaos.max_concurrent_experiments, 1);
        assert_eq!(config.predictor.min_training_examples, 10);
        assert_eq!(config.alerting.max_active_alerts, 1000);
    }

    #[test]
    fn test_empty_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.instance, "aegis");
        assert_eq!(config.max_sample_age, DEFAULT_MAX_SAMPLE_AGE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "scheduler": { "evaluation_interval_secs": 0 } }"#).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration {
                field: "evaluation_interval_secs"
            })
        );

        let config: EngineConfig =
            serde_json::from_str(r#"{ "max_sample_age_secs": 0 }"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_interval_is_a_parse_error() {
        for doc in [
            r#"{ "scheduler": { "evaluation_interval_secs": 1e30 } }"#,
            r#"{ "scheduler": { "retrain_interval_secs": -1 } }"#,
        ] {
            assert!(serde_json::from_str::<EngineConfig>(doc).is_err(), "accepted {doc}");
        }
    }
}
