//! Predefined experiment templates

use super::experiment::{
    ChaosExperiment, ExperimentType, FailureScenario, SafetyLimits, ScenarioType,
};
use crate::models::Severity;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rollback budget shared by every template
pub const TEMPLATE_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(60);

pub const SUCCESS_CRITERIA: [&str; 3] = [
    "System recovers within safety limits",
    "No data loss",
    "Service availability > 99%",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub experiment_type: ExperimentType,
    pub scenarios: Vec<FailureScenario>,
    #[serde(rename = "default_duration_secs", with = "crate::models::serde_secs")]
    pub default_duration: Duration,
    pub safety_limits: SafetyLimits,
}

impl ExperimentTemplate {
    /// Build a runnable experiment against the given targets
    pub fn instantiate(&self, target_service: &str, target_nodes: Vec<String>) -> ChaosExperiment {
        ChaosExperiment {
            id: format!("exp-{}-{}", self.id, uuid::Uuid::new_v4()),
            name: self.name.clone(),
            experiment_type: self.experiment_type,
            description: self.description.clone(),
            target_service: target_service.to_string(),
            target_nodes,
            failure_scenarios: self.scenarios.clone(),
            duration: self.default_duration,
            safety_limits: Some(self.safety_limits.clone()),
            success_criteria: SUCCESS_CRITERIA.iter().map(|c| c.to_string()).collect(),
            hypothesis: format!(
                "System should remain resilient when {}",
                self.description.to_lowercase()
            ),
            created_at: Utc::now(),
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn limits(
    max_error_rate: f64,
    max_latency_increase: f64,
    max_throughput_drop: Option<f64>,
    max_resource_usage: Option<f64>,
    monitoring_window: Duration,
) -> SafetyLimits {
    SafetyLimits {
        max_error_rate,
        max_latency_increase,
        max_throughput_drop,
        max_resource_usage,
        monitoring_window,
        rollback_timeout: TEMPLATE_ROLLBACK_TIMEOUT,
    }
}

pub fn default_templates() -> Vec<ExperimentTemplate> {
    vec![
        ExperimentTemplate {
            id: "node_failure".to_string(),
            name: "Node Failure".to_string(),
            description: "Simulate complete node failure".to_string(),
            experiment_type: ExperimentType::Infrastructure,
            scenarios: vec![FailureScenario::new(
                "node_shutdown",
                "Node Shutdown",
                ScenarioType::NodeShutdown,
                secs(5 * 60),
                Severity::High,
            )
            .with_parameter("mode", "shutdown")],
            default_duration: secs(10 * 60),
            safety_limits: limits(0.1, 2.0, Some(0.5), None, secs(60)),
        },
        ExperimentTemplate {
            id: "network_latency".to_string(),
            name: "Network Latency".to_string(),
            description: "Inject network latency".to_string(),
            experiment_type: ExperimentType::Network,
            scenarios: vec![FailureScenario::new(
                "latency_injection",
                "Latency Injection",
                ScenarioType::LatencyInjection,
                secs(3 * 60),
                Severity::Medium,
            )
            .with_parameter("delay_ms", 100)
            .with_parameter("jitter_ms", 10)],
            default_duration: secs(5 * 60),
            safety_limits: limits(0.05, 3.0, Some(0.3), None, secs(30)),
        },
        ExperimentTemplate {
            id: "memory_pressure".to_string(),
            name: "Memory Pressure".to_string(),
            description: "Create memory pressure on target nodes".to_string(),
            experiment_type: ExperimentType::Resource,
            scenarios: vec![FailureScenario::new(
                "memory_stress",
                "Memory Stress",
                ScenarioType::MemoryStress,
                secs(5 * 60),
                Severity::Medium,
            )
            .with_parameter("memory_percent", 80)],
            default_duration: secs(8 * 60),
            safety_limits: limits(0.08, 2.5, None, Some(0.9), secs(30)),
        },
        ExperimentTemplate {
            id: "service_restart".to_string(),
            name: "Service Restart".to_string(),
            description: "Randomly restart services".to_string(),
            experiment_type: ExperimentType::Service,
            scenarios: vec![FailureScenario::new(
                "random_restart",
                "Random Restart",
                ScenarioType::RandomRestart,
                secs(2 * 60),
                Severity::Low,
            )
            .with_parameter("grace_period_s", 30)],
            default_duration: secs(5 * 60),
            safety_limits: limits(0.05, 1.5, Some(0.2), None, secs(30)),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::experiment::validate_experiment;

    #[test]
    fn test_templates_are_valid() {
        for template in default_templates() {
            let exp = template.instantiate("api", vec!["n1".to_string()]);
            assert!(
                validate_experiment(&exp, Duration::from_secs(3600)).is_ok(),
                "{} should validate",
                template.id
            );
            assert!(exp.id.starts_with(&format!("exp-{}-", template.id)));
            assert_eq!(exp.success_criteria.len(), 3);
            assert_eq!(
                exp.safety_limits.as_ref().map(|l| l.rollback_timeout),
                Some(TEMPLATE_ROLLBACK_TIMEOUT)
            );
        }
    }

    #[test]
    fn test_network_latency_template() {
        let templates = default_templates();
        let t = templates.iter().find(|t| t.id == "network_latency").unwrap();
        assert_eq!(t.default_duration, Duration::from_secs(300));
        let scenario = &t.scenarios[0];
        assert_eq!(scenario.scenario_type, ScenarioType::LatencyInjection);
        assert_eq!(scenario.parameters["delay_ms"], 100);
        assert_eq!(scenario.parameters["jitter_ms"], 10);
        assert_eq!(t.safety_limits.monitoring_window, Duration::from_secs(30));
    }

    #[test]
    fn test_hypothesis_and_unique_ids() {
        let templates = default_templates();
        let t = &templates[0];
        let a = t.instantiate("api", vec!["n1".to_string()]);
        let b = t.instantiate("api", vec!["n1".to_string()]);
        assert_ne!(a.id, b.id);
        assert_eq!(
            a.hypothesis,
            "System should remain resilient when simulate complete node failure"
        );
    }
}
