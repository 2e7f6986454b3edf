//! Fault injection

use super::experiment::FailureScenario;
use crate::store::ConcurrentStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// Trait for injecting faults into target nodes
#[async_trait]
pub trait FailureInjector: Send + Sync {
    /// Inject a scenario on one target
    async fn inject(&self, scenario: &FailureScenario, target: &str) -> Result<()>;

    /// Remove a previously injected scenario
    async fn rollback(&self, scenario: &FailureScenario, target: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Records faults without touching real infrastructure
#[derive(Default)]
pub struct SimulatedInjector {
    active: ConcurrentStore<(String, String), DateTime<Utc>>,
}

impl SimulatedInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently injected (scenario id, target) pairs
    pub fn active_faults(&self) -> Vec<(String, String)> {
        let mut faults: Vec<_> = self.active.snapshot().into_iter().map(|(k, _)| k).collect();
        faults.sort();
        faults
    }
}

#[async_trait]
impl FailureInjector for SimulatedInjector {
    async fn inject(&self, scenario: &FailureScenario, target: &str) -> Result<()> {
        self.active
            .insert((scenario.id.clone(), target.to_string()), Utc::now());
        info!(
            scenario = %scenario.scenario_type,
            target = %target,
            parameters = ?scenario.parameters,
            "Injected simulated fault"
        );
        Ok(())
    }

    async fn rollback(&self, scenario: &FailureScenario, target: &str) -> Result<()> {
        self.active
            .remove(&(scenario.id.clone(), target.to_string()));
        info!(scenario = %scenario.scenario_type, target = %target, "Removed simulated fault");
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
