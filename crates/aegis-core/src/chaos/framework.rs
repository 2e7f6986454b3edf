//! Chaos experiment runner
//!
//! Experiments run on their own task once admitted. Admission validates the
//! experiment, checks the resilience gate and reserves a slot under the
//! concurrency limit. While running, the target service is polled every
//! monitoring window and the experiment aborts on the first safety
//! violation. Aborted experiments roll back their faults within the
//! template's rollback timeout.

use super::experiment::{
    validate_experiment, ChaosExperiment, ExperimentPhase, ExperimentResult, ExperimentStatus,
    FailureScenario, RollbackStatus, SafetyLimits,
};
use super::injector::FailureInjector;
use super::resilience::resilience_score;
use super::source::ServiceMetricsSource;
use super::templates::{default_templates, ExperimentTemplate};
use crate::error::{ChaosError, ValidationError};
use crate::models::serde_secs;
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::ConcurrentStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_CONCURRENT_EXPERIMENTS: usize = 3;

pub const DEFAULT_MAX_EXPERIMENT_DURATION: Duration = Duration::from_secs(60 * 60);

/// Lower bound on the safety polling period
const MIN_MONITORING_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub max_concurrent_experiments: usize,
    /// Refuse new experiments while the resilience score is below this; 0 disables
    pub min_resilience_score: f64,
    #[serde(rename = "max_experiment_duration_secs", with = "serde_secs")]
    pub max_experiment_duration: Duration,
    pub max_history: usize,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            max_concurrent_experiments: DEFAULT_MAX_CONCURRENT_EXPERIMENTS,
            min_resilience_score: 0.0,
            max_experiment_duration: DEFAULT_MAX_EXPERIMENT_DURATION,
            max_history: 1000,
        }
    }
}

struct ActiveFault {
    scenario: FailureScenario,
    target: String,
    expires_at: Instant,
}

struct FrameworkInner {
    config: ChaosConfig,
    injector: Arc<dyn FailureInjector>,
    source: Arc<dyn ServiceMetricsSource>,
    templates: HashMap<String, ExperimentTemplate>,
    running: Mutex<usize>,
    phases: ConcurrentStore<String, ExperimentPhase>,
    cancels: ConcurrentStore<String, Arc<watch::Sender<bool>>>,
    history: RwLock<Vec<ExperimentResult>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

/// Releases a concurrency slot when the experiment task ends
struct RunningGuard {
    inner: Arc<FrameworkInner>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *running = running.saturating_sub(1);
        self.inner.metrics.set_running_experiments(*running);
    }
}

#[derive(Clone)]
pub struct ChaosFramework {
    inner: Arc<FrameworkInner>,
}

impl ChaosFramework {
    pub fn new(
        config: ChaosConfig,
        injector: Arc<dyn FailureInjector>,
        source: Arc<dyn ServiceMetricsSource>,
        logger: StructuredLogger,
    ) -> Self {
        let templates = default_templates()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        info!(
            injector = injector.name(),
            max_concurrent = config.max_concurrent_experiments,
            "Chaos framework initialized"
        );
        Self {
            inner: Arc::new(FrameworkInner {
                config,
                injector,
                source,
                templates,
                running: Mutex::new(0),
                phases: ConcurrentStore::new(),
                cancels: ConcurrentStore::new(),
                history: RwLock::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
                metrics: EngineMetrics::new(),
                logger,
            }),
        }
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.inner.config
    }

    pub fn templates(&self) -> Vec<ExperimentTemplate> {
        let mut templates: Vec<_> = self.inner.templates.values().cloned().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    pub fn create_experiment_from_template(
        &self,
        template_id: &str,
        target_service: &str,
        target_nodes: Vec<String>,
    ) -> Result<ChaosExperiment, ChaosError> {
        let template = self
            .inner
            .templates
            .get(template_id)
            .ok_or_else(|| ChaosError::UnknownTemplate(template_id.to_string()))?;
        let experiment = template.instantiate(target_service, target_nodes);
        self.inner
            .phases
            .insert(experiment.id.clone(), ExperimentPhase::Created);
        Ok(experiment)
    }

    /// Admit an experiment and start it in the background
    ///
    /// The returned result has status `started`; the final record lands in
    /// [`history`](Self::history) once the experiment ends.
    pub async fn run_experiment(
        &self,
        experiment: ChaosExperiment,
    ) -> Result<ExperimentResult, ChaosError> {
        validate_experiment(&experiment, self.inner.config.max_experiment_duration)?;
        let Some(limits) = experiment.safety_limits.clone() else {
            return Err(ValidationError::MissingSafetyLimits.into());
        };

        let required = self.inner.config.min_resilience_score;
        if required > 0.0 {
            let score = self.resilience_score().await;
            if score < required {
                return Err(ChaosError::ResilienceTooLow { score, required });
            }
        }

        let id = experiment.id.clone();
        let (guard, cancel_rx) = self.acquire_slot(&id)?;

        let started_at = Utc::now();
        self.inner.phases.insert(id.clone(), ExperimentPhase::Started);

        self.inner.metrics.inc_experiments("started");
        self.inner.logger.log_experiment_started(
            &id,
            &experiment.target_service,
            experiment.target_nodes.len(),
        );

        let result = ExperimentResult::started(id, started_at);
        let inner = self.inner.clone();
        let initial = result.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            inner.execute(experiment, limits, initial, cancel_rx).await;
        });

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);

        Ok(result)
    }

    /// Reserve a concurrency slot and the cancel channel for `id`.
    ///
    /// Both happen under the running-count lock, so an id can only be in
    /// flight once.
    fn acquire_slot(
        &self,
        id: &str,
    ) -> Result<(RunningGuard, watch::Receiver<bool>), ChaosError> {
        let max = self.inner.config.max_concurrent_experiments;
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.cancels.contains_key(&id.to_string()) {
            return Err(ChaosError::AlreadyRunning(id.to_string()));
        }
        if *running >= max {
            return Err(ChaosError::ConcurrencyLimitExceeded { max });
        }
        *running += 1;
        self.inner.metrics.set_running_experiments(*running);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inner.cancels.insert(id.to_string(), Arc::new(cancel_tx));
        Ok((
            RunningGuard {
                inner: self.inner.clone(),
            },
            cancel_rx,
        ))
    }

    /// Abort a running experiment and roll back its faults
    pub fn cancel_experiment(&self, experiment_id: &str) -> Result<(), ChaosError> {
        let sender = self
            .inner
            .cancels
            .get(&experiment_id.to_string())
            .ok_or_else(|| ChaosError::ExperimentNotFound(experiment_id.to_string()))?;
        info!(experiment_id = %experiment_id, "Cancelling chaos experiment");
        sender.send_replace(true);
        Ok(())
    }

    /// Cancel every running experiment and wait for their rollbacks
    pub async fn shutdown(&self) {
        let cancels = self.inner.cancels.values();
        if !cancels.is_empty() {
            info!(running = cancels.len(), "Shutting down chaos framework");
        }
        for sender in cancels {
            sender.send_replace(true);
        }

        let handles: Vec<_> = {
            let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Chaos experiment task ended abnormally");
            }
        }
    }

    pub async fn history(&self) -> Vec<ExperimentResult> {
        self.inner.history.read().await.clone()
    }

    pub fn phase(&self, experiment_id: &str) -> Option<ExperimentPhase> {
        self.inner.phases.get(&experiment_id.to_string())
    }

    pub fn running_count(&self) -> usize {
        *self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn resilience_score(&self) -> f64 {
        resilience_score(&self.inner.history.read().await)
    }
}

impl FrameworkInner {
    fn transition(&self, experiment_id: &str, next: ExperimentPhase) {
        let key = experiment_id.to_string();
        let applied = self.phases.upsert(
            key,
            || next,
            |phase| {
                if phase.can_transition_to(next) {
                    *phase = next;
                    true
                } else {
                    false
                }
            },
        );
        if !applied {
            debug!(experiment_id = %experiment_id, phase = ?next, "Ignoring invalid phase transition");
        }
    }

    async fn execute(
        self: Arc<Self>,
        experiment: ChaosExperiment,
        limits: SafetyLimits,
        mut result: ExperimentResult,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let start = Instant::now();
        let id = experiment.id.clone();

        self.source.reset_baseline(&experiment.target_service);
        self.transition(&id, ExperimentPhase::Running);
        result.status = ExperimentStatus::Running;

        let mut faults = Vec::new();
        let mut abort_reason = None;
        'inject: for scenario in &experiment.failure_scenarios {
            for target in &experiment.target_nodes {
                match self.injector.inject(scenario, target).await {
                    Ok(()) => faults.push(ActiveFault {
                        scenario: scenario.clone(),
                        target: target.clone(),
                        expires_at: Instant::now() + scenario.duration,
                    }),
                    Err(e) => {
                        warn!(
                            experiment_id = %id,
                            scenario = %scenario.id,
                            target = %target,
                            error = %e,
                            "Fault injection failed"
                        );
                        abort_reason = Some(format!(
                            "failed to inject {} on {}: {}",
                            scenario.id, target, e
                        ));
                        break 'inject;
                    }
                }
            }
        }

        if abort_reason.is_none() {
            abort_reason = self
                .monitor(&experiment, &limits, &mut result, &mut faults, &mut cancel_rx, start)
                .await;
        }

        let rolled_back = self.remove_faults(&id, faults, limits.rollback_timeout).await;
        match abort_reason {
            None => {
                result.status = ExperimentStatus::Completed;
                result.rollback = if rolled_back {
                    RollbackStatus::NotRequired
                } else {
                    self.metrics.inc_experiments("rollback_failed");
                    RollbackStatus::Failed
                };
                self.transition(&id, ExperimentPhase::Completed);
                self.metrics.inc_experiments("completed");
            }
            Some(reason) => {
                result.status = ExperimentStatus::Aborted;
                result.abort_reason = Some(reason);
                self.transition(&id, ExperimentPhase::Aborted);
                if rolled_back {
                    result.rollback = RollbackStatus::Succeeded;
                    self.transition(&id, ExperimentPhase::RolledBack);
                } else {
                    result.rollback = RollbackStatus::Failed;
                    self.metrics.inc_experiments("rollback_failed");
                }
                self.metrics.inc_experiments("aborted");
            }
        }

        result.ended_at = Some(Utc::now());
        result.duration = start.elapsed();
        self.cancels.remove(&id);
        self.logger.log_experiment_finished(&result);
        self.record(result).await;
    }

    /// Poll the target service until the experiment ends; returns the abort reason
    async fn monitor(
        &self,
        experiment: &ChaosExperiment,
        limits: &SafetyLimits,
        result: &mut ExperimentResult,
        faults: &mut Vec<ActiveFault>,
        cancel_rx: &mut watch::Receiver<bool>,
        start: Instant,
    ) -> Option<String> {
        let deadline = tokio::time::sleep_until(start + experiment.duration);
        tokio::pin!(deadline);

        let window = limits.monitoring_window.max(MIN_MONITORING_WINDOW);
        let mut ticker = tokio::time::interval_at(start + window, window);

        loop {
            tokio::select! {
                _ = &mut deadline => return None,
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        return Some("cancelled".to_string());
                    }
                }
                _ = ticker.tick() => {
                    match self.source.current_metrics(&experiment.target_service).await {
                        Ok(health) => {
                            result.metrics.record(&health);
                            let violations = limits.violations(&health);
                            if !violations.is_empty() {
                                warn!(
                                    experiment_id = %experiment.id,
                                    violations = ?violations,
                                    "Safety limits exceeded, aborting experiment"
                                );
                                result.safety_violations.extend(violations);
                                return Some("safety limits exceeded".to_string());
                            }
                        }
                        Err(e) => debug!(
                            experiment_id = %experiment.id,
                            error = %e,
                            "Service metrics unavailable"
                        ),
                    }
                    self.expire_faults(&experiment.id, faults).await;
                }
            }
        }
    }

    /// Remove faults whose scenario duration has elapsed
    async fn expire_faults(&self, experiment_id: &str, faults: &mut Vec<ActiveFault>) {
        let now = Instant::now();
        let (expired, active): (Vec<_>, Vec<_>) = std::mem::take(faults)
            .into_iter()
            .partition(|f| f.expires_at <= now);
        *faults = active;
        for fault in expired {
            match self.injector.rollback(&fault.scenario, &fault.target).await {
                Ok(()) => debug!(
                    experiment_id = %experiment_id,
                    scenario = %fault.scenario.id,
                    target = %fault.target,
                    "Scenario finished"
                ),
                Err(e) => {
                    warn!(experiment_id = %experiment_id, error = %e, "Failed to remove expired fault");
                    faults.push(fault);
                }
            }
        }
    }

    /// Roll back all remaining faults within `timeout`
    async fn remove_faults(
        &self,
        experiment_id: &str,
        faults: Vec<ActiveFault>,
        timeout: Duration,
    ) -> bool {
        if faults.is_empty() {
            return true;
        }
        let rollback = async {
            let mut ok = true;
            for fault in &faults {
                if let Err(e) = self.injector.rollback(&fault.scenario, &fault.target).await {
                    error!(
                        experiment_id = %experiment_id,
                        scenario = %fault.scenario.id,
                        target = %fault.target,
                        error = %e,
                        "Fault rollback failed"
                    );
                    ok = false;
                }
            }
            ok
        };
        match tokio::time::timeout(timeout, rollback).await {
            Ok(ok) => ok,
            Err(_) => {
                error!(
                    experiment_id = %experiment_id,
                    timeout_secs = timeout.as_secs_f64(),
                    "Fault rollback timed out"
                );
                false
            }
        }
    }

    async fn record(&self, result: ExperimentResult) {
        let mut history = self.history.write().await;
        history.push(result);
        if history.len() > self.config.max_history {
            let excess = history.len() - self.config.max_history;
            history.drain(..excess);
        }
        self.metrics.set_resilience_score(resilience_score(&history));
    }
}
