//! Experiment lifecycle tests
//!
//! These run on a paused clock so experiment durations, monitoring windows
//! and rollback timeouts elapse instantly.

#[cfg(test)]
mod framework_tests {
    use crate::chaos::{
        ChaosConfig, ChaosExperiment, ChaosFramework, ExperimentPhase, ExperimentStatus,
        FailureInjector, FailureScenario, RollbackStatus, ServiceHealth, ServiceMetricsSource,
        SimulatedInjector,
    };
    use crate::error::{ChaosError, ValidationError};
    use crate::observability::StructuredLogger;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Source returning whatever health the test last set
    struct ScriptedSource {
        health: Mutex<ServiceHealth>,
    }

    impl ScriptedSource {
        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                health: Mutex::new(ServiceHealth {
                    availability: 0.999,
                    error_rate: 0.01,
                    ..Default::default()
                }),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                health: Mutex::new(ServiceHealth {
                    availability: 0.7,
                    error_rate: 0.5,
                    ..Default::default()
                }),
            })
        }
    }

    #[async_trait]
    impl ServiceMetricsSource for ScriptedSource {
        async fn current_metrics(&self, _service: &str) -> Result<ServiceHealth> {
            Ok(*self.health.lock().unwrap())
        }
    }

    /// Injector whose rollbacks error or never finish
    struct BrokenRollback {
        hang: bool,
    }

    #[async_trait]
    impl FailureInjector for BrokenRollback {
        async fn inject(&self, _scenario: &FailureScenario, _target: &str) -> Result<()> {
            Ok(())
        }

        async fn rollback(&self, _scenario: &FailureScenario, _target: &str) -> Result<()> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(())
            } else {
                Err(anyhow!("agent unreachable"))
            }
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn framework_with(
        config: ChaosConfig,
        injector: Arc<dyn FailureInjector>,
        source: Arc<dyn ServiceMetricsSource>,
    ) -> ChaosFramework {
        ChaosFramework::new(config, injector, source, StructuredLogger::new("test"))
    }

    fn framework(source: Arc<dyn ServiceMetricsSource>) -> (ChaosFramework, Arc<SimulatedInjector>) {
        let injector = Arc::new(SimulatedInjector::new());
        let framework = framework_with(ChaosConfig::default(), injector.clone(), source);
        (framework, injector)
    }

    fn experiment(framework: &ChaosFramework, template: &str) -> ChaosExperiment {
        framework
            .create_experiment_from_template(template, "api", vec!["n1".into(), "n2".into()])
            .unwrap()
    }

    async fn wait_for_history(framework: &ChaosFramework, count: usize) {
        for _ in 0..2000 {
            if framework.history().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("experiments did not finish");
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_errors_are_distinct() {
        let (framework, _) = framework(ScriptedSource::healthy());
        let base = experiment(&framework, "network_latency");

        let mut cases: Vec<(ChaosExperiment, ValidationError)> = Vec::new();
        let mut e = base.clone();
        e.id.clear();
        cases.push((e, ValidationError::MissingId));
        let mut e = base.clone();
        e.name.clear();
        cases.push((e, ValidationError::MissingName));
        let mut e = base.clone();
        e.target_service.clear();
        cases.push((e, ValidationError::MissingTargetService));
        let mut e = base.clone();
        e.target_nodes.clear();
        cases.push((e, ValidationError::NoTargetNodes));
        let mut e = base.clone();
        e.failure_scenarios.clear();
        cases.push((e, ValidationError::NoFailureScenarios));
        let mut e = base.clone();
        e.duration = Duration::ZERO;
        cases.push((e, ValidationError::NonPositiveDuration));
        let mut e = base.clone();
        e.safety_limits = None;
        cases.push((e, ValidationError::MissingSafetyLimits));
        let mut e = base.clone();
        e.duration = Duration::from_secs(2 * 3600);
        cases.push((
            e,
            ValidationError::DurationTooLong {
                max: Duration::from_secs(3600),
            },
        ));

        for (exp, expected) in cases {
            match framework.run_experiment(exp).await {
                Err(ChaosError::Validation(actual)) => assert_eq!(actual, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
        }

        assert_eq!(framework.running_count(), 0);
        assert!(framework.history().await.is_empty());
        assert!(framework.run_experiment(base).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_template() {
        let (framework, _) = framework(ScriptedSource::healthy());
        let err = framework
            .create_experiment_from_template("disk_fill", "api", vec!["n1".into()])
            .unwrap_err();
        assert!(matches!(err, ChaosError::UnknownTemplate(t) if t == "disk_fill"));
        assert_eq!(framework.templates().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_experiment_completes() {
        let (framework, injector) = framework(ScriptedSource::healthy());
        let exp = experiment(&framework, "network_latency");
        let id = exp.id.clone();
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Created));

        let started = framework.run_experiment(exp).await.unwrap();
        assert_eq!(started.status, ExperimentStatus::Started);
        assert_eq!(framework.running_count(), 1);

        wait_for_history(&framework, 1).await;
        let history = framework.history().await;
        let result = &history[0];
        assert_eq!(result.experiment_id, id);
        assert_eq!(result.status, ExperimentStatus::Completed);
        assert_eq!(result.rollback, RollbackStatus::NotRequired);
        assert!(result.ended_at.is_some());
        assert!(result.duration >= Duration::from_secs(300));
        assert!(result.metrics.samples >= 9);
        assert!(result.safety_violations.is_empty());

        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Completed));
        assert_eq!(framework.running_count(), 0);
        assert!(injector.active_faults().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_scenarios_removed_while_running() {
        let (framework, injector) = framework(ScriptedSource::healthy());
        // 5 minute scenario inside a 10 minute experiment
        let exp = experiment(&framework, "node_failure");
        let id = exp.id.clone();
        framework.run_experiment(exp).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(injector.active_faults().len(), 2);

        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Running));
        assert!(injector.active_faults().is_empty());

        wait_for_history(&framework, 1).await;
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit() {
        let (framework, _) = framework(ScriptedSource::healthy());
        for _ in 0..3 {
            framework
                .run_experiment(experiment(&framework, "service_restart"))
                .await
                .unwrap();
        }
        assert_eq!(framework.running_count(), 3);

        let err = framework
            .run_experiment(experiment(&framework, "service_restart"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::ConcurrencyLimitExceeded { max: 3 }));

        wait_for_history(&framework, 3).await;
        assert_eq!(framework.running_count(), 0);
        assert!(framework
            .run_experiment(experiment(&framework, "service_restart"))
            .await
            .is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_launches_respect_limit() {
        let (framework, _) = framework(ScriptedSource::healthy());
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let mut launches = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let framework = framework.clone();
            let barrier = barrier.clone();
            let exp = experiment(&framework, "service_restart");
            launches.spawn(async move {
                barrier.wait().await;
                framework.run_experiment(exp).await
            });
        }

        let mut admitted = 0;
        while let Some(outcome) = launches.join_next().await {
            match outcome.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(matches!(e, ChaosError::ConcurrencyLimitExceeded { max: 3 })),
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(framework.running_count(), 3);

        framework.shutdown().await;
        assert_eq!(framework.history().await.len(), 3);
        assert_eq!(framework.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_id_cannot_run_twice_at_once() {
        let (framework, _) = framework(ScriptedSource::healthy());
        let exp = experiment(&framework, "network_latency");
        let id = exp.id.clone();
        framework.run_experiment(exp.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let err = framework.run_experiment(exp.clone()).await.unwrap_err();
        assert!(matches!(err, ChaosError::AlreadyRunning(ref dup) if *dup == id));
        assert_eq!(framework.running_count(), 1);

        wait_for_history(&framework, 1).await;
        let first = framework.history().await.remove(0);
        assert_eq!(first.status, ExperimentStatus::Completed);
        assert!(first.abort_reason.is_none());
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Completed));

        // A finished id can be run again
        framework.run_experiment(exp).await.unwrap();
        wait_for_history(&framework, 2).await;
        let second = framework.history().await.remove(1);
        assert_eq!(second.status, ExperimentStatus::Completed);
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_violation_aborts_and_rolls_back() {
        let (framework, injector) = framework(ScriptedSource::failing());
        let exp = experiment(&framework, "network_latency");
        let id = exp.id.clone();
        framework.run_experiment(exp).await.unwrap();

        wait_for_history(&framework, 1).await;
        let result = framework.history().await.remove(0);
        assert_eq!(result.status, ExperimentStatus::Aborted);
        assert_eq!(result.rollback, RollbackStatus::Succeeded);
        assert_eq!(result.abort_reason.as_deref(), Some("safety limits exceeded"));
        assert!(!result.safety_violations.is_empty());
        // aborted on the first 30s poll
        assert!(result.duration < Duration::from_secs(60));

        assert_eq!(framework.phase(&id), Some(ExperimentPhase::RolledBack));
        assert!(injector.active_faults().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rollback_is_reported() {
        let framework = framework_with(
            ChaosConfig::default(),
            Arc::new(BrokenRollback { hang: false }),
            ScriptedSource::failing(),
        );
        let exp = experiment(&framework, "memory_pressure");
        let id = exp.id.clone();
        framework.run_experiment(exp).await.unwrap();

        wait_for_history(&framework, 1).await;
        let result = framework.history().await.remove(0);
        assert_eq!(result.status, ExperimentStatus::Aborted);
        assert!(result.rollback_failed());
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Aborted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_timeout() {
        let framework = framework_with(
            ChaosConfig::default(),
            Arc::new(BrokenRollback { hang: true }),
            ScriptedSource::failing(),
        );
        let exp = experiment(&framework, "network_latency");
        let id = exp.id.clone();
        framework.run_experiment(exp).await.unwrap();

        wait_for_history(&framework, 1).await;
        let result = framework.history().await.remove(0);
        assert_eq!(result.rollback, RollbackStatus::Failed);
        // first poll at 30s plus the 60s rollback budget
        assert!(result.duration >= Duration::from_secs(90));
        assert!(result.duration < Duration::from_secs(600));
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::Aborted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_experiment() {
        let (framework, injector) = framework(ScriptedSource::healthy());
        let exp = experiment(&framework, "node_failure");
        let id = exp.id.clone();
        framework.run_experiment(exp).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        framework.cancel_experiment(&id).unwrap();
        wait_for_history(&framework, 1).await;

        let result = framework.history().await.remove(0);
        assert_eq!(result.status, ExperimentStatus::Aborted);
        assert_eq!(result.abort_reason.as_deref(), Some("cancelled"));
        assert_eq!(result.rollback, RollbackStatus::Succeeded);
        assert_eq!(framework.phase(&id), Some(ExperimentPhase::RolledBack));
        assert!(injector.active_faults().is_empty());

        assert!(matches!(
            framework.cancel_experiment(&id),
            Err(ChaosError::ExperimentNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running() {
        let (framework, injector) = framework(ScriptedSource::healthy());
        framework
            .run_experiment(experiment(&framework, "node_failure"))
            .await
            .unwrap();
        framework
            .run_experiment(experiment(&framework, "memory_pressure"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        framework.shutdown().await;

        let history = framework.history().await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.status == ExperimentStatus::Aborted));
        assert_eq!(framework.running_count(), 0);
        assert!(injector.active_faults().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilience_score() {
        let source = ScriptedSource::healthy();
        let (framework, _) = framework(source.clone());
        assert_eq!(framework.resilience_score().await, 1.0);

        framework
            .run_experiment(experiment(&framework, "service_restart"))
            .await
            .unwrap();
        wait_for_history(&framework, 1).await;

        let first = framework.resilience_score().await;
        let second = framework.resilience_score().await;
        assert_eq!(first, second);
        // 0.4 * 0.999 + 0.3 * 0.99 + 0.3 * 1.0
        assert!((first - 0.9966).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilience_gate() {
        let framework = framework_with(
            ChaosConfig {
                min_resilience_score: 0.9,
                ..Default::default()
            },
            Arc::new(SimulatedInjector::new()),
            ScriptedSource::failing(),
        );

        framework
            .run_experiment(experiment(&framework, "service_restart"))
            .await
            .unwrap();
        wait_for_history(&framework, 1).await;

        let err = framework
            .run_experiment(experiment(&framework, "service_restart"))
            .await
            .unwrap_err();
        match err {
            ChaosError::ResilienceTooLow { score, required } => {
                assert!(score < 0.9);
                assert_eq!(required, 0.9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
