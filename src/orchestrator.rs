//! The convergence loop: run suites, classify failures, patch, verify,
//! decide. `Running(n)` either converges (zero failed probes), exhausts the
//! iteration budget, or settles briefly and goes around again.

use std::collections::HashSet;

use crate::classify::classify;
use crate::config::HarnessConfig;
use crate::model::{FinalReport, FixKey, Issue, IterationRecord};
use crate::patch::{verify_fixes, PatchEngine};
use crate::suite::{Suite, SuiteRunner};

pub struct Orchestrator {
    config: HarnessConfig,
    runner: SuiteRunner,
    engine: PatchEngine,
    suites: Vec<Suite>,
}

impl Orchestrator {
    pub fn new(
        config: HarnessConfig,
        runner: SuiteRunner,
        engine: PatchEngine,
        suites: Vec<Suite>,
    ) -> Self {
        Self {
            config,
            runner,
            engine,
            suites,
        }
    }

    /// Drive the loop to a terminal state. The history list is owned here
    /// and appended to only between iterations; each record is sealed once
    /// pushed.
    pub async fn run(&self) -> FinalReport {
        let max_iterations = self.config.max_iterations;
        let mut history: Vec<IterationRecord> = Vec::new();
        // Run-global idempotency: an (artifact, action, hint) triple is
        // applied at most once across all iterations.
        let mut applied: HashSet<FixKey> = HashSet::new();

        for iteration in 1..=max_iterations {
            tracing::info!(iteration, max_iterations, "Starting iteration");

            let mut outcomes = Vec::new();
            for suite in &self.suites {
                let report = self.runner.run_suite(suite).await;
                outcomes.extend(report.outcomes);
            }

            let issues: Vec<Issue> = outcomes
                .iter()
                .filter(|o| !o.success)
                .map(classify)
                .collect();

            let fixes_applied = if self.config.autofix.enabled && !issues.is_empty() {
                self.engine.apply_fixes(&issues, &mut applied).await
            } else {
                Vec::new()
            };

            let verification = if fixes_applied.is_empty() {
                Vec::new()
            } else {
                verify_fixes(self.engine.source_dir(), &fixes_applied).await
            };

            let record = IterationRecord {
                iteration,
                outcomes,
                issues,
                fixes_applied,
                verification,
            };
            let failed = record.failed_count();
            tracing::info!(
                iteration,
                tests = record.outcomes.len(),
                failed,
                issues = record.issues.len(),
                fixes = record.fixes_applied.len(),
                "Iteration finished"
            );
            history.push(record);

            if failed == 0 {
                tracing::info!(iteration, "Converged: zero failed probes");
                break;
            }
            if iteration == max_iterations {
                tracing::warn!(max_iterations, "Iteration budget exhausted");
                break;
            }

            // Give an externally-restarted service time to come back up.
            // There is no readiness poll; the delay is the only grace.
            tokio::time::sleep(self.config.settle_delay()).await;
        }

        FinalReport::from_history(history, max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutofixConfig, HarnessConfig, PatchingConfig};
    use crate::error::Result;
    use crate::model::IssueKind;
    use crate::probe::auth::AuthBroker;
    use crate::probe::executor::{
        HttpTransport, ProbeExecutor, TransportRequest, TransportResponse,
    };
    use crate::probe::types::NamedProbe;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    /// A service whose /api/forecast/predict route "exists" only after the
    /// patch engine has written the forecast route module.
    struct HealingTransport {
        source_dir: std::path::PathBuf,
    }

    #[async_trait]
    impl HttpTransport for HealingTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            if request.url.ends_with("/api/health") {
                return Ok(TransportResponse {
                    status: 200,
                    body: Some(json!({"status": "ok"})),
                });
            }
            let patched = self.source_dir.join("routes/forecast.js").exists();
            if patched {
                Ok(TransportResponse {
                    status: 200,
                    body: Some(json!({"forecast": []})),
                })
            } else {
                Ok(TransportResponse {
                    status: 404,
                    body: Some(json!({"error": "Route not found: /api/forecast/predict"})),
                })
            }
        }
    }

    /// Permanently down.
    struct DeadTransport;

    #[async_trait]
    impl HttpTransport for DeadTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
            Err(crate::error::HarnessError::Probe(
                "connection refused".to_string(),
            ))
        }
    }

    fn config_for(dir: &Path, max_iterations: u32) -> HarnessConfig {
        let mut config: HarnessConfig = serde_json::from_str("{}").unwrap();
        config.max_iterations = max_iterations;
        config.settle_delay_ms = 0;
        config.patching = PatchingConfig {
            source_dir: dir.to_path_buf(),
            ..PatchingConfig::default()
        };
        config
    }

    fn orchestrator_with(
        transport: Arc<dyn HttpTransport>,
        config: HarnessConfig,
        probes: Vec<NamedProbe>,
    ) -> Orchestrator {
        let executor = ProbeExecutor::new(
            transport,
            "http://backend",
            "http://frontend",
            Duration::from_secs(1),
        );
        let runner = SuiteRunner::new(executor, AuthBroker::new(&config.auth));
        let engine = PatchEngine::new(&config.patching, config.autofix.clone());
        let suites = vec![Suite {
            name: "API".to_string(),
            probes,
        }];
        Orchestrator::new(config, runner, engine, suites)
    }

    fn probes() -> Vec<NamedProbe> {
        vec![
            NamedProbe::get("Health: Status", "/api/health"),
            NamedProbe::post("Forecast: Predict", "/api/forecast/predict", json!({})),
        ]
    }

    #[tokio::test]
    async fn test_converges_after_fix_heals_the_route() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("server.js"), "app.listen(5000);\n").unwrap();
        let transport = Arc::new(HealingTransport {
            source_dir: tmp.path().to_path_buf(),
        });
        let orchestrator = orchestrator_with(transport, config_for(tmp.path(), 5), probes());

        let report = orchestrator.run().await;

        assert!(report.success);
        assert_eq!(report.total_iterations, 2);
        assert!(report.total_iterations <= report.max_iterations);

        // Iteration 1: one failure, one fix, verified.
        let first = &report.history[0];
        assert_eq!(first.failed_count(), 1);
        assert_eq!(first.issues[0].kind, IssueKind::MissingRoute);
        assert_eq!(first.fixes_applied.len(), 1);
        assert!(first.verification[0].verified);

        // Iteration 2: clean.
        let second = &report.history[1];
        assert_eq!(second.failed_count(), 0);
        assert!(second.fixes_applied.is_empty());

        // Summary consistency.
        let from_history: usize = report.history.iter().map(|it| it.outcomes.len()).sum();
        assert_eq!(report.summary.total_tests, from_history);
        assert_eq!(
            report.summary.total_passed + report.summary.total_failed,
            report.summary.total_tests
        );
        assert_eq!(report.summary.total_fixes, 1);
    }

    #[tokio::test]
    async fn test_budget_of_one_exhausts_with_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator =
            orchestrator_with(Arc::new(DeadTransport), config_for(tmp.path(), 1), probes());

        let report = orchestrator.run().await;

        assert!(!report.success);
        assert_eq!(report.total_iterations, 1);
    }

    #[tokio::test]
    async fn test_connection_issues_never_produce_fixes() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator =
            orchestrator_with(Arc::new(DeadTransport), config_for(tmp.path(), 3), probes());

        let report = orchestrator.run().await;

        assert!(!report.success);
        assert_eq!(report.total_iterations, 3);
        for record in &report.history {
            // The issue persists unchanged across every iteration.
            assert!(record
                .issues
                .iter()
                .all(|i| i.kind == IssueKind::ConnectionIssue && !i.fixable));
            assert!(record.fixes_applied.is_empty());
        }
        assert_eq!(report.summary.total_fixes, 0);
    }

    #[tokio::test]
    async fn test_no_fix_flag_disables_patching() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("server.js"), "app.listen(5000);\n").unwrap();
        let transport = Arc::new(HealingTransport {
            source_dir: tmp.path().to_path_buf(),
        });
        let mut config = config_for(tmp.path(), 2);
        config.autofix = AutofixConfig {
            enabled: false,
            ..AutofixConfig::default()
        };
        let orchestrator = orchestrator_with(transport, config, probes());

        let report = orchestrator.run().await;

        assert!(!report.success);
        assert_eq!(report.summary.total_fixes, 0);
        assert!(!tmp.path().join("routes/forecast.js").exists());
    }
}
