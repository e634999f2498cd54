pub mod catalog;

use std::sync::Arc;

use crate::model::Outcome;
use crate::probe::auth::AuthBroker;
use crate::probe::executor::ProbeExecutor;
use crate::probe::types::NamedProbe;

/// An ordered collection of probes, executed strictly in declaration order.
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub probes: Vec<NamedProbe>,
}

/// Every probe outcome of one suite run, in execution order.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub suite: String,
    pub outcomes: Vec<Outcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.test_name.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&Outcome> {
        self.outcomes.iter().filter(|o| !o.success).collect()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

pub struct SuiteRunner {
    executor: Arc<ProbeExecutor>,
    broker: Arc<AuthBroker>,
}

impl SuiteRunner {
    pub fn new(executor: ProbeExecutor, broker: AuthBroker) -> Self {
        Self {
            executor: Arc::new(executor),
            broker: Arc::new(broker),
        }
    }

    /// Run one suite to completion. The probe loop executes on its own task
    /// so a panic anywhere inside suite execution is caught at the join
    /// boundary and reported as a single failed outcome naming the suite;
    /// it never takes the whole run down.
    pub async fn run_suite(&self, suite: &Suite) -> SuiteReport {
        tracing::info!(suite = %suite.name, probes = suite.probes.len(), "Running suite");

        let executor = Arc::clone(&self.executor);
        let broker = Arc::clone(&self.broker);
        let owned = suite.clone();
        let outcomes = match tokio::spawn(run_probes(executor, broker, owned)).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::error!(suite = %suite.name, error = %e, "Suite execution crashed");
                vec![Outcome::failed(
                    &suite.name,
                    0,
                    format!("suite '{}' execution crashed: {e}", suite.name),
                )]
            }
        };

        let report = SuiteReport {
            suite: suite.name.clone(),
            outcomes,
        };
        tracing::info!(
            suite = %suite.name,
            passed = report.passed().len(),
            failed = report.failed().len(),
            "Suite finished"
        );
        report
    }
}

/// Probes are awaited one at a time because later probes may depend on state
/// created by earlier ones (a login probe populating the token cache, a
/// create feeding a later read). A probe failure never aborts the suite.
async fn run_probes(
    executor: Arc<ProbeExecutor>,
    broker: Arc<AuthBroker>,
    suite: Suite,
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(suite.probes.len());

    for probe in &suite.probes {
        let outcome = run_probe(&executor, &broker, probe).await;
        if outcome.success {
            tracing::debug!(test = %outcome.test_name, status = outcome.status, "Probe passed");
        } else {
            tracing::warn!(
                test = %outcome.test_name,
                status = outcome.status,
                error = outcome.error_message.as_deref().unwrap_or(""),
                "Probe failed"
            );
        }
        outcomes.push(outcome);
    }

    outcomes
}

async fn run_probe(executor: &ProbeExecutor, broker: &AuthBroker, probe: &NamedProbe) -> Outcome {
    // Auth precondition: acquire the role token before probing. A failed
    // login is this probe's failure, not the suite's.
    let token = match &probe.role {
        Some(role) => match broker.token_for(role, executor).await {
            Ok(token) => Some(token),
            Err(e) => {
                return Outcome::failed(
                    &probe.name,
                    401,
                    format!("authentication precondition failed: Unauthorized ({e})"),
                );
            }
        },
        None => None,
    };

    executor.execute(probe, token.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::error::{HarnessError, Result};
    use crate::probe::executor::{HttpTransport, TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Scripted transport: answers by path, counts calls in order.
    struct ScriptedTransport {
        calls: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", request.method, request.url));

            if request.url.ends_with("/api/auth/login") {
                return Ok(TransportResponse {
                    status: 200,
                    body: Some(json!({"token": "tok-1", "user": {"role": "clinician"}})),
                });
            }
            if request.url.ends_with("/api/down") {
                return Err(HarnessError::Probe("connection refused".to_string()));
            }
            if request.url.ends_with("/api/protected") {
                let status = if request.bearer_token.as_deref() == Some("tok-1") {
                    200
                } else {
                    401
                };
                return Ok(TransportResponse {
                    status,
                    body: Some(json!({"data": 1})),
                });
            }
            Ok(TransportResponse {
                status: 200,
                body: Some(json!({"status": "ok"})),
            })
        }
    }

    fn runner_with(transport: Arc<ScriptedTransport>) -> SuiteRunner {
        let executor = ProbeExecutor::new(
            transport,
            "http://backend",
            "http://frontend",
            Duration::from_secs(1),
        );
        let mut auth = AuthConfig::default();
        auth.login_path = "/api/auth/login".to_string();
        auth.users.insert(
            "clinician".to_string(),
            crate::config::Credentials {
                email: "nurse@example.org".to_string(),
                password: "pw".to_string(),
            },
        );
        SuiteRunner::new(executor, AuthBroker::new(&auth))
    }

    fn suite(probes: Vec<NamedProbe>) -> Suite {
        Suite {
            name: "API".to_string(),
            probes,
        }
    }

    #[tokio::test]
    async fn test_probes_run_in_declaration_order_and_failures_do_not_abort() {
        let transport = Arc::new(ScriptedTransport {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let runner = runner_with(Arc::clone(&transport));

        let report = runner
            .run_suite(&suite(vec![
                NamedProbe::get("A: Health", "/api/health"),
                NamedProbe::get("B: Down", "/api/down"),
                NamedProbe::get("C: After failure", "/api/health"),
            ]))
            .await;

        assert_eq!(report.total(), 3);
        assert_eq!(report.passed(), vec!["A: Health", "C: After failure"]);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.failed()[0].status, 0);

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].ends_with("/api/health"));
        assert!(calls[1].ends_with("/api/down"));
    }

    #[tokio::test]
    async fn test_role_probe_logs_in_once_and_reuses_token() {
        let transport = Arc::new(ScriptedTransport {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let runner = runner_with(Arc::clone(&transport));

        let report = runner
            .run_suite(&suite(vec![
                NamedProbe::get("P1", "/api/protected").as_role("clinician"),
                NamedProbe::get("P2", "/api/protected").as_role("clinician"),
            ]))
            .await;

        assert_eq!(report.failed().len(), 0);
        let calls = transport.calls.lock().unwrap();
        let logins = calls.iter().filter(|c| c.contains("login")).count();
        assert_eq!(logins, 1, "token must be memoized per role");
    }

    struct PanickingTransport;

    #[async_trait]
    impl HttpTransport for PanickingTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
            panic!("transport blew up");
        }
    }

    #[tokio::test]
    async fn test_suite_panic_becomes_one_synthetic_failed_outcome() {
        let executor = ProbeExecutor::new(
            Arc::new(PanickingTransport),
            "http://backend",
            "http://frontend",
            Duration::from_secs(1),
        );
        let runner = SuiteRunner::new(executor, AuthBroker::new(&AuthConfig::default()));

        let report = runner
            .run_suite(&suite(vec![
                NamedProbe::get("A: Health", "/api/health"),
                NamedProbe::get("B: After crash", "/api/health"),
            ]))
            .await;

        assert_eq!(report.total(), 1, "one synthetic outcome for the suite");
        let outcome = &report.outcomes[0];
        assert!(!outcome.success);
        assert_eq!(outcome.test_name, "API");
        assert_eq!(outcome.status, 0);
        assert!(outcome
            .error_message
            .as_deref()
            .unwrap()
            .contains("execution crashed"));
    }

    #[tokio::test]
    async fn test_missing_credentials_become_failed_outcome() {
        let transport = Arc::new(ScriptedTransport {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let runner = runner_with(transport);

        let report = runner
            .run_suite(&suite(vec![
                NamedProbe::get("Admin: Metrics", "/api/admin/metrics").as_role("admin"),
            ]))
            .await;

        assert_eq!(report.failed().len(), 1);
        let outcome = report.failed()[0];
        assert_eq!(outcome.status, 401);
        assert!(outcome
            .error_message
            .as_deref()
            .unwrap()
            .contains("authentication precondition"));
    }
}
