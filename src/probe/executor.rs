use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{HarnessError, Result};
use crate::model::Outcome;
use crate::probe::types::{HttpMethod, NamedProbe, Target};

/// The transport seam: the one place that actually talks to the network.
/// Tests drive the suite runner and orchestrator through scripted impls.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

/// Production transport backed by reqwest.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HarnessError::Probe(format!("request timed out: {e}"))
            } else if e.is_connect() {
                HarnessError::Probe(format!("connection refused or unreachable: {e}"))
            } else {
                HarnessError::Probe(format!("network error: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        // Non-JSON bodies (plain text, HTML pages) are fine; keep None.
        let body = response.json::<serde_json::Value>().await.ok();

        Ok(TransportResponse { status, body })
    }
}

/// Issues a single probe and normalizes every failure mode into an `Outcome`.
/// Never returns an error to the suite runner.
pub struct ProbeExecutor {
    transport: std::sync::Arc<dyn HttpTransport>,
    backend_url: String,
    frontend_url: String,
    timeout: Duration,
}

impl ProbeExecutor {
    pub fn new(
        transport: std::sync::Arc<dyn HttpTransport>,
        backend_url: &str,
        frontend_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn url_for(&self, probe: &NamedProbe) -> Result<String> {
        let base = match probe.target {
            Target::Backend => &self.backend_url,
            Target::Frontend => &self.frontend_url,
        };
        if base.is_empty() {
            return Err(HarnessError::Config(format!(
                "no base URL configured for {:?} target",
                probe.target
            )));
        }
        Ok(format!("{base}{}", probe.path))
    }

    pub async fn execute(&self, probe: &NamedProbe, token: Option<&str>) -> Outcome {
        let url = match self.url_for(probe) {
            Ok(url) => url,
            Err(e) => return Outcome::failed(&probe.name, 0, e.to_string()),
        };

        let request = TransportRequest {
            method: probe.method,
            url,
            body: probe.body.clone(),
            bearer_token: token.map(str::to_string),
            timeout: self.timeout,
        };

        let response = match self.transport.send(request).await {
            Ok(r) => r,
            Err(e) => {
                // Transport never produced a response: status 0, keep iterating.
                return Outcome::failed(
                    &probe.name,
                    0,
                    format!("{} {} failed: {e}", probe.method, probe.path),
                );
            }
        };

        if !(200..300).contains(&response.status) {
            let detail = body_error_text(response.body.as_ref())
                .unwrap_or_else(|| status_reason(response.status));
            return Outcome::failed(
                &probe.name,
                response.status,
                format!(
                    "{} {} responded {}: {detail}",
                    probe.method, probe.path, response.status
                ),
            );
        }

        // Status is fine; check presence of expected top-level fields.
        for field in &probe.expect_fields {
            let present = response
                .body
                .as_ref()
                .and_then(|b| b.get(field))
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !present {
                return Outcome::failed(
                    &probe.name,
                    response.status,
                    format!(
                        "{} {} returned {}, but property '{field}' is undefined in the response body",
                        probe.method, probe.path, response.status
                    ),
                );
            }
        }

        Outcome::passed(&probe.name, response.status, response.body)
    }

    /// Raw authenticated POST used by the auth broker for login calls.
    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<TransportResponse> {
        self.transport
            .send(TransportRequest {
                method: HttpMethod::Post,
                url: format!("{}{path}", self.backend_url),
                body: Some(body),
                bearer_token: None,
                timeout: self.timeout,
            })
            .await
    }
}

fn body_error_text(body: Option<&serde_json::Value>) -> Option<String> {
    let body = body?;
    for key in ["error", "message", "detail"] {
        if let Some(text) = body.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

fn status_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unrecognized status")
        .to_string()
}
