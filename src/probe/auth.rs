use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::json;

use crate::config::AuthConfig;
use crate::error::{HarnessError, Result};
use crate::probe::executor::ProbeExecutor;

/// Acquires bearer tokens from the service's login endpoint and memoizes
/// them per role for the lifetime of the run.
pub struct AuthBroker {
    login_path: String,
    users: HashMap<String, crate::config::Credentials>,
    tokens: Mutex<HashMap<String, String>>,
}

impl AuthBroker {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            users: config.users.clone(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Token for a role, logging in on first use. A login failure surfaces
    /// as an error the suite runner turns into a failed outcome; it never
    /// aborts the suite.
    pub async fn token_for(&self, role: &str, executor: &ProbeExecutor) -> Result<String> {
        if let Some(token) = self.cached(role) {
            return Ok(token);
        }

        let creds = self.users.get(role).ok_or_else(|| {
            HarnessError::Auth(format!("no credentials configured for role '{role}'"))
        })?;

        let response = executor
            .post_json(
                &self.login_path,
                json!({ "email": creds.email, "password": creds.password }),
            )
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(HarnessError::Auth(format!(
                "login for role '{role}' responded {}: Unauthorized",
                response.status
            )));
        }

        let token = response
            .body
            .as_ref()
            .and_then(|b| b.get("token"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                HarnessError::Auth(format!(
                    "login for role '{role}' returned no token property"
                ))
            })?
            .to_string();

        if let Some(granted) = response
            .body
            .as_ref()
            .and_then(|b| b.pointer("/user/role"))
            .and_then(|r| r.as_str())
        {
            if granted != role {
                tracing::warn!(requested = role, granted, "login granted a different role");
            }
        }

        self.tokens
            .lock()
            .map_err(|_| HarnessError::Auth("token cache poisoned".to_string()))?
            .insert(role.to_string(), token.clone());

        tracing::debug!(role, "acquired bearer token");
        Ok(token)
    }

    fn cached(&self, role: &str) -> Option<String> {
        self.tokens.lock().ok()?.get(role).cloned()
    }
}
