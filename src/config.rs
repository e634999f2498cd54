use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{HarnessError, Result};
use crate::report::ReportFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct HarnessConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_test_timeout_ms")]
    pub test_timeout_ms: u64,
    /// Pause between iterations so an externally-restarted service can come
    /// back up. There is no readiness poll; this delay is the only grace.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub suites: SuitesConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub autofix: AutofixConfig,
    #[serde(default)]
    pub patching: PatchingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuitesConfig {
    #[serde(default = "default_true")]
    pub api: bool,
    #[serde(default = "default_true")]
    pub ui: bool,
    #[serde(default = "default_true")]
    pub integration: bool,
}

impl Default for SuitesConfig {
    fn default() -> Self {
        Self {
            api: true,
            ui: true,
            integration: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Login credentials per role (e.g. "clinician", "admin").
    #[serde(default)]
    pub users: HashMap<String, Credentials>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            users: HashMap::new(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// Manual Debug impl to avoid leaking passwords into logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AutofixConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub fix_missing_routes: bool,
    #[serde(default = "default_true")]
    pub fix_missing_middleware: bool,
    #[serde(default = "default_true")]
    pub fix_missing_validation: bool,
    #[serde(default = "default_true")]
    pub fix_response_formats: bool,
    #[serde(default = "default_true")]
    pub fix_error_handling: bool,
    #[serde(default = "default_true")]
    pub fix_cors: bool,
    #[serde(default = "default_true")]
    pub fix_types: bool,
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fix_missing_routes: true,
            fix_missing_middleware: true,
            fix_missing_validation: true,
            fix_response_formats: true,
            fix_error_handling: true,
            fix_cors: true,
            fix_types: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchingConfig {
    /// Root of the service source tree the Patch Engine is allowed to mutate.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// Process entry point, relative to `source_dir`. New route modules are
    /// registered here and CORS configuration lives here.
    #[serde(default = "default_entry_point")]
    pub entry_point: PathBuf,
    /// URL-prefix to route-module mapping. Longest prefix wins. Anything
    /// unmapped falls back to `default_artifact` with a warning.
    #[serde(default = "default_route_table")]
    pub routes: HashMap<String, PathBuf>,
    #[serde(default = "default_fallback_artifact")]
    pub default_artifact: PathBuf,
}

impl Default for PatchingConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            entry_point: default_entry_point(),
            routes: default_route_table(),
            default_artifact: default_fallback_artifact(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: ReportFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, one JSON record per line is appended here.
    #[serde(default)]
    pub output_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output_file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> u32 {
    10
}

fn default_test_timeout_ms() -> u64 {
    30_000
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_login_path() -> String {
    "/api/auth/login".to_string()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./backend")
}

fn default_entry_point() -> PathBuf {
    PathBuf::from("server.js")
}

fn default_route_table() -> HashMap<String, PathBuf> {
    [
        ("/api/auth", "routes/auth.js"),
        ("/api/patients", "routes/patients.js"),
        ("/api/triage", "routes/triage.js"),
        ("/api/forecast", "routes/forecast.js"),
        ("/api/scheduling", "routes/scheduling.js"),
        ("/api/discharge", "routes/discharge.js"),
        ("/api/admin", "routes/admin.js"),
        ("/api/dashboard", "routes/dashboard.js"),
    ]
    .into_iter()
    .map(|(prefix, file)| (prefix.to_string(), PathBuf::from(file)))
    .collect()
}

fn default_fallback_artifact() -> PathBuf {
    PathBuf::from("routes/misc.js")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl HarnessConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("vigil").required(false));
        }

        // Environment variable overrides with VIGIL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("VIGIL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| HarnessError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn test_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.test_timeout_ms)
    }

    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_no_file_present() {
        let config = HarnessConfig::load(Some("/nonexistent/does-not-exist"));
        // Explicit missing file is an error; the defaults path is exercised
        // through deserialization below.
        assert!(config.is_err());

        let empty: HarnessConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.max_iterations, 10);
        assert_eq!(empty.test_timeout_ms, 30_000);
        assert!(empty.suites.api && empty.suites.ui && empty.suites.integration);
        assert!(empty.autofix.enabled);
        assert_eq!(empty.report.format, ReportFormat::Json);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
max_iterations = 3
backend_url = "http://127.0.0.1:5001"

[suites]
ui = false

[autofix]
fix_cors = false

[auth.users.clinician]
email = "nurse@example.org"
password = "hunter2"
"#
        )
        .unwrap();

        let config = HarnessConfig::load(path.to_str()).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.backend_url, "http://127.0.0.1:5001");
        assert!(!config.suites.ui);
        assert!(config.suites.api);
        assert!(!config.autofix.fix_cors);
        assert_eq!(config.auth.users["clinician"].email, "nurse@example.org");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            email: "nurse@example.org".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_route_table_defaults_cover_core_families() {
        let patching = PatchingConfig::default();
        assert!(patching.routes.contains_key("/api/forecast"));
        assert!(patching.routes.contains_key("/api/triage"));
        assert_eq!(patching.default_artifact, PathBuf::from("routes/misc.js"));
    }
}
