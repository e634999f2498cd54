use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

/// Normalized result of executing one probe. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub test_name: String,
    pub success: bool,
    /// HTTP status, or 0 when the transport never produced a response.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
}

impl Outcome {
    pub fn passed(test_name: &str, status: u16, body: Option<serde_json::Value>) -> Self {
        Self {
            test_name: test_name.to_string(),
            success: true,
            status,
            error_message: None,
            response_body: body,
        }
    }

    pub fn failed(test_name: &str, status: u16, error: impl Into<String>) -> Self {
        Self {
            test_name: test_name.to_string(),
            success: false,
            status,
            error_message: Some(error.into()),
            response_body: None,
        }
    }
}

/// Closed issue taxonomy. Classification is total: everything lands somewhere,
/// with `Unknown` as the non-fixable catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingRoute,
    MissingAuthentication,
    MissingAuthorization,
    MissingValidation,
    IncorrectResponseFormat,
    CorsIssue,
    ConnectionIssue,
    TypeMismatch,
    ServerError,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// Deterministic interpretation of one failed Outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub source_test: String,
    pub source_error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub fixable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    AddedRoute,
    AddedAuthentication,
    AddedAuthorization,
    AddedValidation,
    WrappedErrorHandling,
    RestrictedCors,
}

/// One successfully applied source mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Fix {
    pub issue_kind: IssueKind,
    pub action: FixAction,
    /// Relative to the configured patching source dir.
    pub target_artifact: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_hint: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Fix {
    /// Run-global idempotency key: the same (artifact, action, hint) triple
    /// is never applied twice across a run.
    pub fn key(&self) -> FixKey {
        FixKey {
            target_artifact: self.target_artifact.clone(),
            action: self.action,
            endpoint_hint: self.endpoint_hint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixKey {
    pub target_artifact: PathBuf,
    pub action: FixAction,
    pub endpoint_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationRecord {
    pub fix: Fix,
    pub verified: bool,
}

/// Everything that happened in one iteration. Sealed after creation.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub outcomes: Vec<Outcome>,
    pub issues: Vec<Issue>,
    pub fixes_applied: Vec<Fix>,
    pub verification: Vec<VerificationRecord>,
}

impl IterationRecord {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_tests: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_issues: usize,
    pub total_fixes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub success: bool,
    pub total_iterations: u32,
    pub max_iterations: u32,
    pub history: Vec<IterationRecord>,
    pub summary: Summary,
}

impl FinalReport {
    pub fn from_history(history: Vec<IterationRecord>, max_iterations: u32) -> Self {
        let summary = Summary {
            total_tests: history.iter().map(|it| it.outcomes.len()).sum(),
            total_passed: history.iter().map(IterationRecord::passed_count).sum(),
            total_failed: history.iter().map(IterationRecord::failed_count).sum(),
            total_issues: history.iter().map(|it| it.issues.len()).sum(),
            total_fixes: history.iter().map(|it| it.fixes_applied.len()).sum(),
        };

        // Converged iff the final iteration saw zero failures.
        let success = history
            .last()
            .map(|it| it.failed_count() == 0)
            .unwrap_or(false);

        Self {
            success,
            total_iterations: history.len() as u32,
            max_iterations,
            history,
            summary,
        }
    }
}
