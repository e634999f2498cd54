//! Maps failed probe outcomes onto the issue taxonomy.
//!
//! Classification is pure, total, and deterministic: the same outcome always
//! yields the same issue, and anything unmatched lands in `Unknown`.

use crate::model::{Issue, IssueKind, Outcome, Severity};

/// Classify one outcome. Rules are evaluated in order; first match wins.
pub fn classify(outcome: &Outcome) -> Issue {
    let error = outcome.error_message.as_deref().unwrap_or("");
    let lower = error.to_lowercase();
    let status = outcome.status;

    let (kind, severity, fixable) = if status == 404 || lower.contains("not found") {
        (IssueKind::MissingRoute, Severity::High, true)
    } else if status == 401 || lower.contains("unauthorized") {
        (IssueKind::MissingAuthentication, Severity::High, true)
    } else if status == 403 || lower.contains("forbidden") {
        (IssueKind::MissingAuthorization, Severity::Medium, true)
    } else if status == 400 || lower.contains("validation") {
        (IssueKind::MissingValidation, Severity::Medium, true)
    } else if lower.contains("property") || lower.contains("undefined") || lower.contains("null") {
        (IssueKind::IncorrectResponseFormat, Severity::Medium, true)
    } else if lower.contains("cors") || lower.contains("origin") {
        (IssueKind::CorsIssue, Severity::High, true)
    } else if is_connection_error(&lower) {
        // Nothing to patch: the process under test is not even answering.
        (IssueKind::ConnectionIssue, Severity::High, false)
    } else if lower.contains("type") || lower.contains("expected") {
        (IssueKind::TypeMismatch, Severity::Low, true)
    } else if status >= 500 {
        (IssueKind::ServerError, Severity::High, true)
    } else {
        (IssueKind::Unknown, Severity::Medium, false)
    };

    Issue {
        kind,
        severity,
        source_test: outcome.test_name.clone(),
        source_error: error.to_string(),
        status_code: if status == 0 { None } else { Some(status) },
        fixable,
        endpoint_hint: endpoint_hint(&outcome.test_name, error),
    }
}

fn is_connection_error(lower: &str) -> bool {
    lower.contains("econnrefused")
        || lower.contains("connection refused")
        || lower.contains("connect")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("network")
        || lower.contains("unreachable")
}

/// Pull an endpoint hint out of the error text or test name: either an
/// `/api/...`-shaped substring or a quoted literal containing a slash.
/// Without a hint the issue stays non-actionable even when fixable.
pub fn endpoint_hint(test_name: &str, error: &str) -> Option<String> {
    for source in [error, test_name] {
        if let Some(hint) = find_api_path(source) {
            return Some(hint);
        }
        if let Some(hint) = find_quoted_path(source) {
            return Some(hint);
        }
    }
    None
}

fn find_api_path(text: &str) -> Option<String> {
    let start = text.find("/api/")?;
    let candidate: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_'))
        .collect();
    let trimmed = candidate.trim_end_matches('/');
    if trimmed.len() > "/api/".len() {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn find_quoted_path(text: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        let mut rest = text;
        while let Some(open) = rest.find(quote) {
            let after = &rest[open + 1..];
            if let Some(close) = after.find(quote) {
                let literal = &after[..close];
                if literal.starts_with('/') && literal.len() > 1 {
                    return Some(literal.to_string());
                }
                rest = &after[close + 1..];
            } else {
                break;
            }
        }
    }
    None
}
