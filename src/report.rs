//! Renders a final report into a timestamped file. Pure serialization: the
//! report is never mutated, and no counters are recomputed here.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HarnessError, Result};
use crate::model::{FinalReport, IterationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Html,
    Text,
}

impl ReportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Text => "txt",
        }
    }
}

/// Serialize the report and write it under `output_dir`. Returns the path of
/// the written file.
pub async fn generate_report(
    report: &FinalReport,
    format: ReportFormat,
    output_dir: &Path,
) -> Result<PathBuf> {
    let content = match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)?,
        ReportFormat::Html => render_html(report),
        ReportFormat::Text => render_text(report),
    };

    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        HarnessError::Report(format!(
            "cannot create report directory {}: {e}",
            output_dir.display()
        ))
    })?;
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let path = output_dir.join(format!("vigil-report-{timestamp}.{}", format.extension()));
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| HarnessError::Report(format!("cannot write report {}: {e}", path.display())))?;

    tracing::info!(path = %path.display(), "Report written");
    Ok(path)
}

fn render_text(report: &FinalReport) -> String {
    let mut out = String::new();
    out.push_str("vigil conformance report\n");
    out.push_str("========================\n\n");
    out.push_str(&format!(
        "result: {}\n",
        if report.success { "CONVERGED" } else { "FAILED" }
    ));
    out.push_str(&format!(
        "iterations: {} of {}\n\n",
        report.total_iterations, report.max_iterations
    ));

    let s = &report.summary;
    out.push_str(&format!(
        "tests: {} (passed {}, failed {})\nissues: {}\nfixes applied: {}\n",
        s.total_tests, s.total_passed, s.total_failed, s.total_issues, s.total_fixes
    ));

    for record in &report.history {
        out.push_str(&format!(
            "\n--- iteration {} ---\n",
            record.iteration
        ));
        for outcome in &record.outcomes {
            if outcome.success {
                out.push_str(&format!("  PASS {}\n", outcome.test_name));
            } else {
                out.push_str(&format!(
                    "  FAIL {} [{}] {}\n",
                    outcome.test_name,
                    outcome.status,
                    outcome.error_message.as_deref().unwrap_or("")
                ));
            }
        }
        for issue in &record.issues {
            out.push_str(&format!(
                "  issue: {:?} ({:?}, fixable: {})\n",
                issue.kind, issue.severity, issue.fixable
            ));
        }
        for v in &record.verification {
            out.push_str(&format!(
                "  fix: {:?} on {} ({})\n",
                v.fix.action,
                v.fix.target_artifact.display(),
                if v.verified { "verified" } else { "unverified" }
            ));
        }
    }
    out
}

fn render_html(report: &FinalReport) -> String {
    let mut body = String::new();
    let (badge, class) = if report.success {
        ("CONVERGED", "ok")
    } else {
        ("FAILED", "bad")
    };
    body.push_str(&format!(
        "<h1>vigil conformance report <span class=\"{class}\">{badge}</span></h1>\n"
    ));

    let s = &report.summary;
    body.push_str(&format!(
        "<table><tr><th>Iterations</th><th>Tests</th><th>Passed</th><th>Failed</th><th>Issues</th><th>Fixes</th></tr>\
         <tr><td>{} / {}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr></table>\n",
        report.total_iterations,
        report.max_iterations,
        s.total_tests,
        s.total_passed,
        s.total_failed,
        s.total_issues,
        s.total_fixes
    ));

    for record in &report.history {
        body.push_str(&render_iteration_html(record));
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>vigil report</title>\
         <style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #999;padding:4px 8px}}.ok{{color:green}}.bad{{color:red}}\
         .fail{{background:#fee}}</style></head><body>\n{body}</body></html>\n"
    )
}

fn render_iteration_html(record: &IterationRecord) -> String {
    let mut out = format!("<h2>Iteration {}</h2>\n<table>", record.iteration);
    out.push_str("<tr><th>Test</th><th>Status</th><th>Error</th></tr>");
    for outcome in &record.outcomes {
        let class = if outcome.success { "" } else { " class=\"fail\"" };
        out.push_str(&format!(
            "<tr{class}><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&outcome.test_name),
            outcome.status,
            escape(outcome.error_message.as_deref().unwrap_or(""))
        ));
    }
    out.push_str("</table>\n");

    if !record.verification.is_empty() {
        out.push_str("<ul>");
        for v in &record.verification {
            out.push_str(&format!(
                "<li>{:?} on <code>{}</code> &mdash; {}</li>",
                v.fix.action,
                escape(&v.fix.target_artifact.display().to_string()),
                if v.verified { "verified" } else { "unverified" }
            ));
        }
        out.push_str("</ul>\n");
    }
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
