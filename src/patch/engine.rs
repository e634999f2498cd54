use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::{AutofixConfig, PatchingConfig};
use crate::error::{HarnessError, Result};
use crate::model::{Fix, FixAction, FixKey, Issue, IssueKind};
use crate::patch::document::{RouteDocument, VALIDATION_IMPORT};

const CORS_REPLACEMENT: &str =
    "app.use(cors({ origin: process.env.CORS_ORIGIN || 'http://localhost:3000' }));";

/// Result of attempting one transform against an artifact.
enum ApplyStatus {
    /// The artifact changed on disk.
    Changed,
    /// The artifact already satisfies the transform; nothing to do, ever.
    Satisfied,
    /// The route the transform targets is not declared in the artifact yet.
    /// The fix may become applicable later in the run, e.g. once a missing
    /// route for the same endpoint has been added.
    NoTarget,
}

/// Applies structural, idempotent transforms to route-module artifacts.
///
/// The engine is stateless: the set of already-applied fix keys is owned by
/// the orchestrator and threaded through each call, and every applied fix is
/// returned as a value.
pub struct PatchEngine {
    source_dir: PathBuf,
    entry_point: PathBuf,
    /// Longest-prefix-first resolution table.
    routes: Vec<(String, PathBuf)>,
    default_artifact: PathBuf,
    autofix: AutofixConfig,
}

impl PatchEngine {
    pub fn new(patching: &PatchingConfig, autofix: AutofixConfig) -> Self {
        let mut routes: Vec<(String, PathBuf)> = patching
            .routes
            .iter()
            .map(|(prefix, file)| (prefix.clone(), file.clone()))
            .collect();
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));

        Self {
            source_dir: patching.source_dir.clone(),
            entry_point: patching.entry_point.clone(),
            routes,
            default_artifact: patching.default_artifact.clone(),
            autofix,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Apply at most one transform per fixable issue. Failures to locate or
    /// patch an artifact are logged and skipped; they never abort the run.
    pub async fn apply_fixes(&self, issues: &[Issue], applied: &mut HashSet<FixKey>) -> Vec<Fix> {
        let mut fixes = Vec::new();

        for issue in issues {
            if !issue.fixable {
                continue;
            }
            if !self.kind_enabled(issue.kind) {
                tracing::debug!(kind = ?issue.kind, "Fix kind disabled by configuration");
                continue;
            }
            let Some(fix) = self.plan(issue) else {
                tracing::debug!(
                    kind = ?issue.kind,
                    test = %issue.source_test,
                    "Issue is not actionable (no endpoint hint)"
                );
                continue;
            };

            let key = fix.key();
            if applied.contains(&key) {
                tracing::debug!(
                    artifact = %fix.target_artifact.display(),
                    action = ?fix.action,
                    "Fix already applied earlier in this run"
                );
                continue;
            }

            match self.apply_one(&fix).await {
                Ok(ApplyStatus::Changed) => {
                    tracing::info!(
                        artifact = %fix.target_artifact.display(),
                        action = ?fix.action,
                        hint = fix.endpoint_hint.as_deref().unwrap_or(""),
                        "Applied fix"
                    );
                    applied.insert(key);
                    fixes.push(fix);
                }
                Ok(ApplyStatus::Satisfied) => {
                    applied.insert(key);
                }
                Ok(ApplyStatus::NoTarget) => {
                    // Key stays unburned so the fix can land once the route
                    // exists.
                    tracing::debug!(
                        artifact = %fix.target_artifact.display(),
                        action = ?fix.action,
                        "Target route not present yet, fix deferred"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        artifact = %fix.target_artifact.display(),
                        action = ?fix.action,
                        error = %e,
                        "Failed to apply fix, skipping"
                    );
                }
            }
        }

        fixes
    }

    fn kind_enabled(&self, kind: IssueKind) -> bool {
        if !self.autofix.enabled {
            return false;
        }
        match kind {
            IssueKind::MissingRoute => self.autofix.fix_missing_routes,
            IssueKind::MissingAuthentication | IssueKind::MissingAuthorization => {
                self.autofix.fix_missing_middleware
            }
            IssueKind::MissingValidation => self.autofix.fix_missing_validation,
            IssueKind::IncorrectResponseFormat => self.autofix.fix_response_formats,
            IssueKind::ServerError => self.autofix.fix_error_handling,
            IssueKind::CorsIssue => self.autofix.fix_cors,
            IssueKind::TypeMismatch => self.autofix.fix_types,
            IssueKind::ConnectionIssue | IssueKind::Unknown => false,
        }
    }

    /// Decide action and target for an issue. `None` means not actionable.
    fn plan(&self, issue: &Issue) -> Option<Fix> {
        let mut extra = BTreeMap::new();

        let (action, target, hint) = match issue.kind {
            IssueKind::MissingRoute => {
                let hint = issue.endpoint_hint.clone()?;
                extra.insert("method".to_string(), method_hint(issue));
                (FixAction::AddedRoute, self.resolve_artifact(&hint), hint)
            }
            IssueKind::MissingAuthentication => {
                let hint = issue.endpoint_hint.clone()?;
                (
                    FixAction::AddedAuthentication,
                    self.resolve_artifact(&hint),
                    hint,
                )
            }
            IssueKind::MissingAuthorization => {
                let hint = issue.endpoint_hint.clone()?;
                extra.insert("role".to_string(), role_for_path(&hint).to_string());
                (
                    FixAction::AddedAuthorization,
                    self.resolve_artifact(&hint),
                    hint,
                )
            }
            IssueKind::MissingValidation | IssueKind::TypeMismatch => {
                let hint = issue.endpoint_hint.clone()?;
                // Validation scaffolds only make sense for body-carrying calls.
                let method = method_hint(issue);
                if !matches!(method.as_str(), "post" | "put" | "patch") {
                    return None;
                }
                extra.insert("method".to_string(), method);
                (
                    FixAction::AddedValidation,
                    self.resolve_artifact(&hint),
                    hint,
                )
            }
            IssueKind::IncorrectResponseFormat | IssueKind::ServerError => {
                let hint = issue.endpoint_hint.clone()?;
                (
                    FixAction::WrappedErrorHandling,
                    self.resolve_artifact(&hint),
                    hint,
                )
            }
            IssueKind::CorsIssue => {
                // CORS configuration lives in the entry point; no hint needed.
                return Some(Fix {
                    issue_kind: issue.kind,
                    action: FixAction::RestrictedCors,
                    target_artifact: self.entry_point.clone(),
                    endpoint_hint: issue.endpoint_hint.clone(),
                    extra,
                });
            }
            IssueKind::ConnectionIssue | IssueKind::Unknown => return None,
        };

        Some(Fix {
            issue_kind: issue.kind,
            action,
            target_artifact: target,
            endpoint_hint: Some(hint),
            extra,
        })
    }

    /// Longest-prefix match against the configured table; unmapped endpoint
    /// families land in the fallback artifact, loudly.
    fn resolve_artifact(&self, hint: &str) -> PathBuf {
        for (prefix, artifact) in &self.routes {
            if hint.starts_with(prefix.as_str()) {
                return artifact.clone();
            }
        }
        tracing::warn!(
            hint,
            fallback = %self.default_artifact.display(),
            "No artifact mapping for endpoint family, using fallback"
        );
        self.default_artifact.clone()
    }

    async fn apply_one(&self, fix: &Fix) -> Result<ApplyStatus> {
        match fix.action {
            FixAction::AddedRoute => self.add_route(fix).await,
            FixAction::AddedAuthentication => {
                self.mutate_route(fix, |route| route.add_middleware("authenticate"))
                    .await
            }
            FixAction::AddedAuthorization => {
                let role = fix.extra.get("role").map(String::as_str).unwrap_or("clinician");
                let token = format!("authorize('{role}')");
                self.mutate_route(fix, move |route| {
                    if route.has_middleware_prefix("authorize(") {
                        false
                    } else {
                        route.add_middleware(&token)
                    }
                })
                .await
            }
            FixAction::AddedValidation => self.add_validation(fix).await,
            FixAction::WrappedErrorHandling => {
                self.mutate_route(fix, |route| route.wrap_error_handling()).await
            }
            FixAction::RestrictedCors => self.restrict_cors(fix).await,
        }
    }

    async fn add_route(&self, fix: &Fix) -> Result<ApplyStatus> {
        let hint = fix.endpoint_hint.as_deref().unwrap_or_default();
        let method = fix.extra.get("method").map(String::as_str).unwrap_or("get");

        let (mut doc, existed) = match self.load_document(&fix.target_artifact).await? {
            Some(doc) => (doc, true),
            None => (RouteDocument::new_module(), false),
        };

        let changed = doc.add_route(method, hint);
        if changed || !existed {
            self.write_document(&fix.target_artifact, &doc).await?;
        }

        // Register the module with the entry point; best effort.
        if let Err(e) = self.register_with_entry(&fix.target_artifact, hint).await {
            tracing::warn!(error = %e, "Could not register route module with entry point");
        }

        Ok(if changed || !existed {
            ApplyStatus::Changed
        } else {
            ApplyStatus::Satisfied
        })
    }

    async fn register_with_entry(&self, artifact: &Path, hint: &str) -> Result<()> {
        let Some(mut entry) = self.load_document(&self.entry_point).await? else {
            return Err(HarnessError::Artifact(format!(
                "entry point {} not found",
                self.entry_point.display()
            )));
        };

        let stem = artifact
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("routes");
        let binding = format!("{stem}Routes");
        let mount = mount_prefix(hint);
        let require_line = format!(
            "const {binding} = require('./{}');",
            artifact.with_extension("").display()
        );
        let use_line = format!("app.use('{mount}', {binding});");

        let mut changed = entry.ensure_header_line(&require_line);
        changed |= entry.ensure_registration_line(&use_line);
        if changed {
            self.write_document(&self.entry_point, &entry).await?;
        }
        Ok(())
    }

    async fn add_validation(&self, fix: &Fix) -> Result<ApplyStatus> {
        let hint = fix.endpoint_hint.as_deref().unwrap_or_default();
        let Some(mut doc) = self.load_document(&fix.target_artifact).await? else {
            return Err(missing_artifact(&fix.target_artifact));
        };

        let Some(route) = doc.route_mut(hint) else {
            tracing::debug!(hint, "No parsed route declaration to validate");
            return Ok(ApplyStatus::NoTarget);
        };
        let block_added = route.insert_validation();
        let import_added = block_added && doc.ensure_header_line(VALIDATION_IMPORT);

        if import_added || block_added {
            self.write_document(&fix.target_artifact, &doc).await?;
        }
        // The import alone is not a fix; only count it when a block landed.
        Ok(if block_added {
            ApplyStatus::Changed
        } else {
            ApplyStatus::Satisfied
        })
    }

    async fn restrict_cors(&self, fix: &Fix) -> Result<ApplyStatus> {
        let Some(mut doc) = self.load_document(&fix.target_artifact).await? else {
            return Err(missing_artifact(&fix.target_artifact));
        };
        if doc.restrict_cors(CORS_REPLACEMENT) {
            self.write_document(&fix.target_artifact, &doc).await?;
            Ok(ApplyStatus::Changed)
        } else {
            Ok(ApplyStatus::Satisfied)
        }
    }

    async fn mutate_route<F>(&self, fix: &Fix, mutate: F) -> Result<ApplyStatus>
    where
        F: FnOnce(&mut crate::patch::document::RouteDecl) -> bool,
    {
        let hint = fix.endpoint_hint.as_deref().unwrap_or_default();
        let Some(mut doc) = self.load_document(&fix.target_artifact).await? else {
            return Err(missing_artifact(&fix.target_artifact));
        };
        let Some(route) = doc.route_mut(hint) else {
            tracing::debug!(
                hint,
                artifact = %fix.target_artifact.display(),
                "No route declaration matching hint"
            );
            return Ok(ApplyStatus::NoTarget);
        };
        if mutate(route) {
            self.write_document(&fix.target_artifact, &doc).await?;
            Ok(ApplyStatus::Changed)
        } else {
            Ok(ApplyStatus::Satisfied)
        }
    }

    async fn load_document(&self, relative: &Path) -> Result<Option<RouteDocument>> {
        let path = self.source_dir.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(RouteDocument::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HarnessError::Artifact(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write_document(&self, relative: &Path, doc: &RouteDocument) -> Result<()> {
        let path = self.source_dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, doc.render()).await?;
        Ok(())
    }
}

fn missing_artifact(path: &Path) -> HarnessError {
    HarnessError::Artifact(format!("artifact {} does not exist", path.display()))
}

/// HTTP method mentioned in the failing test or its error, lowercased.
fn method_hint(issue: &Issue) -> String {
    for source in [issue.source_error.as_str(), issue.source_test.as_str()] {
        for word in source.split(|c: char| !c.is_ascii_alphabetic()) {
            if matches!(word, "GET" | "POST" | "PUT" | "PATCH" | "DELETE") {
                return word.to_lowercase();
            }
        }
    }
    "get".to_string()
}

/// Elevated role for administrative and scheduling surfaces, operational
/// role for everything else.
fn role_for_path(path: &str) -> &'static str {
    if path.contains("/admin") || path.contains("/scheduling") {
        "admin"
    } else {
        "clinician"
    }
}

/// First two path segments, e.g. `/api/forecast/predict` -> `/api/forecast`.
fn mount_prefix(hint: &str) -> String {
    let segments: Vec<&str> = hint.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() >= 2 {
        format!("/{}/{}", segments[0], segments[1])
    } else {
        hint.to_string()
    }
}
