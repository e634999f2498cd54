//! Structural re-check of applied fixes.
//!
//! Each fix's artifact is re-read and inspected for an action-specific
//! marker. This is a sanity check that the mutation landed, not a behavioral
//! guarantee. A missing artifact or marker yields `verified: false` and the
//! run carries on.

use std::path::Path;

use crate::model::{Fix, FixAction, VerificationRecord};
use crate::patch::document::RouteDocument;

pub async fn verify_fixes(source_dir: &Path, fixes: &[Fix]) -> Vec<VerificationRecord> {
    let mut records = Vec::with_capacity(fixes.len());
    for fix in fixes {
        let verified = check(source_dir, fix).await;
        if verified {
            tracing::debug!(
                artifact = %fix.target_artifact.display(),
                action = ?fix.action,
                "Fix verified"
            );
        } else {
            tracing::warn!(
                artifact = %fix.target_artifact.display(),
                action = ?fix.action,
                "Fix did not verify"
            );
        }
        records.push(VerificationRecord {
            fix: fix.clone(),
            verified,
        });
    }
    records
}

async fn check(source_dir: &Path, fix: &Fix) -> bool {
    let path = source_dir.join(&fix.target_artifact);
    let Ok(text) = tokio::fs::read_to_string(&path).await else {
        return false;
    };
    let doc = RouteDocument::parse(&text);
    let hint = fix.endpoint_hint.as_deref().unwrap_or_default();

    match fix.action {
        FixAction::AddedRoute => doc.has_route(hint),
        FixAction::AddedAuthentication => doc
            .route(hint)
            .map(|r| r.has_middleware("authenticate"))
            .unwrap_or(false),
        FixAction::AddedAuthorization => doc
            .route(hint)
            .map(|r| r.has_middleware_prefix("authorize("))
            .unwrap_or(false),
        FixAction::AddedValidation => doc
            .route(hint)
            .map(|r| r.is_validated())
            .unwrap_or(false),
        FixAction::WrappedErrorHandling => doc
            .route(hint)
            .map(|r| r.is_error_wrapped())
            .unwrap_or(false),
        FixAction::RestrictedCors => {
            !doc.has_wildcard_cors() && doc.contains_text("CORS_ORIGIN")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueKind;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    fn fix(action: FixAction, artifact: &str, hint: Option<&str>) -> Fix {
        Fix {
            issue_kind: IssueKind::MissingRoute,
            action,
            target_artifact: PathBuf::from(artifact),
            endpoint_hint: hint.map(str::to_string),
            extra: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_verifies_route_and_middleware_markers() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("routes")).unwrap();
        fs::write(
            tmp.path().join("routes/auth.js"),
            "router.get('/api/auth/me', authenticate, async (req, res) => { res.json({ user: null }); });\n",
        )
        .unwrap();

        let records = verify_fixes(
            tmp.path(),
            &[
                fix(FixAction::AddedRoute, "routes/auth.js", Some("/api/auth/me")),
                fix(
                    FixAction::AddedAuthentication,
                    "routes/auth.js",
                    Some("/api/auth/me"),
                ),
                fix(
                    FixAction::AddedAuthorization,
                    "routes/auth.js",
                    Some("/api/auth/me"),
                ),
            ],
        )
        .await;

        assert!(records[0].verified);
        assert!(records[1].verified);
        assert!(!records[2].verified, "no authorize middleware present");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_unverified_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let records = verify_fixes(
            tmp.path(),
            &[fix(FixAction::AddedRoute, "routes/gone.js", Some("/api/x"))],
        )
        .await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].verified);
    }

    #[tokio::test]
    async fn test_cors_marker_requires_env_origin_and_no_wildcard() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("server.js"),
            "app.use(cors({ origin: process.env.CORS_ORIGIN || 'http://localhost:3000' }));\n",
        )
        .unwrap();
        let records = verify_fixes(
            tmp.path(),
            &[fix(FixAction::RestrictedCors, "server.js", None)],
        )
        .await;
        assert!(records[0].verified);

        fs::write(tmp.path().join("server.js"), "app.use(cors());\n").unwrap();
        let records = verify_fixes(
            tmp.path(),
            &[fix(FixAction::RestrictedCors, "server.js", None)],
        )
        .await;
        assert!(!records[0].verified);
    }
}
