//! Built-in probe suites covering the hospital service's endpoint families:
//! auth, patients, triage acuity, demand forecast, staff/OR scheduling,
//! discharge planning, admin metrics, and the dashboard frontend.
//!
//! The catalog is data. Probe order matters and is preserved by the runner:
//! login-shaped probes come first so later protected probes can reuse the
//! memoized token.

use serde_json::json;

use crate::config::SuitesConfig;
use crate::probe::types::NamedProbe;
use crate::suite::Suite;

pub fn api_suite() -> Suite {
    Suite {
        name: "API".to_string(),
        probes: vec![
            NamedProbe::get("Health: Status", "/api/health").expect_field("status"),
            NamedProbe::post(
                "Auth: Login",
                "/api/auth/login",
                json!({"email": "probe@vigil.local", "password": "probe"}),
            ),
            NamedProbe::get("Auth: Current User", "/api/auth/me")
                .as_role("clinician")
                .expect_field("user"),
            NamedProbe::get("Patients: List", "/api/patients")
                .as_role("clinician")
                .expect_field("patients"),
            NamedProbe::post(
                "Patients: Register",
                "/api/patients",
                json!({
                    "name": "Asha Verma",
                    "age": 64,
                    "sex": "F",
                    "chief_complaint": "chest pain"
                }),
            )
            .as_role("clinician"),
            NamedProbe::post(
                "Triage: Score",
                "/api/triage/score",
                json!({
                    "age": 64,
                    "heart_rate": 112,
                    "systolic_bp": 94,
                    "spo2": 91,
                    "complaint_text": "chest pain radiating to left arm"
                }),
            )
            .as_role("clinician")
            .expect_field("acuity"),
            NamedProbe::post(
                "Forecast: Predict",
                "/api/forecast/predict",
                json!({"department": "emergency", "horizon_days": 7}),
            )
            .as_role("clinician")
            .expect_field("forecast"),
            NamedProbe::get("Scheduling: Staff Roster", "/api/scheduling/staff")
                .as_role("admin")
                .expect_field("roster"),
            NamedProbe::post(
                "Scheduling: Allocate OR Slot",
                "/api/scheduling/or/allocate",
                json!({"procedure": "appendectomy", "urgency": "urgent"}),
            )
            .as_role("admin"),
            NamedProbe::post(
                "Discharge: Plan",
                "/api/discharge/plan",
                json!({"patient_id": "P-1001", "ward": "cardiology"}),
            )
            .as_role("clinician")
            .expect_field("plan"),
            NamedProbe::get("Admin: Metrics", "/api/admin/metrics")
                .as_role("admin")
                .expect_field("metrics"),
        ],
    }
}

pub fn ui_suite() -> Suite {
    Suite {
        name: "UI".to_string(),
        probes: vec![
            NamedProbe::get("UI: Landing Page", "/").on_frontend(),
            NamedProbe::get("UI: Login Page", "/login").on_frontend(),
            NamedProbe::get("UI: Dashboard Page", "/dashboard").on_frontend(),
            NamedProbe::get("UI: Triage Board", "/triage").on_frontend(),
        ],
    }
}

pub fn integration_suite() -> Suite {
    Suite {
        name: "Integration".to_string(),
        probes: vec![
            NamedProbe::get("Integration: Dashboard Summary", "/api/dashboard/summary")
                .as_role("clinician")
                .expect_field("occupancy"),
            NamedProbe::post(
                "Integration: Triage Feeds Scheduling",
                "/api/triage/score",
                json!({
                    "age": 41,
                    "heart_rate": 88,
                    "systolic_bp": 121,
                    "spo2": 98,
                    "complaint_text": "ankle sprain"
                }),
            )
            .as_role("clinician"),
            NamedProbe::get("Integration: Scheduling Queue", "/api/scheduling/queue")
                .as_role("clinician")
                .expect_field("queue"),
            NamedProbe::get("Integration: Forecast History", "/api/forecast/history")
                .as_role("clinician"),
        ],
    }
}

/// Suites enabled by configuration, in fixed API -> UI -> Integration order.
pub fn enabled_suites(config: &SuitesConfig) -> Vec<Suite> {
    let mut suites = Vec::new();
    if config.api {
        suites.push(api_suite());
    }
    if config.ui {
        suites.push(ui_suite());
    }
    if config.integration {
        suites.push(integration_suite());
    }
    suites
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::types::Target;

    #[test]
    fn test_all_suites_enabled_by_default() {
        let suites = enabled_suites(&SuitesConfig::default());
        let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["API", "UI", "Integration"]);
    }

    #[test]
    fn test_single_suite_restriction() {
        let config = SuitesConfig {
            api: false,
            ui: false,
            integration: true,
        };
        let suites = enabled_suites(&config);
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].name, "Integration");
    }

    #[test]
    fn test_ui_probes_target_frontend() {
        assert!(ui_suite()
            .probes
            .iter()
            .all(|p| p.target == Target::Frontend));
        assert!(api_suite()
            .probes
            .iter()
            .all(|p| p.target == Target::Backend));
    }

    #[test]
    fn test_login_probe_precedes_protected_probes() {
        let suite = api_suite();
        let login = suite
            .probes
            .iter()
            .position(|p| p.name == "Auth: Login")
            .unwrap();
        let first_protected = suite.probes.iter().position(|p| p.role.is_some()).unwrap();
        assert!(login < first_protected);
    }
}
