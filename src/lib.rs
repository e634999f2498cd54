//! Vigil probes a running hospital-operations service, classifies every
//! failed probe into a fixed issue taxonomy, applies structural patches to
//! the service's route modules for the fixable ones, verifies the patches,
//! and iterates until the service converges or the iteration budget runs out.

pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod patch;
pub mod probe;
pub mod report;
pub mod suite;
