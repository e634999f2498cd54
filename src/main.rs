use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use vigil::config::HarnessConfig;
use vigil::orchestrator::Orchestrator;
use vigil::patch::PatchEngine;
use vigil::probe::{AuthBroker, ProbeExecutor, ReqwestTransport};
use vigil::report::generate_report;
use vigil::suite::{catalog, SuiteRunner};

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Conformance test-verify-fix loop for hospital operations services"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Iteration budget for the convergence loop
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Restrict the run to a single suite
    #[arg(long, value_enum)]
    suite: Option<SuiteArg>,

    /// Disable all automatic fixing; probe and report only
    #[arg(long)]
    no_fix: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SuiteArg {
    Api,
    Ui,
    Integration,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = HarnessConfig::load(cli.config.as_deref())?;

    // CLI flags override the file for this run.
    if let Some(max) = cli.max_iterations {
        config.max_iterations = max;
    }
    if let Some(suite) = cli.suite {
        config.suites.api = matches!(suite, SuiteArg::Api);
        config.suites.ui = matches!(suite, SuiteArg::Ui);
        config.suites.integration = matches!(suite, SuiteArg::Integration);
    }
    if cli.no_fix {
        config.autofix.enabled = false;
    }

    vigil::logging::init(&config.logging)?;

    tracing::info!(
        backend = %config.backend_url,
        frontend = %config.frontend_url,
        max_iterations = config.max_iterations,
        autofix = config.autofix.enabled,
        "Starting vigil run"
    );

    let executor = ProbeExecutor::new(
        Arc::new(ReqwestTransport::new()),
        &config.backend_url,
        &config.frontend_url,
        config.test_timeout(),
    );
    let runner = SuiteRunner::new(executor, AuthBroker::new(&config.auth));
    let engine = PatchEngine::new(&config.patching, config.autofix.clone());
    let suites = catalog::enabled_suites(&config.suites);

    let orchestrator = Orchestrator::new(config.clone(), runner, engine, suites);
    let report = orchestrator.run().await;

    let path = generate_report(&report, config.report.format, &config.report.output_dir).await?;

    tracing::info!(
        success = report.success,
        iterations = report.total_iterations,
        tests = report.summary.total_tests,
        failed = report.summary.total_failed,
        fixes = report.summary.total_fixes,
        report = %path.display(),
        "Run finished"
    );

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
