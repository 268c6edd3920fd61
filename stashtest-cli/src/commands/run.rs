//! `stashtest run` command handler
//!
//! prepare -> write workspace -> start container -> connect endpoints ->
//! run cases -> teardown -> report.
//!
//! Teardown runs on every path once the container has been launched. A
//! teardown failure is logged and never replaces the run's own result.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use stashtest_core::config::StashtestConfig;
use stashtest_harness::{CaseFailure, HarnessConfig, PortRegistry, RunReport, TestCase, TestRunner};
use stashtest_runtime::{
    BollardRuntime, LogstashSession, ReadinessProbe, RuntimeClient, RuntimeConfig, Workspace,
};

use crate::cli::RunArgs;
use crate::commands::prepare;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    config: &StashtestConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut plan = prepare(&args.sources, config).await?;
    let runtime_config = runtime_config(&args, config)?;
    let runner = TestRunner::from_config(harness_config(&args, config)?)?;

    let workspace = Workspace::create(&plan.pipelines).await?;
    let client = Arc::new(BollardRuntime::connect(
        runtime_config.docker_socket.as_deref(),
    )?);
    let probe = ReadinessProbe::from_config(&runtime_config)?;
    let ports = plan.registry.port_forwarding_spec();

    info!(
        image = %runtime_config.image,
        ports = %ports,
        workspace = %workspace.path().display(),
        "starting logstash"
    );

    let start = LogstashSession::start(
        Arc::clone(&client),
        &runtime_config,
        &workspace,
        &ports.ports,
        &probe,
    );
    let mut session = tokio::select! {
        result = start => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted during startup, removing container");
            if let Err(e) = client.remove(&runtime_config.container_name).await {
                warn!(error = %e, "failed to remove container");
            }
            return Err(CliError::Interrupted);
        }
    };

    let outcome = tokio::select! {
        result = run_cases(&runner, &mut plan.registry, &plan.cases) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting down");
            Err(CliError::Interrupted)
        }
    };

    plan.registry.disconnect_outputs();
    if let Err(e) = session.teardown().await {
        warn!(error = %e, "teardown failed");
    }
    drop(workspace);

    let report = outcome?;
    let summary = RunSummary::new(&runtime_config.image, &report);
    writer.render(&summary)?;

    if report.passed() {
        Ok(())
    } else {
        Err(CliError::TestsFailed {
            failed: report.failed_count(),
            total: report.cases.len(),
        })
    }
}

async fn run_cases(
    runner: &TestRunner,
    registry: &mut PortRegistry,
    cases: &[TestCase],
) -> Result<RunReport, CliError> {
    info!("connecting to test endpoints and running all tests");
    let mut mux = registry.connect(runner.config()).await?;
    let report = runner.run(registry, &mut mux, cases).await?;
    Ok(report)
}

/// Runtime settings with command-line overrides applied.
pub fn runtime_config(args: &RunArgs, config: &StashtestConfig) -> Result<RuntimeConfig, CliError> {
    let mut runtime = RuntimeConfig::from_core(&config.runtime);
    if let Some(image) = &args.image {
        runtime.image = image.clone();
    }
    if let Some(prefix) = &args.sources.pipelines_prefix {
        runtime.pipelines_prefix = prefix.clone();
    }
    if args.no_pull {
        runtime.pull_image = false;
    }
    runtime.validate()?;
    Ok(runtime)
}

/// Harness settings with command-line overrides applied.
pub fn harness_config(args: &RunArgs, config: &StashtestConfig) -> Result<HarnessConfig, CliError> {
    let mut harness = HarnessConfig::from_core(&config.harness);
    if let Some(dir) = &args.artifact_dir {
        harness.artifact_dir = dir.clone();
    }
    harness.validate()?;
    Ok(harness)
}

/// Report payload for `run`.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub image: String,
    pub passed: usize,
    pub failed: usize,
    #[serde(flatten)]
    pub report: &'a RunReport,
}

impl<'a> RunSummary<'a> {
    pub fn new(image: &str, report: &'a RunReport) -> Self {
        Self {
            image: image.to_owned(),
            passed: report.passed_count(),
            failed: report.failed_count(),
            report,
        }
    }
}

impl Render for RunSummary<'_> {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for case in &self.report.cases {
            if case.passed() {
                writeln!(
                    w,
                    "{} {} ({} ms)",
                    "PASS".green().bold(),
                    case.name,
                    case.duration_ms
                )?;
                continue;
            }

            writeln!(w, "{} {}", "FAIL".red().bold(), case.name.bold())?;
            for failure in &case.failures {
                render_failure(w, failure)?;
            }
        }

        writeln!(w)?;
        let totals = format!("{} passed, {} failed", self.passed, self.failed);
        if self.failed == 0 {
            writeln!(w, "Summary: {}", totals.green().bold())
        } else {
            writeln!(w, "Summary: {}", totals.red().bold())
        }
    }
}

fn render_failure(w: &mut dyn Write, failure: &CaseFailure) -> std::io::Result<()> {
    use colored::Colorize;

    writeln!(w, "  - {failure}")?;
    if let CaseFailure::Comparison {
        expected_path,
        actual_path,
        diff,
        ..
    } = failure
    {
        if let Some(path) = expected_path {
            writeln!(w, "      expected: {}", path.display())?;
        }
        if let Some(path) = actual_path {
            writeln!(w, "      actual:   {}", path.display())?;
        }
        for line in diff.lines() {
            let line = if line.starts_with("- ") {
                line.red().to_string()
            } else if line.starts_with("+ ") {
                line.green().to_string()
            } else {
                line.dimmed().to_string()
            };
            writeln!(w, "      {line}")?;
        }
    }
    Ok(())
}
