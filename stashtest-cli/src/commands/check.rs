//! `stashtest check` command handler

use std::io::Write;

use serde::Serialize;

use stashtest_core::config::StashtestConfig;

use crate::cli::CheckArgs;
use crate::commands::{TestPlan, prepare};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `check` command.
pub async fn execute(
    args: CheckArgs,
    config: &StashtestConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let plan = prepare(&args.sources, config).await?;
    writer.render(&CheckReport::from_plan(&plan))
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub pipelines: Vec<String>,
    pub endpoints: Vec<EndpointEntry>,
    pub port_forwarding: String,
    pub cases: Vec<CaseEntry>,
}

#[derive(Debug, Serialize)]
pub struct EndpointEntry {
    pub role: String,
    pub id: String,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct CaseEntry {
    pub name: String,
    pub input: String,
    pub outputs: Vec<String>,
}

impl CheckReport {
    pub fn from_plan(plan: &TestPlan) -> Self {
        let mut endpoints: Vec<EndpointEntry> = plan
            .registry
            .inputs()
            .chain(plan.registry.outputs())
            .map(|e| EndpointEntry {
                role: e.role.to_string(),
                id: e.id.clone(),
                port: e.port,
            })
            .collect();
        endpoints.sort_by_key(|e| e.port);

        let cases = plan
            .cases
            .iter()
            .map(|c| CaseEntry {
                name: c.name.clone(),
                input: c.input_id.clone(),
                outputs: c.output_ids().map(str::to_owned).collect(),
            })
            .collect();

        Self {
            pipelines: plan.pipelines.keys().cloned().collect(),
            endpoints,
            port_forwarding: plan.registry.port_forwarding_spec().to_string(),
            cases,
        }
    }
}

impl Render for CheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Pipelines: {}", self.pipelines.join(", ").bold())?;
        writeln!(w)?;

        writeln!(w, "{:<8} {:<30} {:<6}", "Role", "Id", "Port")?;
        writeln!(w, "{}", "-".repeat(46))?;
        for e in &self.endpoints {
            writeln!(w, "{:<8} {:<30} {:<6}", e.role, e.id, e.port)?;
        }
        writeln!(w)?;
        writeln!(w, "Port forwarding: {}", self.port_forwarding)?;
        writeln!(w)?;

        if self.cases.is_empty() {
            writeln!(w, "{}", "No test cases found.".yellow())?;
        } else {
            for c in &self.cases {
                let outputs = if c.outputs.is_empty() {
                    "(no output expected)".dimmed().to_string()
                } else {
                    c.outputs.join(", ")
                };
                writeln!(w, "{} {} -> {}", c.name.bold(), c.input, outputs)?;
            }
        }

        writeln!(
            w,
            "{}",
            format!("OK: {} test cases verified", self.cases.len()).green()
        )
    }
}
