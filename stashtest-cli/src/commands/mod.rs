//! Command handlers -- one module per subcommand
//!
//! Both subcommands share [`prepare`]: load the manifest, read the pipelines,
//! rewrite the marked segments, parse the fixtures and verify that every
//! fixture id exists in the rewritten pipelines. Nothing here touches Docker.

pub mod check;
pub mod run;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use stashtest_core::config::StashtestConfig;
use stashtest_harness::{
    ConfigTransformer, FixtureParser, Normalizer, PortRegistry, TestCase, verify_channels,
};
use stashtest_runtime::PipelineManifest;

use crate::cli::SourceArgs;
use crate::error::CliError;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stashtest.toml";

/// Loads the effective configuration.
///
/// An explicit path must exist. Without one, `./stashtest.toml` is used when
/// present, otherwise defaults plus environment overrides.
pub async fn load_config(path: Option<&Path>) -> Result<StashtestConfig, CliError> {
    let config = match path {
        Some(path) => StashtestConfig::load(path).await?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
                StashtestConfig::load(&default_path).await?
            } else {
                StashtestConfig::from_env()?
            }
        }
    };
    Ok(config)
}

/// Everything produced before deployment.
pub struct TestPlan {
    /// Rewritten pipeline sources, keyed by pipeline id
    pub pipelines: BTreeMap<String, String>,
    /// Registry holding one port per marked segment
    pub registry: PortRegistry,
    /// Parsed test cases in file order
    pub cases: Vec<TestCase>,
}

/// Reads, rewrites and verifies pipelines and fixtures.
pub async fn prepare(sources: &SourceArgs, config: &StashtestConfig) -> Result<TestPlan, CliError> {
    let prefix = sources
        .pipelines_prefix
        .as_deref()
        .unwrap_or(&config.runtime.pipelines_prefix);

    let manifest = PipelineManifest::load(&sources.config_dir).await?;
    let sources_by_id = manifest.load_pipelines(&sources.pipelines, prefix).await?;

    let mut registry = PortRegistry::new();
    let pipelines = ConfigTransformer::new()?.transform_all(&sources_by_id, &mut registry)?;

    let normalizer =
        Normalizer::new()?.with_extra_fields(config.harness.extra_ignored_fields.clone());
    let cases = FixtureParser::new()?
        .with_normalizer(normalizer)
        .load_dir(&sources.tests)
        .await?;
    verify_channels(&cases, &registry)?;

    info!(
        pipelines = pipelines.len(),
        inputs = registry.inputs().count(),
        outputs = registry.outputs().count(),
        cases = cases.len(),
        "test plan ready"
    );

    Ok(TestPlan {
        pipelines,
        registry,
        cases,
    })
}
