//! Prometheus metrics snapshot.
//!
//! The CLI is short-lived, so instead of serving a scrape endpoint it installs
//! a Prometheus recorder and renders the counters to a file when the command
//! finishes. Enabled by `general.metrics_file` or `--metrics-file`.

use std::path::{Path, PathBuf};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use stashtest_core::config::GeneralConfig;

use crate::error::CliError;

/// Installed recorder plus the file its snapshot goes to.
pub struct MetricsSnapshot {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsSnapshot {
    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current counters in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Writes the snapshot, creating parent directories as needed.
    pub async fn write(&self) -> Result<(), CliError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, self.render()).await?;
        Ok(())
    }
}

/// Installs the global Prometheus recorder when a metrics file is configured.
///
/// Must be called at most once per process. Returns `None` when disabled.
pub fn install_recorder(config: &GeneralConfig) -> Result<Option<MetricsSnapshot>, CliError> {
    if config.metrics_file.is_empty() {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CliError::Config(format!("failed to install metrics recorder: {e}")))?;
    stashtest_core::metrics::describe_all();

    tracing::debug!(path = %config.metrics_file, "metrics recorder installed");
    Ok(Some(MetricsSnapshot {
        handle,
        path: PathBuf::from(&config.metrics_file),
    }))
}
