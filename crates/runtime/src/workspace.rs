//! Generated runtime workspace.
//!
//! A scratch directory holding everything mounted into the container:
//!
//! ```text
//! <workspace>/
//!   logstash.yml      -> /usr/share/logstash/config/logstash.yml
//!   pipelines.yml     -> /usr/share/logstash/config/pipelines.yml
//!   pipelines/<id>    -> /usr/share/logstash/pipeline/<id>
//! ```
//!
//! The directory is removed when the [`Workspace`] is dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::docker::BindMount;
use crate::error::RuntimeError;

/// Logstash home inside the image.
pub const LOGSTASH_HOME: &str = "/usr/share/logstash";

/// Deployed pipeline directory inside the image.
pub const CONTAINER_PIPELINE_DIR: &str = "/usr/share/logstash/pipeline";

/// Settings written to `logstash.yml`.
#[derive(Debug, Clone, Serialize)]
struct LogstashSettings {
    #[serde(rename = "config.reload.automatic")]
    reload_automatic: bool,
    #[serde(rename = "http.host")]
    http_host: &'static str,
    #[serde(rename = "log.level")]
    log_level: &'static str,
    #[serde(rename = "pipeline.workers")]
    workers: u32,
    #[serde(rename = "pipeline.ecs_compatibility")]
    ecs_compatibility: &'static str,
}

impl Default for LogstashSettings {
    fn default() -> Self {
        Self {
            reload_automatic: false,
            http_host: "0.0.0.0",
            log_level: "error",
            workers: 1,
            ecs_compatibility: "disabled",
        }
    }
}

/// One generated `pipelines.yml` entry.
#[derive(Debug, Clone, Serialize)]
struct PipelineEntry {
    #[serde(rename = "pipeline.id")]
    id: String,
    #[serde(rename = "pipeline.workers")]
    workers: u32,
    #[serde(rename = "path.config")]
    path_config: String,
    #[serde(rename = "config.reload.automatic")]
    reload_automatic: bool,
}

/// Renders `logstash.yml`.
pub fn render_logstash_yml() -> Result<String, RuntimeError> {
    to_yaml(&LogstashSettings::default(), "logstash.yml")
}

/// Renders `pipelines.yml` for the given pipeline ids.
pub fn render_pipelines_yml<'a>(
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<String, RuntimeError> {
    let entries: Vec<PipelineEntry> = ids
        .into_iter()
        .map(|id| PipelineEntry {
            id: id.to_owned(),
            workers: 1,
            path_config: format!("{CONTAINER_PIPELINE_DIR}/{id}"),
            reload_automatic: false,
        })
        .collect();
    to_yaml(&entries, "pipelines.yml")
}

fn to_yaml<T: Serialize>(value: &T, name: &str) -> Result<String, RuntimeError> {
    serde_yaml::to_string(value).map_err(|e| RuntimeError::Manifest {
        path: name.to_owned(),
        reason: format!("failed to render: {e}"),
    })
}

/// Scratch directory mounted into the container.
pub struct Workspace {
    dir: tempfile::TempDir,
    pipeline_ids: Vec<String>,
}

impl Workspace {
    /// Writes a workspace under the current directory.
    ///
    /// The system temp dir is avoided because Docker Desktop only shares
    /// directories under the user's home by default.
    pub async fn create(pipelines: &BTreeMap<String, String>) -> Result<Self, RuntimeError> {
        let parent = std::env::current_dir()?;
        Self::create_in(&parent, pipelines).await
    }

    /// Writes a workspace under `parent`.
    pub async fn create_in(
        parent: &Path,
        pipelines: &BTreeMap<String, String>,
    ) -> Result<Self, RuntimeError> {
        for id in pipelines.keys() {
            if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
                return Err(RuntimeError::Manifest {
                    path: id.clone(),
                    reason: "pipeline id cannot be used as a file name".to_owned(),
                });
            }
        }

        let dir = tempfile::Builder::new()
            .prefix(".stashtest-")
            .tempdir_in(parent)?;

        let pipeline_dir = dir.path().join("pipelines");
        tokio::fs::create_dir(&pipeline_dir).await?;
        for (id, source) in pipelines {
            tokio::fs::write(pipeline_dir.join(id), source).await?;
            debug!(pipeline = %id, bytes = source.len(), "pipeline written");
        }

        tokio::fs::write(dir.path().join("logstash.yml"), render_logstash_yml()?).await?;
        tokio::fs::write(
            dir.path().join("pipelines.yml"),
            render_pipelines_yml(pipelines.keys().map(String::as_str))?,
        )
        .await?;

        info!(path = %dir.path().display(), pipelines = pipelines.len(), "runtime workspace written");
        Ok(Self {
            dir,
            pipeline_ids: pipelines.keys().cloned().collect(),
        })
    }

    /// Workspace root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Deployed pipeline ids, sorted.
    pub fn pipeline_ids(&self) -> &[String] {
        &self.pipeline_ids
    }

    /// Bind mounts for the container.
    pub fn mounts(&self) -> Vec<BindMount> {
        let root = self.dir.path();
        vec![
            BindMount {
                host: root.join("logstash.yml"),
                container: format!("{LOGSTASH_HOME}/config/logstash.yml"),
                read_only: true,
            },
            BindMount {
                host: root.join("pipelines.yml"),
                container: format!("{LOGSTASH_HOME}/config/pipelines.yml"),
                read_only: true,
            },
            BindMount {
                host: root.join("pipelines"),
                container: CONTAINER_PIPELINE_DIR.to_owned(),
                read_only: true,
            },
        ]
    }

    /// Path of a generated file relative to the workspace root.
    pub fn file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }
}
