//! Pipeline manifest loading.
//!
//! Reads the user's `pipelines.yml` (a YAML list of `pipeline.id` /
//! `path.config` entries) and assembles each pipeline's source from the
//! `*.conf` files of its directory.
//!
//! `path.config` is written for the deployed layout, e.g.
//! `/usr/share/logstash/pipeline/ingest`. The configured prefix is removed
//! and the remainder is resolved under the local pipelines directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::RuntimeError;

/// Manifest file name inside the config directory.
pub const MANIFEST_FILE: &str = "pipelines.yml";

/// One `pipelines.yml` entry. Keys other than these two are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "pipeline.id")]
    pub id: String,
    #[serde(rename = "path.config")]
    pub path_config: String,
}

/// Parsed `pipelines.yml`.
#[derive(Debug, Clone, Default)]
pub struct PipelineManifest {
    entries: Vec<ManifestEntry>,
}

impl PipelineManifest {
    /// Loads `<config_dir>/pipelines.yml`.
    pub async fn load(config_dir: &Path) -> Result<Self, RuntimeError> {
        let path = config_dir.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RuntimeError::Manifest {
                path: path.display().to_string(),
                reason: format!("failed to read: {e}"),
            })?;
        Self::parse(&path, &content)
    }

    /// Parses manifest text. `path` is used for error messages only.
    pub fn parse(path: &Path, content: &str) -> Result<Self, RuntimeError> {
        let entries: Vec<ManifestEntry> =
            serde_yaml::from_str(content).map_err(|e| RuntimeError::Manifest {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if entry.id.trim().is_empty() {
                return Err(RuntimeError::Manifest {
                    path: path.display().to_string(),
                    reason: "pipeline.id must not be empty".to_owned(),
                });
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(RuntimeError::Manifest {
                    path: path.display().to_string(),
                    reason: format!("duplicate pipeline.id '{}'", entry.id),
                });
            }
        }

        Ok(Self { entries })
    }

    /// Manifest entries in file order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Reads every pipeline's source, keyed by pipeline id.
    pub async fn load_pipelines(
        &self,
        pipelines_dir: &Path,
        prefix: &str,
    ) -> Result<BTreeMap<String, String>, RuntimeError> {
        let mut pipelines = BTreeMap::new();
        for entry in &self.entries {
            let dir = resolve_pipeline_dir(pipelines_dir, &entry.path_config, prefix);
            let source = read_pipeline_dir(&dir).await?;
            debug!(pipeline = %entry.id, dir = %dir.display(), bytes = source.len(), "pipeline loaded");
            pipelines.insert(entry.id.clone(), source);
        }

        info!(count = pipelines.len(), dir = %pipelines_dir.display(), "pipelines loaded");
        Ok(pipelines)
    }
}

/// Maps a deployed `path.config` onto the local pipelines directory.
pub fn resolve_pipeline_dir(pipelines_dir: &Path, path_config: &str, prefix: &str) -> PathBuf {
    let relative = path_config.strip_prefix(prefix).unwrap_or(path_config);
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        pipelines_dir.to_path_buf()
    } else {
        pipelines_dir.join(relative)
    }
}

/// Concatenates the regular `*.conf` files of `dir` in file-name order, joined by `\n`.
pub async fn read_pipeline_dir(dir: &Path) -> Result<String, RuntimeError> {
    let manifest_error = |reason: String| RuntimeError::Manifest {
        path: dir.display().to_string(),
        reason,
    };

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| manifest_error(format!("failed to read pipeline directory: {e}")))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| manifest_error(format!("failed to read directory entry: {e}")))?
    {
        let path = entry.path();
        let is_conf = path.extension().is_some_and(|ext| ext == "conf");
        if !is_conf {
            continue;
        }
        let file_type = entry.file_type().await?;
        let is_file = if file_type.is_symlink() {
            tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_file())
        } else {
            file_type.is_file()
        };
        if is_file {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut parts = Vec::with_capacity(files.len());
    for file in &files {
        let content = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| RuntimeError::Manifest {
                path: file.display().to_string(),
                reason: format!("failed to read: {e}"),
            })?;
        parts.push(content);
    }

    Ok(parts.join("\n"))
}
