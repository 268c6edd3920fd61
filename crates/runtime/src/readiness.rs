//! Readiness polling.
//!
//! Logstash reports each running pipeline under `/_node/stats/pipelines`.
//! A pipeline counts as started once its entry carries a non-null `reloads`
//! object. [`ReadinessProbe::wait`] polls until every deployed pipeline is
//! started, every attempt is used up, or the container exits.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stashtest_core::metrics as m;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

/// Per-request timeout for the monitoring API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Every pipeline has started.
    Ready,
    /// Not yet; the string says what is missing.
    Waiting(String),
}

/// Returns `true` if `name` appears in the stats document with non-null `reloads`.
pub fn is_pipeline_ready(stats: &Value, name: &str) -> bool {
    stats
        .get("pipelines")
        .and_then(|pipelines| pipelines.get(name))
        .and_then(|pipeline| pipeline.get("reloads"))
        .is_some_and(|reloads| !reloads.is_null())
}

/// Polls the monitoring API until the deployed pipelines are running.
pub struct ReadinessProbe {
    client: reqwest::Client,
    url: String,
    attempts: u32,
    interval: Duration,
}

impl ReadinessProbe {
    /// Creates a probe against an explicit stats URL.
    pub fn new(url: impl Into<String>, attempts: u32, interval: Duration) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Config {
                field: "monitoring_url".to_owned(),
                reason: format!("failed to build http client: {e}"),
            })?;

        Ok(Self {
            client,
            url: url.into(),
            attempts,
            interval,
        })
    }

    /// Creates a probe from the runtime configuration.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::new(
            config.monitoring_url(),
            config.readiness_attempts,
            config.readiness_interval,
        )
    }

    /// Stats URL being polled.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Polls until all `pipelines` are started.
    ///
    /// Returns the number of attempts used. Aborts with
    /// `RuntimeError::ContainerExited` as soon as `exited` is cancelled.
    pub async fn wait(
        &self,
        pipelines: &[String],
        container: &str,
        exited: &CancellationToken,
    ) -> Result<u32, RuntimeError> {
        let mut last_status = String::from("no response yet");

        for attempt in 1..=self.attempts {
            if exited.is_cancelled() {
                return Err(RuntimeError::ContainerExited {
                    container: container.to_owned(),
                });
            }

            metrics::counter!(m::RUNTIME_READINESS_POLLS_TOTAL).increment(1);
            match self.poll(pipelines).await {
                PollStatus::Ready => {
                    info!(attempt, pipelines = pipelines.len(), "logstash pipelines have started");
                    return Ok(attempt);
                }
                PollStatus::Waiting(status) => {
                    debug!(attempt, max_attempts = self.attempts, status = %status, "waiting for logstash");
                    last_status = status;
                }
            }

            if attempt < self.attempts {
                tokio::select! {
                    _ = exited.cancelled() => {
                        return Err(RuntimeError::ContainerExited {
                            container: container.to_owned(),
                        });
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        Err(RuntimeError::NotReady {
            attempts: self.attempts,
            last_status,
        })
    }

    /// Performs a single poll.
    ///
    /// Transport errors and non-200 responses count as "not yet".
    pub async fn poll(&self, pipelines: &[String]) -> PollStatus {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => return PollStatus::Waiting(format!("monitoring API unavailable: {e}")),
        };

        if response.status() != reqwest::StatusCode::OK {
            return PollStatus::Waiting(format!("monitoring API returned {}", response.status()));
        }

        let stats: Value = match response.json().await {
            Ok(stats) => stats,
            Err(e) => return PollStatus::Waiting(format!("unreadable stats response: {e}")),
        };

        let pending: Vec<&str> = pipelines
            .iter()
            .map(String::as_str)
            .filter(|name| !is_pipeline_ready(&stats, name))
            .collect();

        if pending.is_empty() {
            PollStatus::Ready
        } else {
            PollStatus::Waiting(format!("pipelines not started: {}", pending.join(", ")))
        }
    }
}
