//! Logstash container session.
//!
//! [`LogstashSession`] owns one running container: it launches the image with
//! the workspace mounted and every test port published, drains the console,
//! and waits for readiness. [`teardown`](LogstashSession::teardown) stops and
//! removes the container and stops the drain. Every step is attempted even
//! when an earlier one fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::console::ConsoleDrain;
use crate::docker::{LaunchSpec, RuntimeClient};
use crate::error::RuntimeError;
use crate::readiness::ReadinessProbe;
use crate::workspace::Workspace;

/// A launched Logstash container.
pub struct LogstashSession<C: RuntimeClient> {
    client: Arc<C>,
    container_name: String,
    container_id: Option<String>,
    stop_timeout: Duration,
    drain: Option<ConsoleDrain>,
}

impl<C: RuntimeClient> LogstashSession<C> {
    /// Launches the container and waits until every workspace pipeline has started.
    ///
    /// `ports` are the harness endpoint ports; the monitoring port is added.
    /// On failure after launch the container is torn down before returning.
    pub async fn start(
        client: Arc<C>,
        config: &RuntimeConfig,
        workspace: &Workspace,
        ports: &[u16],
        probe: &ReadinessProbe,
    ) -> Result<Self, RuntimeError> {
        client.ping().await?;
        if config.pull_image {
            info!(image = %config.image, "pulling image");
            client.pull_image(&config.image).await?;
        }

        let spec = LaunchSpec {
            image: config.image.clone(),
            name: config.container_name.clone(),
            ports: published_ports(ports, config.monitoring_port),
            mounts: workspace.mounts(),
        };
        let id = client.launch(&spec).await?;

        let mut session = Self {
            client,
            container_name: config.container_name.clone(),
            container_id: Some(id),
            stop_timeout: config.stop_timeout,
            drain: None,
        };

        info!(container = %session.container_name, url = %probe.url(), "logstash starting, waiting for pipelines");
        match session.await_ready(workspace.pipeline_ids(), probe).await {
            Ok(_) => Ok(session),
            Err(e) => {
                if let Err(teardown) = session.teardown().await {
                    warn!(error = %teardown, "teardown after failed start also failed");
                }
                Err(e)
            }
        }
    }

    async fn await_ready(
        &mut self,
        pipelines: &[String],
        probe: &ReadinessProbe,
    ) -> Result<u32, RuntimeError> {
        let Some(id) = self.container_id.as_deref() else {
            return Err(RuntimeError::ContainerExited {
                container: self.container_name.clone(),
            });
        };

        let console = self.client.attach_console(id).await?;
        let drain = ConsoleDrain::spawn(console);
        let exited = drain.exited();
        self.drain = Some(drain);

        probe.wait(pipelines, &self.container_name, &exited).await
    }

    /// Container ID while the container is up.
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Whether the container's console stream has ended.
    pub fn has_exited(&self) -> bool {
        self.drain.as_ref().is_some_and(ConsoleDrain::has_exited)
    }

    /// Stops and removes the container, then stops the console drain.
    ///
    /// Idempotent. Returns the first error after attempting every step.
    pub async fn teardown(&mut self) -> Result<(), RuntimeError> {
        let mut first_error = None;

        if let Some(id) = self.container_id.take() {
            info!(container = %self.container_name, "shutting down logstash");
            if let Err(e) = self.client.stop(&id, self.stop_timeout).await {
                warn!(container = %self.container_name, error = %e, "failed to stop container");
                first_error.get_or_insert(e);
            }
            if let Err(e) = self.client.remove(&id).await {
                warn!(container = %self.container_name, error = %e, "failed to remove container");
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut drain) = self.drain.take() {
            let forwarded = drain.shutdown().await;
            info!(lines = forwarded, "console drain stopped");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<C: RuntimeClient> Drop for LogstashSession<C> {
    fn drop(&mut self) {
        if self.container_id.is_some() {
            warn!(
                container = %self.container_name,
                "session dropped without teardown, container may still be running"
            );
        }
    }
}

/// Endpoint ports plus the monitoring port, sorted and deduplicated.
fn published_ports(ports: &[u16], monitoring_port: u16) -> Vec<u16> {
    let mut published: Vec<u16> = ports.to_vec();
    published.push(monitoring_port);
    published.sort_unstable();
    published.dedup();
    published
}
