//! Container engine abstraction for testability.
//!
//! The [`RuntimeClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardRuntime`] while tests use `MockRuntime`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ LogstashSession  │
//! └────────┬─────────┘
//!          │
//!          ▼
//!  ┌───────────────┐
//!  │ RuntimeClient │ (trait)
//!  └───────────────┘
//!        │     │
//!        ▼     ▼
//!  ┌───────┐ ┌──────┐
//!  │Bollard│ │ Mock │
//!  └───┬───┘ └──────┘
//!      │
//!      ▼
//!  Docker Daemon
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use stashtest_runtime::{BollardRuntime, RuntimeClient};
//!
//! let client = BollardRuntime::connect_local()?;
//! client.ping().await?;
//! client.pull_image("logstash:8.6.0").await?;
//! # Ok::<(), stashtest_runtime::RuntimeError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;

/// Capacity of the console line channel between the log stream and the drain.
const CONSOLE_CHANNEL_CAPACITY: usize = 1024;

/// Which console stream a line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for ConsoleStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line of container console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub stream: ConsoleStream,
    pub text: String,
}

/// A host path bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl BindMount {
    /// Renders the mount in Docker's `host:container[:ro]` bind syntax.
    pub fn to_bind_string(&self) -> String {
        let mut bind = format!("{}:{}", self.host.display(), self.container);
        if self.read_only {
            bind.push_str(":ro");
        }
        bind
    }
}

/// Everything needed to create and start the Logstash container.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Image reference, e.g. `logstash:8.6.0`
    pub image: String,
    /// Container name
    pub name: String,
    /// TCP ports published on the same host port
    pub ports: Vec<u16>,
    /// Bind mounts
    pub mounts: Vec<BindMount>,
}

/// Trait abstracting container engine operations.
///
/// The trait is `Send + Sync + 'static`, allowing the client to be shared
/// behind an `Arc` between the session and its background tasks.
///
/// # Implementations
///
/// - [`BollardRuntime`]: Production implementation using the `bollard` library
/// - `MockRuntime`: Test implementation with configurable responses (available in tests only)
///
/// # Error Handling
///
/// - **Connection errors**: `RuntimeError::DockerConnection`
/// - **Pull failures**: `RuntimeError::ImagePull`
/// - **Create/start failures**: `RuntimeError::Launch`
/// - **Everything else**: `RuntimeError::DockerApi`
///
/// Stopping or removing a container that no longer exists is not an error.
pub trait RuntimeClient: Send + Sync + 'static {
    /// Checks Docker daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Pulls an image, blocking until the pull completes.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::ImagePull` if the registry or daemon rejects the pull.
    fn pull_image(&self, image: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Creates and starts a container, returning its ID.
    ///
    /// A leftover container with the same name is removed first.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Launch` if the container cannot be created or started.
    fn launch(&self, spec: &LaunchSpec)
    -> impl Future<Output = Result<String, RuntimeError>> + Send;

    /// Follows the container's stdout and stderr.
    ///
    /// The returned receiver closes when the log stream ends, which happens
    /// when the container exits.
    fn attach_console(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<ConsoleLine>, RuntimeError>> + Send;

    /// Stops a container, killing it after `timeout`.
    fn stop(&self, id: &str, timeout: Duration)
    -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Force-removes a container.
    fn remove(&self, id: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;
}

/// Production container engine client using `bollard`.
///
/// Communicates with the Docker daemon via a Unix socket or TCP connection.
/// Internally uses `Arc<bollard::Docker>` so the console task can own a handle.
///
/// # Connection Management
///
/// - Connection timeout: 120 seconds
/// - API version: Default (auto-negotiated)
/// - Socket path: Configurable (default: platform local defaults)
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::DockerConnection` if the connection fails
    /// (e.g., socket not found, permission denied, daemon not running).
    pub fn connect_local() -> Result<Self, RuntimeError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            RuntimeError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::DockerConnection` if the connection fails.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, RuntimeError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    RuntimeError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to the configured socket, or the local default when `None`.
    pub fn connect(socket_path: Option<&str>) -> Result<Self, RuntimeError> {
        match socket_path {
            Some(path) => Self::connect_with_socket(path),
            None => Self::connect_local(),
        }
    }

    async fn create_and_start(&self, spec: &LaunchSpec) -> Result<String, RuntimeError> {
        use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
        use bollard::models::{HostConfig, PortBinding};

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for port in &spec.ports {
            let key = format!("{port}/tcp");
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_owned()),
                    host_port: Some(port.to_string()),
                }]),
            );
        }

        let binds = spec.mounts.iter().map(BindMount::to_bind_string).collect();
        let config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                binds: Some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::Launch {
                container: spec.name.clone(),
                reason: format!("create failed: {e}"),
            })?;

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            if let Err(cleanup) = self.remove(&created.id).await {
                warn!(container = %spec.name, error = %cleanup, "failed to remove unstarted container");
            }
            return Err(RuntimeError::Launch {
                container: spec.name.clone(),
                reason: format!("start failed: {e}"),
            });
        }

        Ok(created.id)
    }
}

/// Returns `true` for daemon responses with the given HTTP status.
fn has_status(err: &bollard::errors::Error, status: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == status
    )
}

impl RuntimeClient for BollardRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions::<String> {
            from_image: image.to_owned(),
            ..Default::default()
        };

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(item) = progress.next().await {
            let info = item.map_err(|e| RuntimeError::ImagePull {
                image: image.to_owned(),
                reason: e.to_string(),
            })?;
            if let Some(status) = info.status {
                debug!(image, status = %status, "pull progress");
            }
        }

        info!(image, "image pulled");
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, RuntimeError> {
        // 이전 실행이 남긴 같은 이름의 컨테이너 정리
        self.remove(&spec.name).await?;

        let id = self.create_and_start(spec).await?;
        info!(
            container = %spec.name,
            id = %id,
            image = %spec.image,
            ports = spec.ports.len(),
            "container started"
        );
        Ok(id)
    }

    async fn attach_console(&self, id: &str) -> Result<mpsc::Receiver<ConsoleLine>, RuntimeError> {
        use bollard::container::{LogOutput, LogsOptions};

        let (tx, rx) = mpsc::channel(CONSOLE_CHANNEL_CAPACITY);
        let docker = Arc::clone(&self.docker);
        let id = id.to_owned();

        tokio::spawn(async move {
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            };
            let mut logs = docker.logs(&id, Some(options));

            while let Some(item) = logs.next().await {
                let (stream, message) = match item {
                    Ok(LogOutput::StdErr { message }) => (ConsoleStream::Stderr, message),
                    Ok(LogOutput::StdOut { message } | LogOutput::Console { message }) => {
                        (ConsoleStream::Stdout, message)
                    }
                    Ok(LogOutput::StdIn { .. }) => continue,
                    Err(e) => {
                        warn!(id = %id, error = %e, "container log stream failed");
                        break;
                    }
                };

                for text in String::from_utf8_lossy(&message).lines() {
                    let line = ConsoleLine {
                        stream,
                        text: text.to_owned(),
                    };
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
            }
            debug!(id = %id, "container log stream ended");
        });

        Ok(rx)
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        use bollard::container::StopContainerOptions;

        let t = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: 이미 정지됨, 404: 이미 제거됨
            Err(e) if has_status(&e, 304) || has_status(&e, 404) => Ok(()),
            Err(e) => Err(RuntimeError::DockerApi(format!(
                "stop container {id} failed: {e}"
            ))),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        use bollard::container::RemoveContainerOptions;

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if has_status(&e, 404) => Ok(()),
            Err(e) => Err(RuntimeError::DockerApi(format!(
                "remove container {id} failed: {e}"
            ))),
        }
    }
}

/// 테스트용 Mock 런타임 클라이언트
///
/// 호출 순서를 기록하고 설정된 콘솔 출력을 돌려줍니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRuntime {
    /// 호출된 작업 기록 (`"launch:logstash-tests"` 형식)
    pub calls: std::sync::Mutex<Vec<String>>,
    /// attach_console이 돌려줄 콘솔 라인
    pub console: Vec<ConsoleLine>,
    /// 콘솔 스트림을 열어둘지 여부 (`false`면 컨테이너 종료로 간주)
    pub keep_console_open: bool,
    /// 실행 실패를 시뮬레이션할지 여부
    pub fail_launch: bool,
    /// 정지/제거 실패를 시뮬레이션할지 여부
    pub fail_teardown: bool,
    open_console: std::sync::Mutex<Option<mpsc::Sender<ConsoleLine>>>,
}

#[cfg(test)]
impl MockRuntime {
    /// 기본 동작의 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self {
            keep_console_open: true,
            ..Default::default()
        }
    }

    /// 콘솔 라인을 설정합니다.
    pub fn with_console(mut self, lines: Vec<ConsoleLine>) -> Self {
        self.console = lines;
        self
    }

    /// 콘솔 스트림이 곧바로 끝나도록 설정합니다 (컨테이너 종료).
    pub fn with_exited_container(mut self) -> Self {
        self.keep_console_open = false;
        self
    }

    /// 실행이 실패하도록 설정합니다.
    pub fn with_failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// 정지/제거가 실패하도록 설정합니다.
    pub fn with_failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    /// 기록된 호출 목록
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[cfg(test)]
impl RuntimeClient for MockRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record("ping".to_owned());
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(format!("pull:{image}"));
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, RuntimeError> {
        self.record(format!("launch:{}", spec.name));
        if self.fail_launch {
            return Err(RuntimeError::Launch {
                container: spec.name.clone(),
                reason: "mock failure".to_owned(),
            });
        }
        Ok("0123456789ab".to_owned())
    }

    async fn attach_console(&self, id: &str) -> Result<mpsc::Receiver<ConsoleLine>, RuntimeError> {
        self.record(format!("console:{id}"));
        let (tx, rx) = mpsc::channel(self.console.len().max(1));
        for line in &self.console {
            let _ = tx.try_send(line.clone());
        }
        if self.keep_console_open {
            if let Ok(mut open) = self.open_console.lock() {
                *open = Some(tx);
            }
        }
        Ok(rx)
    }

    async fn stop(&self, id: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.record(format!("stop:{id}"));
        if self.fail_teardown {
            return Err(RuntimeError::DockerApi("mock failure".to_owned()));
        }
        if let Ok(mut open) = self.open_console.lock() {
            open.take();
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove:{id}"));
        if self.fail_teardown {
            return Err(RuntimeError::DockerApi("mock failure".to_owned()));
        }
        Ok(())
    }
}
