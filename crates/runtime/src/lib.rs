//! stashtest runtime
//!
//! Runs the rewritten pipelines inside a Logstash container and reports when
//! they are ready to receive test input.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`RuntimeError`)
//! - [`config`]: Runtime configuration (`RuntimeConfig`, builder)
//! - [`manifest`]: User `pipelines.yml` loading and pipeline directory scanning
//! - [`workspace`]: Generated `logstash.yml` / `pipelines.yml` / pipeline files
//! - [`docker`]: Container engine abstraction (`RuntimeClient` trait, `BollardRuntime`)
//! - [`console`]: Container console draining (`ConsoleDrain`)
//! - [`readiness`]: Monitoring API polling (`ReadinessProbe`)
//! - [`session`]: Launch, readiness and teardown (`LogstashSession`)
//!
//! # Architecture
//!
//! ```text
//! pipelines.yml --> PipelineManifest --> pipeline sources
//!                                             |
//!                              (rewritten by the harness)
//!                                             |
//!                                         Workspace --bind mounts--+
//!                                                                   |
//! LogstashSession::start --> RuntimeClient.launch() <---------------+
//!        |                         |
//!        |                   attach_console --> ConsoleDrain --exited--+
//!        |                                                             |
//!        +--> ReadinessProbe.wait() <----------------------------------+
//! ```

pub mod config;
pub mod console;
pub mod docker;
pub mod error;
pub mod manifest;
pub mod readiness;
pub mod session;
pub mod workspace;

// --- Public API Re-exports ---

// Configuration
pub use config::{RuntimeConfig, RuntimeConfigBuilder};

// Error
pub use error::RuntimeError;

// Manifest
pub use manifest::{ManifestEntry, PipelineManifest};

// Workspace
pub use workspace::Workspace;

// Container engine
pub use docker::{BindMount, BollardRuntime, ConsoleLine, ConsoleStream, LaunchSpec, RuntimeClient};

// Console
pub use console::ConsoleDrain;

// Readiness
pub use readiness::{PollStatus, ReadinessProbe, is_pipeline_ready};

// Session
pub use session::LogstashSession;
