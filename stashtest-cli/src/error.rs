//! CLI-specific error types and exit code mapping

use stashtest_core::error::{HarnessFailure, StashtestError};
use stashtest_harness::HarnessError;
use stashtest_runtime::RuntimeError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline transformation, fixture parsing or channel verification failed.
    #[error("setup error: {0}")]
    Setup(String),

    /// At least one test case failed.
    #[error("{failed} of {total} test cases failed")]
    TestsFailed { failed: usize, total: usize },

    /// Docker or readiness failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// An input was never accepted; the run was aborted.
    #[error("submission error: {0}")]
    Submission(String),

    /// Interrupted by Ctrl-C.
    #[error("interrupted")]
    Interrupted,

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | One or more test cases failed            |
    /// | 2    | Configuration / pipeline / fixture error |
    /// | 3    | Docker or readiness error                |
    /// | 4    | Input submission aborted the run         |
    /// | 10   | IO error                                 |
    /// | 130  | Interrupted                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TestsFailed { .. } => 1,
            Self::Config(_) | Self::Setup(_) => 2,
            Self::Runtime(_) => 3,
            Self::Submission(_) => 4,
            Self::Io(_) | Self::JsonSerialize(_) => 10,
            Self::Interrupted => 130,
        }
    }
}

impl From<StashtestError> for CliError {
    fn from(err: StashtestError) -> Self {
        match err {
            StashtestError::Config(e) => Self::Config(e.to_string()),
            StashtestError::Harness(HarnessFailure::Setup(msg)) => Self::Setup(msg),
            StashtestError::Harness(HarnessFailure::Execution(msg)) => Self::Submission(msg),
            StashtestError::Runtime(e) => Self::Runtime(e.to_string()),
            StashtestError::Io(e) => Self::Io(e),
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        match err {
            // the container is up but its endpoints are not reachable
            HarnessError::Connect { .. } | HarnessError::NotConnected { .. } => {
                Self::Runtime(err.to_string())
            }
            other => StashtestError::from(other).into(),
        }
    }
}

impl From<RuntimeError> for CliError {
    fn from(err: RuntimeError) -> Self {
        StashtestError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashtest_harness::EndpointRole;

    #[test]
    fn test_failures_exit_with_one() {
        let err = CliError::TestsFailed { failed: 2, total: 5 };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "2 of 5 test cases failed");
    }

    #[test]
    fn harness_setup_errors_are_config_class() {
        let err: CliError = HarnessError::DuplicateEndpoint {
            role: EndpointRole::Input,
            id: "main".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Setup(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn submission_exhaustion_exits_with_four() {
        let err: CliError = HarnessError::SubmissionExhausted {
            case: "basic.txt#1".to_owned(),
            input_id: "main".to_owned(),
            attempts: 30,
            last_error: "connection reset".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Submission(_)));
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("basic.txt#1"));
    }

    #[test]
    fn runtime_errors_exit_with_three() {
        let err: CliError = RuntimeError::NotReady {
            attempts: 300,
            last_status: "monitoring API unavailable".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 3);

        let err: CliError = RuntimeError::DockerConnection("no socket".to_owned()).into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn manifest_errors_exit_with_two() {
        let err: CliError = RuntimeError::Manifest {
            path: "conf/pipelines.yml".to_owned(),
            reason: "missing field".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn output_connect_failure_is_runtime_class() {
        let err: CliError = HarnessError::Connect {
            role: EndpointRole::Output,
            id: "out".to_owned(),
            reason: "connection refused".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn io_error_exits_with_ten() {
        let err = CliError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn interrupted_uses_sigint_convention() {
        assert_eq!(CliError::Interrupted.exit_code(), 130);
    }
}
