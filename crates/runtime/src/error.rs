//! 런타임 에러 타입
//!
//! [`RuntimeError`]는 컨테이너 실행, 준비 상태 확인, 매니페스트 처리 중 발생하는
//! 모든 에러를 표현합니다. `From<RuntimeError> for StashtestError` 변환으로
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use stashtest_core::error::{ConfigError, RuntimeFailure, StashtestError};

/// 런타임 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Docker 데몬 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 이미지 pull 실패
    #[error("failed to pull image '{image}': {reason}")]
    ImagePull {
        /// 이미지 이름
        image: String,
        /// 실패 사유
        reason: String,
    },

    /// 컨테이너 생성 또는 시작 실패
    #[error("failed to launch container '{container}': {reason}")]
    Launch {
        /// 컨테이너 이름
        container: String,
        /// 실패 사유
        reason: String,
    },

    /// 준비 상태에 도달하기 전에 컨테이너가 종료됨
    #[error("container '{container}' exited before pipelines became ready")]
    ContainerExited {
        /// 컨테이너 이름
        container: String,
    },

    /// 폴링 횟수 안에 파이프라인이 준비되지 않음
    #[error("pipelines not ready after {attempts} attempts: {last_status}")]
    NotReady {
        /// 시도 횟수
        attempts: u32,
        /// 마지막 폴링 상태
        last_status: String,
    },

    /// 파이프라인 매니페스트 처리 실패
    #[error("pipeline manifest error: {path}: {reason}")]
    Manifest {
        /// 매니페스트 또는 파이프라인 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RuntimeError> for StashtestError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Io(e) => StashtestError::Io(e),
            RuntimeError::Manifest { path, reason } => {
                StashtestError::Config(ConfigError::ParseFailed {
                    reason: format!("{path}: {reason}"),
                })
            }
            RuntimeError::Config { field, reason } => {
                StashtestError::Config(ConfigError::InvalidValue { field, reason })
            }
            other @ (RuntimeError::ContainerExited { .. } | RuntimeError::NotReady { .. }) => {
                StashtestError::Runtime(RuntimeFailure::NotReady(other.to_string()))
            }
            other => StashtestError::Runtime(RuntimeFailure::Engine(other.to_string())),
        }
    }
}
