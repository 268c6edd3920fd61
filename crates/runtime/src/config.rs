//! 런타임 설정
//!
//! [`RuntimeConfig`]는 core의 [`RuntimeSection`](stashtest_core::config::RuntimeSection)을
//! 기반으로 컨테이너 실행과 준비 상태 폴링에 필요한 값을 `Duration` 단위로 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use stashtest_core::config::StashtestConfig;
//! use stashtest_runtime::config::RuntimeConfig;
//!
//! let core_config = StashtestConfig::default();
//! let config = RuntimeConfig::from_core(&core_config.runtime);
//! ```

use std::time::Duration;

use crate::error::RuntimeError;

/// 준비 상태 폴링 최대 횟수 상한
const MAX_READINESS_ATTEMPTS: u32 = 10_000;

/// 런타임 설정
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Logstash가 포함된 Docker 이미지
    pub image: String,
    /// 컨테이너 이름
    pub container_name: String,
    /// Docker 소켓 경로 (`None`이면 플랫폼 기본값)
    pub docker_socket: Option<String>,
    /// 매니페스트의 `path.config`에서 제거할 접두사
    pub pipelines_prefix: String,
    /// 모니터링 API 포트
    pub monitoring_port: u16,
    /// 준비 상태 폴링 최대 횟수
    pub readiness_attempts: u32,
    /// 준비 상태 폴링 간격
    pub readiness_interval: Duration,
    /// 컨테이너 종료 유예 시간
    pub stop_timeout: Duration,
    /// 실행 전 이미지 pull 여부
    pub pull_image: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_core(&stashtest_core::config::RuntimeSection::default())
    }
}

impl RuntimeConfig {
    /// core의 `RuntimeSection`에서 런타임 설정을 생성합니다.
    ///
    /// 빈 `docker_socket`은 플랫폼 기본 소켓을 뜻합니다.
    pub fn from_core(core: &stashtest_core::config::RuntimeSection) -> Self {
        let docker_socket = if core.docker_socket.trim().is_empty() {
            None
        } else {
            Some(core.docker_socket.clone())
        };

        Self {
            image: core.image.clone(),
            container_name: core.container_name.clone(),
            docker_socket,
            pipelines_prefix: core.pipelines_prefix.clone(),
            monitoring_port: core.monitoring_port,
            readiness_attempts: core.readiness_attempts,
            readiness_interval: Duration::from_secs(core.readiness_interval_secs),
            stop_timeout: Duration::from_secs(core.stop_timeout_secs),
            pull_image: core.pull_image,
        }
    }

    /// 모니터링 API의 파이프라인 통계 URL
    pub fn monitoring_url(&self) -> String {
        format!(
            "http://localhost:{}/_node/stats/pipelines",
            self.monitoring_port
        )
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.image.trim().is_empty() {
            return Err(RuntimeError::Config {
                field: "image".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.container_name.trim().is_empty() {
            return Err(RuntimeError::Config {
                field: "container_name".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.monitoring_port == 0 {
            return Err(RuntimeError::Config {
                field: "monitoring_port".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.readiness_attempts == 0 || self.readiness_attempts > MAX_READINESS_ATTEMPTS {
            return Err(RuntimeError::Config {
                field: "readiness_attempts".to_owned(),
                reason: format!("must be between 1 and {MAX_READINESS_ATTEMPTS}"),
            });
        }

        Ok(())
    }
}

/// 런타임 설정 빌더
#[derive(Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// Docker 이미지를 설정합니다.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// 컨테이너 이름을 설정합니다.
    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.config.container_name = name.into();
        self
    }

    /// Docker 소켓 경로를 설정합니다.
    pub fn docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.config.docker_socket = Some(socket.into());
        self
    }

    /// 파이프라인 경로 접두사를 설정합니다.
    pub fn pipelines_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.pipelines_prefix = prefix.into();
        self
    }

    /// 모니터링 API 포트를 설정합니다.
    pub fn monitoring_port(mut self, port: u16) -> Self {
        self.config.monitoring_port = port;
        self
    }

    /// 준비 상태 폴링 횟수를 설정합니다.
    pub fn readiness_attempts(mut self, attempts: u32) -> Self {
        self.config.readiness_attempts = attempts;
        self
    }

    /// 준비 상태 폴링 간격을 설정합니다.
    pub fn readiness_interval(mut self, interval: Duration) -> Self {
        self.config.readiness_interval = interval;
        self
    }

    /// 종료 유예 시간을 설정합니다.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout = timeout;
        self
    }

    /// 이미지 pull 여부를 설정합니다.
    pub fn pull_image(mut self, pull: bool) -> Self {
        self.config.pull_image = pull;
        self
    }

    /// 설정을 검증하고 `RuntimeConfig`를 생성합니다.
    pub fn build(self) -> Result<RuntimeConfig, RuntimeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_match_logstash_image() {
        let config = RuntimeConfig::default();
        assert_eq!(config.image, "logstash:8.6.0");
        assert_eq!(config.container_name, "logstash-tests");
        assert_eq!(config.docker_socket, None);
        assert_eq!(config.readiness_attempts, 300);
        assert_eq!(config.readiness_interval, Duration::from_secs(1));
        assert_eq!(
            config.monitoring_url(),
            "http://localhost:9600/_node/stats/pipelines"
        );
    }

    #[test]
    fn from_core_keeps_explicit_socket() {
        let core = stashtest_core::config::RuntimeSection {
            docker_socket: "/run/user/1000/docker.sock".to_owned(),
            stop_timeout_secs: 3,
            ..Default::default()
        };
        let config = RuntimeConfig::from_core(&core);
        assert_eq!(
            config.docker_socket.as_deref(),
            Some("/run/user/1000/docker.sock")
        );
        assert_eq!(config.stop_timeout, Duration::from_secs(3));
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let result = RuntimeConfigBuilder::new().readiness_attempts(0).build();
        assert!(matches!(result, Err(RuntimeError::Config { .. })));
    }

    #[test]
    fn builder_rejects_empty_image() {
        let result = RuntimeConfigBuilder::new().image("  ").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let config = RuntimeConfigBuilder::new()
            .image("docker.elastic.co/logstash/logstash:8.13.0")
            .monitoring_port(19600)
            .pull_image(false)
            .build()
            .unwrap();
        assert_eq!(config.monitoring_port, 19600);
        assert!(!config.pull_image);
        assert!(config.monitoring_url().contains(":19600/"));
    }
}
