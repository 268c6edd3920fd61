//! 하네스 설정
//!
//! [`HarnessConfig`]는 core의 [`HarnessSection`](stashtest_core::config::HarnessSection)을
//! 기반으로 실행 프로토콜이 사용하는 타임아웃과 한도를 `Duration` 단위로 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use stashtest_core::config::StashtestConfig;
//! use stashtest_harness::config::HarnessConfig;
//!
//! let core_config = StashtestConfig::default();
//! let config = HarnessConfig::from_core(&core_config.harness);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::HarnessError;

/// 하네스 설정
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// 엔드포인트 접속 호스트
    pub host: String,
    /// 입력 제출 최대 시도 횟수
    pub submit_attempts: u32,
    /// 입력 제출 재시도 간격
    pub submit_retry_interval: Duration,
    /// 엔드포인트 연결 및 HTTP 요청 타임아웃
    pub connect_timeout: Duration,
    /// 제출 이후 출력 대기 데드라인
    pub output_deadline: Duration,
    /// 기대 출력이 없는 케이스의 침묵 확인 시간
    pub silence_window: Duration,
    /// 출력 한 줄의 최대 크기 (바이트)
    pub max_message_size: usize,
    /// 비교 실패 시 정규형을 기록할 디렉토리
    pub artifact_dir: PathBuf,
    /// 기본 집합 외에 추가로 제거할 필드
    pub extra_ignored_fields: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::from_core(&stashtest_core::config::HarnessSection::default())
    }
}

impl HarnessConfig {
    /// core의 `HarnessSection`에서 하네스 설정을 생성합니다.
    pub fn from_core(core: &stashtest_core::config::HarnessSection) -> Self {
        Self {
            host: core.host.clone(),
            submit_attempts: core.submit_attempts,
            submit_retry_interval: Duration::from_millis(core.submit_retry_interval_ms),
            connect_timeout: Duration::from_secs(core.connect_timeout_secs),
            output_deadline: Duration::from_secs(core.output_deadline_secs),
            silence_window: Duration::from_secs(core.silence_window_secs),
            max_message_size: core.max_message_size,
            artifact_dir: PathBuf::from(&core.artifact_dir),
            extra_ignored_fields: core.extra_ignored_fields.clone(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.host.trim().is_empty() {
            return Err(HarnessError::Config {
                field: "host".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.submit_attempts == 0 {
            return Err(HarnessError::Config {
                field: "submit_attempts".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("output_deadline", self.output_deadline),
            ("silence_window", self.silence_window),
        ] {
            if value.is_zero() {
                return Err(HarnessError::Config {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        if self.max_message_size == 0 {
            return Err(HarnessError::Config {
                field: "max_message_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.extra_ignored_fields.iter().any(|f| f.is_empty()) {
            return Err(HarnessError::Config {
                field: "extra_ignored_fields".to_owned(),
                reason: "field names must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 하네스 설정 빌더
#[derive(Default)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 접속 호스트를 설정합니다.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// 입력 제출 최대 시도 횟수를 설정합니다.
    pub fn submit_attempts(mut self, attempts: u32) -> Self {
        self.config.submit_attempts = attempts;
        self
    }

    /// 입력 제출 재시도 간격을 설정합니다.
    pub fn submit_retry_interval(mut self, interval: Duration) -> Self {
        self.config.submit_retry_interval = interval;
        self
    }

    /// 연결/요청 타임아웃을 설정합니다.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// 출력 대기 데드라인을 설정합니다.
    pub fn output_deadline(mut self, deadline: Duration) -> Self {
        self.config.output_deadline = deadline;
        self
    }

    /// 침묵 확인 시간을 설정합니다.
    pub fn silence_window(mut self, window: Duration) -> Self {
        self.config.silence_window = window;
        self
    }

    /// 출력 한 줄의 최대 크기를 설정합니다.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// 아티팩트 디렉토리를 설정합니다.
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = dir.into();
        self
    }

    /// 추가 제거 필드를 설정합니다.
    pub fn extra_ignored_fields(mut self, fields: Vec<String>) -> Self {
        self.config.extra_ignored_fields = fields;
        self
    }

    /// 설정을 검증하고 `HarnessConfig`를 생성합니다.
    pub fn build(self) -> Result<HarnessConfig, HarnessError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        HarnessConfig::default().validate().unwrap();
    }

    #[test]
    fn default_matches_protocol_constants() {
        let config = HarnessConfig::default();
        assert_eq!(config.submit_attempts, 30);
        assert_eq!(config.submit_retry_interval, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.output_deadline, Duration::from_secs(15));
        assert_eq!(config.silence_window, Duration::from_secs(2));
    }

    #[test]
    fn from_core_preserves_values() {
        let core = stashtest_core::config::HarnessSection {
            host: "127.0.0.1".to_owned(),
            submit_retry_interval_ms: 250,
            extra_ignored_fields: vec!["event".to_owned()],
            ..Default::default()
        };
        let config = HarnessConfig::from_core(&core);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.submit_retry_interval, Duration::from_millis(250));
        assert_eq!(config.extra_ignored_fields, vec!["event"]);
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = HarnessConfigBuilder::new()
            .host("127.0.0.1")
            .submit_attempts(3)
            .output_deadline(Duration::from_millis(500))
            .artifact_dir("/tmp/artifacts")
            .build()
            .unwrap();
        assert_eq!(config.submit_attempts, 3);
        assert_eq!(config.output_deadline, Duration::from_millis(500));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/artifacts"));
    }

    #[test]
    fn builder_rejects_zero_deadline() {
        let result = HarnessConfigBuilder::new()
            .output_deadline(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_empty_ignored_field() {
        let result = HarnessConfigBuilder::new()
            .extra_ignored_fields(vec![String::new()])
            .build();
        assert!(result.is_err());
    }
}
