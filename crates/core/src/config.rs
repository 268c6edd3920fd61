//! 설정 관리: stashtest.toml 파싱 및 런타임 설정
//!
//! [`StashtestConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`STASHTEST_RUNTIME_IMAGE=logstash:8.6.0` 형식)
//! 3. 설정 파일 (`stashtest.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), stashtest_core::error::StashtestError> {
//! use stashtest_core::config::StashtestConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = StashtestConfig::load("stashtest.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = StashtestConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, StashtestError};

/// stashtest 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StashtestConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 런타임(컨테이너) 설정
    #[serde(default)]
    pub runtime: RuntimeSection,
    /// 테스트 하네스 설정
    #[serde(default)]
    pub harness: HarnessSection,
}

impl StashtestConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StashtestError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일 없이 기본값 + 환경변수 오버라이드로 설정을 만듭니다.
    pub fn from_env() -> Result<Self, StashtestError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, StashtestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StashtestError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                StashtestError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, StashtestError> {
        toml::from_str(toml_str).map_err(|e| {
            StashtestError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `STASHTEST_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "STASHTEST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "STASHTEST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.metrics_file, "STASHTEST_GENERAL_METRICS_FILE");

        // Runtime
        override_string(&mut self.runtime.image, "STASHTEST_RUNTIME_IMAGE");
        override_string(
            &mut self.runtime.container_name,
            "STASHTEST_RUNTIME_CONTAINER_NAME",
        );
        override_string(
            &mut self.runtime.docker_socket,
            "STASHTEST_RUNTIME_DOCKER_SOCKET",
        );
        override_string(
            &mut self.runtime.pipelines_prefix,
            "STASHTEST_RUNTIME_PIPELINES_PREFIX",
        );
        override_u16(
            &mut self.runtime.monitoring_port,
            "STASHTEST_RUNTIME_MONITORING_PORT",
        );
        override_u32(
            &mut self.runtime.readiness_attempts,
            "STASHTEST_RUNTIME_READINESS_ATTEMPTS",
        );
        override_u64(
            &mut self.runtime.readiness_interval_secs,
            "STASHTEST_RUNTIME_READINESS_INTERVAL_SECS",
        );
        override_u64(
            &mut self.runtime.stop_timeout_secs,
            "STASHTEST_RUNTIME_STOP_TIMEOUT_SECS",
        );
        override_bool(&mut self.runtime.pull_image, "STASHTEST_RUNTIME_PULL_IMAGE");

        // Harness
        override_string(&mut self.harness.host, "STASHTEST_HARNESS_HOST");
        override_u32(
            &mut self.harness.submit_attempts,
            "STASHTEST_HARNESS_SUBMIT_ATTEMPTS",
        );
        override_u64(
            &mut self.harness.submit_retry_interval_ms,
            "STASHTEST_HARNESS_SUBMIT_RETRY_INTERVAL_MS",
        );
        override_u64(
            &mut self.harness.connect_timeout_secs,
            "STASHTEST_HARNESS_CONNECT_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.harness.output_deadline_secs,
            "STASHTEST_HARNESS_OUTPUT_DEADLINE_SECS",
        );
        override_u64(
            &mut self.harness.silence_window_secs,
            "STASHTEST_HARNESS_SILENCE_WINDOW_SECS",
        );
        override_usize(
            &mut self.harness.max_message_size,
            "STASHTEST_HARNESS_MAX_MESSAGE_SIZE",
        );
        override_string(
            &mut self.harness.artifact_dir,
            "STASHTEST_HARNESS_ARTIFACT_DIR",
        );
        override_csv(
            &mut self.harness.extra_ignored_fields,
            "STASHTEST_HARNESS_EXTRA_IGNORED_FIELDS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StashtestError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.runtime.image.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runtime.image".to_owned(),
                reason: "image must not be empty".to_owned(),
            }
            .into());
        }

        if self.runtime.monitoring_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.monitoring_port".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.runtime.readiness_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.readiness_attempts".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.harness.submit_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "harness.submit_attempts".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        // 모든 대기는 유한해야 하므로 0초 데드라인은 허용하지 않음
        for (field, value) in [
            ("harness.connect_timeout_secs", self.harness.connect_timeout_secs),
            ("harness.output_deadline_secs", self.harness.output_deadline_secs),
            ("harness.silence_window_secs", self.harness.silence_window_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        if self.harness.max_message_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "harness.max_message_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 실행 종료 시 Prometheus 텍스트 형식 메트릭을 기록할 파일 (빈 문자열이면 비활성)
    pub metrics_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            metrics_file: String::new(),
        }
    }
}

/// 런타임(컨테이너) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Logstash가 포함된 Docker 이미지
    pub image: String,
    /// 컨테이너 이름
    pub container_name: String,
    /// Docker 소켓 경로 (빈 문자열이면 플랫폼 기본값)
    pub docker_socket: String,
    /// pipelines.yml의 path.config에서 제거할 접두사
    pub pipelines_prefix: String,
    /// 모니터링 API 포트
    pub monitoring_port: u16,
    /// 준비 상태 폴링 최대 횟수
    pub readiness_attempts: u32,
    /// 준비 상태 폴링 간격 (초)
    pub readiness_interval_secs: u64,
    /// 컨테이너 종료 유예 시간 (초)
    pub stop_timeout_secs: u64,
    /// 실행 전 이미지 pull 여부
    pub pull_image: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            image: "logstash:8.6.0".to_owned(),
            container_name: "logstash-tests".to_owned(),
            docker_socket: String::new(),
            pipelines_prefix: "/usr/share/logstash/pipeline".to_owned(),
            monitoring_port: 9600,
            readiness_attempts: 300,
            readiness_interval_secs: 1,
            stop_timeout_secs: 10,
            pull_image: true,
        }
    }
}

/// 테스트 하네스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSection {
    /// 엔드포인트 접속 호스트
    pub host: String,
    /// 입력 제출 최대 시도 횟수
    pub submit_attempts: u32,
    /// 입력 제출 재시도 간격 (밀리초)
    pub submit_retry_interval_ms: u64,
    /// 엔드포인트 연결/읽기 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 케이스당 출력 대기 데드라인 (초)
    pub output_deadline_secs: u64,
    /// 출력이 없는 케이스의 침묵 확인 시간 (초)
    pub silence_window_secs: u64,
    /// 출력 한 줄의 최대 크기 (바이트)
    pub max_message_size: usize,
    /// 비교 실패 시 정규형을 기록할 디렉토리
    pub artifact_dir: String,
    /// 비교 전에 추가로 제거할 필드
    pub extra_ignored_fields: Vec<String>,
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            submit_attempts: 30,
            submit_retry_interval_ms: 1000,
            connect_timeout_secs: 10,
            output_deadline_secs: 15,
            silence_window_secs: 2,
            max_message_size: 1024 * 1024, // 1MB
            artifact_dir: "stashtest-artifacts".to_owned(),
            extra_ignored_fields: Vec::new(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
