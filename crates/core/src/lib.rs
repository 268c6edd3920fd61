//! stashtest 공통 크레이트
//!
//! 모든 stashtest 크레이트가 공유하는 최상위 에러 타입, `stashtest.toml` 설정,
//! 메트릭 이름 상수를 정의합니다.
//!
//! - [`config`]: 설정 파일 파싱, 환경변수 오버라이드, 유효성 검증
//! - [`error`]: 최상위 에러 및 도메인별 에러
//! - [`metrics`]: 메트릭 이름/레이블 상수

pub mod config;
pub mod error;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, HarnessFailure, RuntimeFailure, StashtestError};

// 설정
pub use config::{GeneralConfig, HarnessSection, RuntimeSection, StashtestConfig};
