//! 에러 타입: 도메인별 에러 정의
//!
//! 각 도메인 크레이트(`stashtest-harness`, `stashtest-runtime`)는 자체 에러 enum을
//! 가지며, `From` 변환으로 [`StashtestError`]에 합류합니다.

/// stashtest 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum StashtestError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 테스트 하네스 에러 (변환, 픽스처, 실행)
    #[error("harness error: {0}")]
    Harness(#[from] HarnessFailure),

    /// 런타임(컨테이너) 에러
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeFailure),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 하네스 에러 (코어 레벨 요약)
#[derive(Debug, thiserror::Error)]
pub enum HarnessFailure {
    /// 배포 전 단계 실패 (세그먼트, 픽스처, 채널 검증)
    #[error("setup failed: {0}")]
    Setup(String),

    /// 실행 중 치명적 실패 (입력 제출 재시도 소진 등)
    #[error("execution aborted: {0}")]
    Execution(String),
}

/// 런타임 에러 (코어 레벨 요약)
#[derive(Debug, thiserror::Error)]
pub enum RuntimeFailure {
    /// 컨테이너 엔진 호출 실패
    #[error("container engine: {0}")]
    Engine(String),

    /// 런타임이 준비 상태에 도달하지 못함
    #[error("runtime not ready: {0}")]
    NotReady(String),
}
