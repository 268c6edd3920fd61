//! 테스트 하네스 에러 타입
//!
//! [`HarnessError`]는 실행 전체를 중단시키는 치명적 에러만 표현합니다.
//! 케이스/출력 단위의 실패는 [`CaseFailure`](crate::runner::CaseFailure)로
//! 기록되며 `?`로 전파되지 않습니다.
//!
//! `From<HarnessError> for StashtestError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use stashtest_core::error::{HarnessFailure, StashtestError};

use crate::registry::EndpointRole;

/// 테스트 하네스 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 세그먼트 해석 실패 (id 누락, 닫히지 않은 문자열 등)
    #[error("config segment error: {reason}\n{segment}")]
    Segment {
        /// 문제가 된 세그먼트 원문
        segment: String,
        /// 실패 사유
        reason: String,
    },

    /// 같은 역할 안에서 id가 중복 등록됨
    #[error("duplicate {role} id '{id}'")]
    DuplicateEndpoint {
        /// 엔드포인트 역할
        role: EndpointRole,
        /// 중복된 id
        id: String,
    },

    /// 더 이상 할당할 포트가 없음
    #[error("port space exhausted after port {last}")]
    PortExhausted {
        /// 마지막으로 발급된 포트
        last: u16,
    },

    /// 픽스처 파일 파싱 실패
    #[error("fixture parse error: {path}: {reason}")]
    FixtureParse {
        /// 픽스처 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 픽스처가 파이프라인에 없는 id를 참조함
    #[error("fixtures reference unknown endpoints: {}", missing.join("; "))]
    ChannelMismatch {
        /// 누락된 참조 목록 (케이스 이름과 id 포함)
        missing: Vec<String>,
    },

    /// 엔드포인트 연결 실패
    #[error("failed to connect {role} '{id}': {reason}")]
    Connect {
        /// 엔드포인트 역할
        role: EndpointRole,
        /// 엔드포인트 id
        id: String,
        /// 실패 사유
        reason: String,
    },

    /// 연결되지 않은 엔드포인트 사용
    #[error("{role} '{id}' is not connected")]
    NotConnected {
        /// 엔드포인트 역할
        role: EndpointRole,
        /// 엔드포인트 id
        id: String,
    },

    /// 재시도를 모두 소진했는데도 입력이 수락되지 않음
    #[error(
        "input '{input_id}' rejected {attempts} times while running '{case}', last error: {last_error}"
    )]
    SubmissionExhausted {
        /// 케이스 이름
        case: String,
        /// 입력 id
        input_id: String,
        /// 시도 횟수
        attempts: u32,
        /// 마지막 실패 사유
        last_error: String,
    },

    /// 재시도 대상이 아닌 전송 에러
    #[error("input '{input_id}' failed while running '{case}': {reason}")]
    SubmissionFailed {
        /// 케이스 이름
        case: String,
        /// 입력 id
        input_id: String,
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

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl HarnessError {
    /// 런타임에 접촉하기 전(배포 전) 단계의 에러인지 확인합니다.
    pub fn is_pre_deploy(&self) -> bool {
        matches!(
            self,
            Self::Segment { .. }
                | Self::DuplicateEndpoint { .. }
                | Self::PortExhausted { .. }
                | Self::FixtureParse { .. }
                | Self::ChannelMismatch { .. }
                | Self::Config { .. }
                | Self::Regex(_)
        )
    }
}

impl From<HarnessError> for StashtestError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::Io(e) => StashtestError::Io(e),
            other if other.is_pre_deploy() => {
                StashtestError::Harness(HarnessFailure::Setup(other.to_string()))
            }
            other => StashtestError::Harness(HarnessFailure::Execution(other.to_string())),
        }
    }
}
