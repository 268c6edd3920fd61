//! 케이스/실행 단위 판정 결과

use std::path::PathBuf;

use serde::Serialize;

/// 케이스 안에서 기록되는 실패
///
/// 실행을 중단시키지 않으므로 [`HarnessError`](crate::error::HarnessError)와 분리되어 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseFailure {
    /// 정규형이 기대값과 다름
    #[error("output '{output_id}' did not match expected document")]
    Comparison {
        output_id: String,
        /// 기대 정규형 파일 (기록 실패 시 없음)
        expected_path: Option<PathBuf>,
        /// 실제 정규형 파일 (기록 실패 시 없음)
        actual_path: Option<PathBuf>,
        /// 라인 diff
        diff: String,
    },

    /// 기대하지 않은 출력이 도착함
    #[error("unexpected output on '{output_id}': {payload}")]
    UnexpectedOutput { output_id: String, payload: String },

    /// 출력 읽기 또는 JSON 파싱 실패
    #[error("failed to read output '{output_id}': {reason}")]
    Read { output_id: String, reason: String },

    /// 데드라인까지 도착하지 않은 출력
    #[error("no output received for {} before the deadline", pending.join(", "))]
    Unresolved { pending: Vec<String> },
}

/// 케이스 하나의 판정
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    /// 케이스 이름
    pub name: String,
    /// 입력 id
    pub input_id: String,
    /// 일치한 출력 id
    pub matched: Vec<String>,
    /// 기록된 실패
    pub failures: Vec<CaseFailure>,
    /// 입력이 수락되기까지의 시도 횟수
    pub submit_attempts: u32,
    /// 제출부터 판정까지 걸린 시간
    pub duration_ms: u64,
}

impl CaseReport {
    /// 모든 기대 출력이 일치하고 예상치 못한 활동이 없었으면 통과입니다.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 전체 실행 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    /// 모든 케이스가 통과했는지 확인합니다.
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    /// 통과한 케이스 수
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    /// 실패한 케이스 수
    pub fn failed_count(&self) -> usize {
        self.cases.len() - self.passed_count()
    }
}
