//! 메트릭 상수
//!
//! 모든 메트릭의 이름과 레이블 키를 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! 레코더 설치는 바이너리의 몫이며 (CLI는 `general.metrics_file`이 설정된 경우
//! Prometheus 레코더를 설치), 설치되지 않으면 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `stashtest_`
//! - 모듈명: `harness_`, `runtime_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(stashtest_core::metrics::HARNESS_CASES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (passed, failed)
pub const LABEL_RESULT: &str = "result";

/// 엔드포인트 역할 레이블 키 (input, output)
pub const LABEL_ROLE: &str = "role";

/// 콘솔 스트림 레이블 키 (stdout, stderr)
pub const LABEL_STREAM: &str = "stream";

// ─── Harness 메트릭 ────────────────────────────────────────────────

/// Harness: 실행된 테스트 케이스 수 (counter, label: result)
pub const HARNESS_CASES_TOTAL: &str = "stashtest_harness_cases_total";

/// Harness: 입력 제출 재시도 수 (counter)
pub const HARNESS_SUBMIT_RETRIES_TOTAL: &str = "stashtest_harness_submit_retries_total";

/// Harness: 출력 비교 수 (counter, label: result)
pub const HARNESS_COMPARISONS_TOTAL: &str = "stashtest_harness_comparisons_total";

/// Harness: 등록된 엔드포인트 수 (counter, label: role)
pub const HARNESS_ENDPOINTS_REGISTERED_TOTAL: &str = "stashtest_harness_endpoints_registered_total";

// ─── Runtime 메트릭 ────────────────────────────────────────────────

/// Runtime: 준비 상태 폴링 시도 수 (counter)
pub const RUNTIME_READINESS_POLLS_TOTAL: &str = "stashtest_runtime_readiness_polls_total";

/// Runtime: 드레인된 콘솔 라인 수 (counter, label: stream)
pub const RUNTIME_CONSOLE_LINES_TOTAL: &str = "stashtest_runtime_console_lines_total";

/// 모든 메트릭의 설명을 등록합니다. 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(HARNESS_CASES_TOTAL, "Test cases run, by result");
    describe_counter!(
        HARNESS_SUBMIT_RETRIES_TOTAL,
        "Input submissions retried after a transient failure"
    );
    describe_counter!(HARNESS_COMPARISONS_TOTAL, "Output comparisons, by result");
    describe_counter!(
        HARNESS_ENDPOINTS_REGISTERED_TOTAL,
        "Endpoints registered by the config transformer, by role"
    );
    describe_counter!(RUNTIME_READINESS_POLLS_TOTAL, "Readiness API polls");
    describe_counter!(RUNTIME_CONSOLE_LINES_TOTAL, "Container console lines drained, by stream");
}
