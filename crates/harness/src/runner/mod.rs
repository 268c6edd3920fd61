//! 테스트 실행 프로토콜
//!
//! 케이스마다 `SUBMIT -> AWAIT_OUTPUTS -> {PASSED | FAILED}` 순서로 진행하며,
//! 케이스는 항상 하나씩 순차 실행됩니다.
//!
//! - 제출: 입력 엔드포인트로 JSON POST, 재시도 가능한 에러는 간격을 두고 재시도
//! - 대기: 제출 성공 시점부터 데드라인까지 출력 멀티플렉서를 남은 시간만큼 기다림
//! - 비교: 정규화 후 정규형 문자열을 바이트 단위로 비교, 불일치 시 양쪽을 파일로 기록
//! - 기대 출력이 없는 케이스: 침묵 구간 동안 어떤 출력도 없어야 통과
//!
//! 제출 실패처럼 실행 전체를 무효로 만드는 에러만 `Err`로 반환되고,
//! 나머지는 [`CaseReport`]에 [`CaseFailure`]로 기록됩니다.

mod report;
mod submit;

pub use report::{CaseFailure, CaseReport, RunReport};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use stashtest_core::metrics as m;

use crate::compare::{Comparator, Comparison, Normalizer, line_diff};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fixture::TestCase;
use crate::registry::{OutputEvent, OutputMux, OutputPayload, PortRegistry};

/// 테스트 실행기
pub struct TestRunner {
    config: HarnessConfig,
    comparator: Comparator,
}

impl TestRunner {
    /// 설정과 정규화기로 실행기를 생성합니다.
    pub fn new(config: HarnessConfig, normalizer: Normalizer) -> Self {
        Self {
            config,
            comparator: Comparator::new(normalizer),
        }
    }

    /// 설정의 추가 제거 필드를 반영한 기본 정규화기로 실행기를 생성합니다.
    pub fn from_config(config: HarnessConfig) -> Result<Self, HarnessError> {
        let normalizer = Normalizer::new()?.with_extra_fields(config.extra_ignored_fields.clone());
        Ok(Self::new(config, normalizer))
    }

    /// 실행기 설정
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// 모든 케이스를 순서대로 실행합니다.
    ///
    /// 치명적 에러가 나면 즉시 중단하며, 이미 실행된 케이스의 결과는 버려집니다.
    pub async fn run(
        &self,
        registry: &PortRegistry,
        mux: &mut OutputMux,
        cases: &[TestCase],
    ) -> Result<RunReport, HarnessError> {
        let mut report = RunReport::default();
        for case in cases {
            let case_report = self.run_case(registry, mux, case).await?;
            let result = if case_report.passed() { "passed" } else { "failed" };
            metrics::counter!(m::HARNESS_CASES_TOTAL, m::LABEL_RESULT => result).increment(1);
            report.cases.push(case_report);
        }

        info!(
            cases = report.cases.len(),
            passed = report.passed_count(),
            failed = report.failed_count(),
            "test run finished"
        );
        Ok(report)
    }

    /// 케이스 하나를 실행합니다.
    pub async fn run_case(
        &self,
        registry: &PortRegistry,
        mux: &mut OutputMux,
        case: &TestCase,
    ) -> Result<CaseReport, HarnessError> {
        let started = Instant::now();
        discard_stale(registry, mux, case);

        let submit_attempts = submit::submit(&self.config, registry, case).await?;

        let (matched, failures) = if case.expected.is_empty() {
            (Vec::new(), self.await_silence(registry, mux, case).await)
        } else {
            self.await_outputs(registry, mux, case).await
        };

        let report = CaseReport {
            name: case.name.clone(),
            input_id: case.input_id.clone(),
            matched,
            failures,
            submit_attempts,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if report.passed() {
            info!(case = %case.name, "test passed");
        } else {
            warn!(case = %case.name, failures = report.failures.len(), "test failed");
        }
        Ok(report)
    }

    /// 기대 출력이 모두 해결되거나 데드라인이 지날 때까지 출력을 기다립니다.
    async fn await_outputs(
        &self,
        registry: &PortRegistry,
        mux: &mut OutputMux,
        case: &TestCase,
    ) -> (Vec<String>, Vec<CaseFailure>) {
        let deadline = Instant::now() + self.config.output_deadline;
        let mut pending: BTreeMap<&str, &Value> =
            case.expected.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let mut matched = Vec::new();
        let mut failures = Vec::new();

        while !pending.is_empty() {
            let event = match timeout_at(deadline, mux.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    warn!(case = %case.name, "all output connections closed");
                    break;
                }
                Err(_) => break,
            };

            let Some(output_id) = registry.reverse_lookup(event.handle) else {
                warn!(case = %case.name, handle = %event.handle, "event from unknown connection");
                continue;
            };
            let Some(expected) = pending.remove(output_id) else {
                if case.expected.contains_key(output_id) {
                    warn!(
                        case = %case.name,
                        output_id,
                        payload = %describe_payload(&event.payload),
                        "ignoring event for output that is already resolved"
                    );
                } else if let OutputPayload::Line(line) = event.payload {
                    let failure = CaseFailure::UnexpectedOutput {
                        output_id: output_id.to_owned(),
                        payload: String::from_utf8_lossy(&line).into_owned(),
                    };
                    warn!(case = %case.name, failure = %failure, "output the case does not declare");
                    failures.push(failure);
                } else {
                    warn!(
                        case = %case.name,
                        output_id,
                        payload = %describe_payload(&event.payload),
                        "undeclared output stopped delivering"
                    );
                }
                continue;
            };

            match event.payload {
                OutputPayload::Line(line) => match serde_json::from_slice::<Value>(&line) {
                    Ok(actual) => match self.comparator.compare(expected, &actual) {
                        Comparison::Match => {
                            metrics::counter!(m::HARNESS_COMPARISONS_TOTAL, m::LABEL_RESULT => "passed")
                                .increment(1);
                            info!(case = %case.name, output_id, "output matched");
                            matched.push(output_id.to_owned());
                        }
                        Comparison::Mismatch { expected, actual } => {
                            metrics::counter!(m::HARNESS_COMPARISONS_TOTAL, m::LABEL_RESULT => "failed")
                                .increment(1);
                            let failure = self
                                .comparison_failure(case, output_id, &expected, &actual)
                                .await;
                            failures.push(failure);
                        }
                    },
                    Err(e) => {
                        warn!(case = %case.name, output_id, error = %e, "output is not valid JSON");
                        failures.push(CaseFailure::Read {
                            output_id: output_id.to_owned(),
                            reason: format!("invalid JSON: {e}"),
                        });
                    }
                },
                OutputPayload::Closed => {
                    warn!(case = %case.name, output_id, "output connection closed");
                    failures.push(CaseFailure::Read {
                        output_id: output_id.to_owned(),
                        reason: "connection closed".to_owned(),
                    });
                }
                OutputPayload::Failed(reason) => {
                    warn!(case = %case.name, output_id, reason = %reason, "output read failed");
                    failures.push(CaseFailure::Read {
                        output_id: output_id.to_owned(),
                        reason,
                    });
                }
            }
        }

        if !pending.is_empty() {
            let pending: Vec<String> = pending.keys().map(|id| (*id).to_owned()).collect();
            warn!(case = %case.name, pending = ?pending, "outputs unresolved at deadline");
            failures.push(CaseFailure::Unresolved { pending });
        }

        (matched, failures)
    }

    /// 기대 출력이 없는 케이스: 침묵 구간 동안 도착한 모든 활동을 실패로 기록합니다.
    async fn await_silence(
        &self,
        registry: &PortRegistry,
        mux: &mut OutputMux,
        case: &TestCase,
    ) -> Vec<CaseFailure> {
        let window_end = Instant::now() + self.config.silence_window;
        let mut failures = Vec::new();

        while let Ok(Some(event)) = timeout_at(window_end, mux.recv()).await {
            let output_id = registry
                .reverse_lookup(event.handle)
                .map(str::to_owned)
                .unwrap_or_else(|| event.handle.to_string());

            let failure = match event.payload {
                OutputPayload::Line(line) => CaseFailure::UnexpectedOutput {
                    output_id,
                    payload: String::from_utf8_lossy(&line).into_owned(),
                },
                OutputPayload::Closed => CaseFailure::Read {
                    output_id,
                    reason: "connection closed".to_owned(),
                },
                OutputPayload::Failed(reason) => CaseFailure::Read { output_id, reason },
            };
            warn!(case = %case.name, failure = %failure, "activity on a case expecting no output");
            failures.push(failure);
        }

        failures
    }

    async fn comparison_failure(
        &self,
        case: &TestCase,
        output_id: &str,
        expected: &str,
        actual: &str,
    ) -> CaseFailure {
        let diff = line_diff(expected, actual);
        warn!(case = %case.name, output_id, "output did not match\n{diff}");

        let stem = format!("{}.{}", slug(&case.name), slug(output_id));
        let dir = &self.config.artifact_dir;
        let expected_path = persist(dir.join(format!("{stem}.expected.txt")), expected).await;
        let actual_path = persist(dir.join(format!("{stem}.actual.txt")), actual).await;

        CaseFailure::Comparison {
            output_id: output_id.to_owned(),
            expected_path,
            actual_path,
            diff,
        }
    }
}

/// 이전 케이스에서 남은 출력 이벤트를 버립니다.
fn discard_stale(registry: &PortRegistry, mux: &mut OutputMux, case: &TestCase) {
    for OutputEvent { handle, payload } in mux.drain_stale() {
        warn!(
            case = %case.name,
            output_id = registry.reverse_lookup(handle).unwrap_or("unknown"),
            payload = %describe_payload(&payload),
            "discarding stale output before submission"
        );
    }
}

fn describe_payload(payload: &OutputPayload) -> String {
    match payload {
        OutputPayload::Line(line) => String::from_utf8_lossy(line).into_owned(),
        OutputPayload::Closed => "<connection closed>".to_owned(),
        OutputPayload::Failed(reason) => format!("<read failed: {reason}>"),
    }
}

/// 정규형을 파일로 기록합니다. 실패는 경고만 남깁니다.
async fn persist(path: PathBuf, contents: &str) -> Option<PathBuf> {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "failed to create artifact directory");
            return None;
        }
    }

    match tokio::fs::write(&path, contents).await {
        Ok(()) => {
            debug!(path = %path.display(), "artifact written");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to write artifact");
            None
        }
    }
}

/// 파일 이름에 쓸 수 없는 문자를 `_`로 바꿉니다.
fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
