//! 입력 제출 -- 재시도 가능한 전송 에러를 구분하는 POST 루프

use std::error::Error as _;
use std::io::ErrorKind;

use tracing::{debug, warn};

use stashtest_core::metrics as m;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fixture::TestCase;
use crate::registry::PortRegistry;

/// 한 번의 제출 시도 결과
#[derive(Debug)]
enum Attempt {
    Accepted,
    Retry(String),
    Fatal(String),
}

/// 케이스의 입력 문서를 수락될 때까지 제출하고 시도 횟수를 반환합니다.
///
/// 연결 리셋, broken pipe, 요청 도중 연결 종료, 타임아웃, 2xx가 아닌 응답은
/// `submit_attempts`회까지 `submit_retry_interval` 간격으로 재시도합니다.
/// 그 외의 전송 에러(연결 거부 등)는 즉시 실패합니다.
pub(crate) async fn submit(
    config: &HarnessConfig,
    registry: &PortRegistry,
    case: &TestCase,
) -> Result<u32, HarnessError> {
    let client = registry.input_client(&case.input_id)?;
    let mut last_error = String::new();

    for attempt in 1..=config.submit_attempts {
        let outcome = match client.post_json(&case.input).await {
            Ok(response) if response.status().is_success() => Attempt::Accepted,
            Ok(response) => Attempt::Retry(format!("HTTP {}", response.status())),
            Err(e) => classify(&e),
        };

        match outcome {
            Attempt::Accepted => {
                debug!(case = %case.name, input_id = %case.input_id, attempt, "input accepted");
                return Ok(attempt);
            }
            Attempt::Fatal(reason) => {
                return Err(HarnessError::SubmissionFailed {
                    case: case.name.clone(),
                    input_id: case.input_id.clone(),
                    reason,
                });
            }
            Attempt::Retry(reason) => {
                warn!(
                    case = %case.name,
                    input_id = %case.input_id,
                    attempt,
                    max_attempts = config.submit_attempts,
                    reason = %reason,
                    "input not accepted, retrying"
                );
                metrics::counter!(m::HARNESS_SUBMIT_RETRIES_TOTAL).increment(1);
                last_error = reason;
                if attempt < config.submit_attempts {
                    tokio::time::sleep(config.submit_retry_interval).await;
                }
            }
        }
    }

    Err(HarnessError::SubmissionExhausted {
        case: case.name.clone(),
        input_id: case.input_id.clone(),
        attempts: config.submit_attempts,
        last_error,
    })
}

/// reqwest 에러를 재시도 가능 여부로 분류합니다.
fn classify(err: &reqwest::Error) -> Attempt {
    let reason = describe(err);

    if err.is_timeout() {
        return Attempt::Retry(reason);
    }
    if is_retryable_io(err) {
        return Attempt::Retry(reason);
    }
    if err.is_connect() {
        return Attempt::Fatal(reason);
    }
    // 연결 후 요청 도중 끊긴 경우 (incomplete message 등)
    if err.is_request() || err.is_body() {
        return Attempt::Retry(reason);
    }
    Attempt::Fatal(reason)
}

fn is_retryable_io(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionAborted
            );
        }
        source = cause.source();
    }
    false
}

/// 원인 체인을 포함한 에러 설명
fn describe(err: &reqwest::Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}
