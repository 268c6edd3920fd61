//! 비교 모듈 -- 필드 정규화, 정규형 렌더링, 라인 diff
//!
//! 두 문서는 [`Normalizer`]로 비결정적 필드를 제거한 뒤 [`canonicalize`]한
//! 문자열이 바이트 단위로 같을 때만 같다고 판정합니다.
//!
//! # 사용 예시
//! ```ignore
//! use stashtest_harness::compare::{Comparator, Comparison};
//!
//! let comparator = Comparator::new(Normalizer::new()?);
//! match comparator.compare(&expected, &actual) {
//!     Comparison::Match => {}
//!     Comparison::Mismatch { expected, actual } => println!("{}", line_diff(&expected, &actual)),
//! }
//! ```

pub mod canonical;
pub mod diff;
pub mod normalize;

pub use canonical::{CanonicalValue, canonicalize};
pub use diff::line_diff;
pub use normalize::Normalizer;

use serde_json::Value;

/// 비교 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// 정규형이 동일함
    Match,
    /// 정규형이 다름 (양쪽 정규형 포함)
    Mismatch {
        /// 기대 문서의 정규형
        expected: String,
        /// 실제 문서의 정규형
        actual: String,
    },
}

impl Comparison {
    /// 일치 여부를 반환합니다.
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// 정규화 + 정규형 비교기
pub struct Comparator {
    normalizer: Normalizer,
}

impl Comparator {
    /// 주어진 정규화기로 비교기를 생성합니다.
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    /// 사용 중인 정규화기를 반환합니다.
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// 기대 문서와 실제 문서를 정규화한 뒤 정규형으로 비교합니다.
    pub fn compare(&self, expected: &Value, actual: &Value) -> Comparison {
        let expected = canonicalize(&self.normalizer.normalized(expected));
        let actual = canonicalize(&self.normalizer.normalized(actual));
        if expected == actual {
            Comparison::Match
        } else {
            Comparison::Mismatch { expected, actual }
        }
    }
}
