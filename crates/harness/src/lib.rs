//! stashtest 테스트 하네스
//!
//! 파이프라인 설정을 테스트 가능한 형태로 변환하고, 합성 입력 이벤트를 주입한 뒤
//! 출력 이벤트를 기대값과 비교합니다.
//!
//! # 모듈 구성
//!
//! - [`transform`]: `###INPUT###`/`###OUTPUT###` 세그먼트를 HTTP/TCP 선언으로 재작성
//! - [`registry`]: 입력/출력 id별 포트 할당과 라이브 연결, 출력 멀티플렉서
//! - [`fixture`]: 픽스처 파일을 [`TestCase`]로 파싱하고 채널을 검증
//! - [`compare`]: 필드 정규화와 정규형(canonical form) 렌더링
//! - [`runner`]: 제출/대기/비교/판정 프로토콜
//! - [`config`]: 하네스 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! pipeline text -> ConfigTransformer -> rewritten text   (runtime launcher)
//!                        |
//!                   PortRegistry --connect--> OutputMux
//!                        |                      |
//! fixtures -> TestCase -> TestRunner <----------+
//!                            |
//!                  Normalizer -> Canonicalizer -> verdict
//! ```

pub mod compare;
pub mod config;
pub mod error;
pub mod fixture;
pub mod registry;
pub mod runner;
pub mod transform;

// --- 주요 타입 re-export ---

// 설정
pub use config::{HarnessConfig, HarnessConfigBuilder};

// 에러
pub use error::HarnessError;

// 비교
pub use compare::{CanonicalValue, Comparator, Comparison, Normalizer, canonicalize};

// 변환
pub use transform::{ConfigTransformer, SegmentKind};

// 레지스트리
pub use registry::{
    ConnectionHandle, Endpoint, EndpointRole, OutputEvent, OutputMux, OutputPayload,
    PortForwardingSpec, PortRegistry,
};

// 픽스처
pub use fixture::{FixtureParser, TestCase, verify_channels};

// 실행
pub use runner::{CaseFailure, CaseReport, RunReport, TestRunner};
