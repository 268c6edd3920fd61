//! 파이프라인 설정 변환
//!
//! `###INPUT### ... ###END###`, `###OUTPUT### ... ###END###` 마커로 감싼 세그먼트를
//! 찾아 테스트용 네트워크 선언으로 바꿉니다.
//!
//! - 입력 세그먼트 -> 할당된 포트에서 JSON을 받는 `http` 입력
//! - 출력 세그먼트 -> 할당된 포트에서 JSON 라인을 내보내는 서버 모드 `tcp` 출력
//!
//! 세그먼트의 id는 [`lexer`]로 토큰화한 뒤 처음 나오는 bare word `id`의
//! 두 칸 뒤 토큰에서 추출합니다.
//!
//! # 사용 예시
//! ```ignore
//! let transformer = ConfigTransformer::new()?;
//! let mut registry = PortRegistry::new();
//! let rewritten = transformer.transform(source, &mut registry)?;
//! ```

pub mod lexer;

use std::collections::BTreeMap;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::HarnessError;
use crate::registry::{EndpointRole, PortRegistry};
use lexer::Token;

/// 세그먼트 마커 패턴 (여러 줄에 걸쳐 non-greedy 매칭)
const SEGMENT_PATTERN: &str = r"(?s)###(INPUT|OUTPUT)###(.*?)###END###";

/// 세그먼트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Input,
    Output,
}

impl SegmentKind {
    fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "INPUT" => Some(Self::Input),
            "OUTPUT" => Some(Self::Output),
            _ => None,
        }
    }

    /// 세그먼트가 등록될 엔드포인트 역할
    pub fn role(&self) -> EndpointRole {
        match self {
            Self::Input => EndpointRole::Input,
            Self::Output => EndpointRole::Output,
        }
    }
}

/// 변환 중에만 존재하는 세그먼트
#[derive(Debug)]
struct Segment {
    kind: SegmentKind,
    id: String,
}

impl Segment {
    fn parse(kind: SegmentKind, raw: &str, body: &str) -> Result<Self, HarnessError> {
        let segment_error = |reason: String| HarnessError::Segment {
            segment: raw.to_owned(),
            reason,
        };

        let tokens = lexer::tokenize(body).map_err(|e| segment_error(e.to_string()))?;
        let id = extract_id(&tokens).map_err(|reason| segment_error(reason.to_owned()))?;
        Ok(Self { kind, id })
    }

    fn render(&self, port: u16) -> String {
        match self.kind {
            SegmentKind::Input => format!(
                "http {{ id => \"{}\" port => \"{port}\" codec => \"json\" \
                 remote_host_target_field => \"ignore_and_delete_host\" \
                 request_headers_target_field => \"ignore_and_delete_headers\" }}",
                self.id
            ),
            SegmentKind::Output => format!(
                "tcp {{ id => \"{}\" host => \"0.0.0.0\" port => \"{port}\" \
                 mode => \"server\" codec => \"json_lines\" }}",
                self.id
            ),
        }
    }
}

/// 처음 나오는 bare word `id`의 두 칸 뒤 토큰을 값으로 추출합니다.
fn extract_id(tokens: &[Token]) -> Result<String, &'static str> {
    let idx = tokens
        .iter()
        .position(|t| t.as_word() == Some("id"))
        .ok_or("segment has no \"id\" parameter")?;

    let value = tokens
        .get(idx + 2)
        .ok_or("\"id\" parameter has no value")?
        .as_value()
        .ok_or("\"id\" value is not a string or word")?;

    if value.is_empty() {
        return Err("\"id\" value is empty");
    }
    if value.contains(['"', '\\']) || value.contains(char::is_control) {
        return Err("\"id\" value contains a quote, backslash or control character");
    }
    Ok(value.to_owned())
}

/// 파이프라인 설정 변환기
#[derive(Debug, Clone)]
pub struct ConfigTransformer {
    marker: Regex,
}

impl ConfigTransformer {
    /// 새 변환기를 생성합니다.
    pub fn new() -> Result<Self, HarnessError> {
        Ok(Self {
            marker: Regex::new(SEGMENT_PATTERN)?,
        })
    }

    /// 파이프라인 텍스트의 모든 세그먼트를 재작성합니다.
    ///
    /// 각 세그먼트의 id는 치환 텍스트를 만들기 전에 레지스트리에 등록됩니다.
    /// 마커 밖의 텍스트는 그대로 보존됩니다.
    pub fn transform(
        &self,
        source: &str,
        registry: &mut PortRegistry,
    ) -> Result<String, HarnessError> {
        let mut out = String::with_capacity(source.len());
        let mut last = 0;

        for caps in self.marker.captures_iter(source) {
            let (whole, segment) = Self::parse_capture(&caps)?;
            let port = match segment.kind {
                SegmentKind::Input => registry.new_input(&segment.id)?,
                SegmentKind::Output => registry.new_output(&segment.id)?,
            };
            debug!(role = %segment.kind.role(), id = %segment.id, port, "segment rewritten");

            out.push_str(&source[last..whole.start()]);
            out.push_str(&segment.render(port));
            last = whole.end();
        }

        out.push_str(&source[last..]);
        Ok(out)
    }

    /// 여러 파이프라인을 하나의 레지스트리로 이름 순서대로 재작성합니다.
    pub fn transform_all(
        &self,
        pipelines: &BTreeMap<String, String>,
        registry: &mut PortRegistry,
    ) -> Result<BTreeMap<String, String>, HarnessError> {
        pipelines
            .iter()
            .map(|(name, source)| Ok((name.clone(), self.transform(source, registry)?)))
            .collect()
    }

    fn parse_capture<'h>(
        caps: &Captures<'h>,
    ) -> Result<(regex::Match<'h>, Segment), HarnessError> {
        // 그룹 0, 1, 2는 패턴상 항상 존재
        let (Some(whole), Some(marker), Some(body)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            return Err(HarnessError::Segment {
                segment: String::new(),
                reason: "malformed segment marker".to_owned(),
            });
        };
        let kind =
            SegmentKind::from_marker(marker.as_str()).ok_or_else(|| HarnessError::Segment {
                segment: whole.as_str().to_owned(),
                reason: "neither an INPUT nor an OUTPUT segment".to_owned(),
            })?;
        let segment = Segment::parse(kind, whole.as_str(), body.as_str())?;
        Ok((whole, segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(source: &str) -> Result<(String, PortRegistry), HarnessError> {
        let mut registry = PortRegistry::with_base(3200);
        let out = ConfigTransformer::new()?.transform(source, &mut registry)?;
        Ok((out, registry))
    }

    #[test]
    fn input_segment_becomes_http_input() {
        let (out, registry) =
            transform(r#"input { ###INPUT### stdin { id => "in" } ###END### }"#).unwrap();
        assert_eq!(
            out,
            "input { http { id => \"in\" port => \"3201\" codec => \"json\" \
             remote_host_target_field => \"ignore_and_delete_host\" \
             request_headers_target_field => \"ignore_and_delete_headers\" } }"
        );
        assert!(registry.has_input("in"));
    }

    #[test]
    fn output_segment_becomes_tcp_server() {
        let (out, registry) = transform(
            "output {\n###OUTPUT###\nelasticsearch {\n  id => es\n  hosts => [\"x\"]\n}\n###END###\n}",
        )
        .unwrap();
        assert_eq!(
            out,
            "output {\ntcp { id => \"es\" host => \"0.0.0.0\" port => \"3201\" \
             mode => \"server\" codec => \"json_lines\" }\n}"
        );
        assert!(registry.has_output("es"));
    }

    #[test]
    fn text_outside_markers_is_preserved() {
        let source = "filter { mutate { add_field => { \"a\" => \"b\" } } }\n";
        let (out, registry) = transform(source).unwrap();
        assert_eq!(out, source);
        assert!(registry.is_empty());
    }

    #[test]
    fn ports_follow_segment_order() {
        let source = "###INPUT### a { id => 'one' } ###END###\n\
                      ###OUTPUT### b { id => 'two' } ###END###\n\
                      ###INPUT### c { id => 'three' } ###END###";
        let (_, registry) = transform(source).unwrap();
        let ports: Vec<(String, u16)> = registry
            .inputs()
            .chain(registry.outputs())
            .map(|e| (e.id.clone(), e.port))
            .collect();
        assert!(ports.contains(&("one".to_owned(), 3201)));
        assert!(ports.contains(&("two".to_owned(), 3202)));
        assert!(ports.contains(&("three".to_owned(), 3203)));
    }

    #[test]
    fn first_id_word_wins() {
        let source = r#"###OUTPUT### x { id => "first" tag => { id => "nested" } } ###END###"#;
        let (_, registry) = transform(source).unwrap();
        assert!(registry.has_output("first"));
        assert!(!registry.has_output("nested"));
    }

    #[test]
    fn quoted_id_string_is_not_the_id_key() {
        let source = r#"###INPUT### x { match => "id" id => real } ###END###"#;
        let (_, registry) = transform(source).unwrap();
        assert!(registry.has_input("real"));
    }

    #[test]
    fn missing_id_names_segment() {
        let err = transform("###INPUT### stdin { } ###END###").err().unwrap();
        match err {
            HarnessError::Segment { segment, reason } => {
                assert_eq!(segment, "###INPUT### stdin { } ###END###");
                assert!(reason.contains("no \"id\""));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_value_is_error() {
        assert!(matches!(
            transform("###INPUT### stdin { id => ###END###"),
            Err(HarnessError::Segment { .. })
        ));
    }

    #[test]
    fn brace_value_is_error() {
        assert!(matches!(
            transform("###INPUT### stdin { id => } ###END###"),
            Err(HarnessError::Segment { .. })
        ));
    }

    #[test]
    fn empty_value_is_error() {
        assert!(matches!(
            transform(r#"###INPUT### stdin { id => "" } ###END###"#),
            Err(HarnessError::Segment { .. })
        ));
    }

    #[test]
    fn id_with_quote_or_backslash_is_error() {
        for source in [
            r#"###OUTPUT### x { id => 'a"b' } ###END###"#,
            r#"###OUTPUT### x { id => 'a\\b' } ###END###"#,
        ] {
            match transform(source) {
                Err(HarnessError::Segment { reason, .. }) => assert!(reason.contains("quote")),
                Err(other) => panic!("expected segment error for {source}, got {other}"),
                Ok((out, _)) => panic!("expected segment error for {source}, got {out}"),
            }
        }
    }

    #[test]
    fn commented_segment_with_apostrophe() {
        let source = "output {\n###OUTPUT###\nelasticsearch {\n  # don't index drafts\n  id => \"es\"\n}\n###END###\n}";
        let (out, registry) = transform(source).unwrap();
        assert!(registry.has_output("es"));
        assert!(out.contains("tcp { id => \"es\""));
        assert!(!out.contains("drafts"));
    }

    #[test]
    fn unterminated_quote_is_error() {
        let err = transform(r#"###INPUT### stdin { id => "in } ###END###"#)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn duplicate_output_id_is_fatal() {
        let source = "###OUTPUT### a { id => o } ###END### ###OUTPUT### b { id => o } ###END###";
        assert!(matches!(
            transform(source),
            Err(HarnessError::DuplicateEndpoint { .. })
        ));
    }

    #[test]
    fn transform_all_shares_registry_in_name_order() {
        let mut pipelines = BTreeMap::new();
        pipelines.insert(
            "b-pipe".to_owned(),
            "###OUTPUT### s { id => out } ###END###".to_owned(),
        );
        pipelines.insert(
            "a-pipe".to_owned(),
            "###INPUT### s { id => in } ###END###".to_owned(),
        );
        let mut registry = PortRegistry::with_base(5000);
        let rewritten = ConfigTransformer::new()
            .unwrap()
            .transform_all(&pipelines, &mut registry)
            .unwrap();
        assert!(rewritten["a-pipe"].contains("port => \"5001\""));
        assert!(rewritten["b-pipe"].contains("port => \"5002\""));
    }

    #[test]
    fn segment_kind_maps_to_role() {
        assert_eq!(SegmentKind::Input.role(), EndpointRole::Input);
        assert_eq!(SegmentKind::Output.role(), EndpointRole::Output);
    }
}
