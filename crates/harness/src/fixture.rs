//! 픽스처 로더 -- 테스트 파일을 [`TestCase`]로 파싱합니다.
//!
//! 픽스처 파일은 블록의 반복입니다.
//!
//! ```text
//! ###INPUT-<입력 id>###
//! { "message": "hello" }
//! ###END###
//! ###OUTPUT-<출력 id>###
//! { "message": "hello", "level": "info" }
//! ###END###
//! ```
//!
//! `INPUT` 블록은 새 케이스를 열고, 뒤따르는 `OUTPUT` 블록은 가장 최근에 열린
//! 케이스에 기대 출력으로 붙습니다. 블록 밖의 마커 없는 텍스트는 무시됩니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;

use crate::compare::Normalizer;
use crate::error::HarnessError;
use crate::registry::PortRegistry;

/// 픽스처 블록 패턴
const BLOCK_PATTERN: &str = r"(?s)###(INPUT|OUTPUT)-(\S+?)###(.*?)###END###";

/// 블록 밖에서 허용되지 않는 마커 접두어
const MARKER: &str = "###";

/// 픽스처 파일 최대 크기
const MAX_FIXTURE_FILE_SIZE: u64 = 16 * 1024 * 1024; // 16MB

/// 하나의 테스트 케이스
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// `<파일 이름>#<위치>` 형식의 이름
    pub name: String,
    /// 케이스가 정의된 픽스처 파일
    pub source: PathBuf,
    /// 파일 안에서의 1부터 시작하는 위치
    pub position: usize,
    /// 입력 엔드포인트 id
    pub input_id: String,
    /// 제출할 입력 문서
    pub input: Value,
    /// 출력 id별 기대 문서 (비어 있으면 어떤 출력도 없어야 함)
    pub expected: BTreeMap<String, Value>,
}

impl TestCase {
    /// 이 케이스가 참조하는 출력 id
    pub fn output_ids(&self) -> impl Iterator<Item = &str> {
        self.expected.keys().map(String::as_str)
    }
}

/// 픽스처 파서
#[derive(Debug, Clone)]
pub struct FixtureParser {
    block: Regex,
    normalizer: Normalizer,
}

impl FixtureParser {
    /// 기본 정규화기로 파서를 생성합니다.
    pub fn new() -> Result<Self, HarnessError> {
        Ok(Self {
            block: Regex::new(BLOCK_PATTERN)?,
            normalizer: Normalizer::new()?,
        })
    }

    /// 기대 문서 경고에 사용할 정규화기를 지정합니다.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// 디렉토리의 일반 파일을 이름 순서로 읽어 모든 케이스를 반환합니다.
    ///
    /// 하위 디렉토리는 탐색하지 않습니다.
    pub async fn load_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<TestCase>, HarnessError> {
        let dir = dir.as_ref();
        let dir_error = |reason: String| HarnessError::FixtureParse {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| dir_error(format!("failed to read directory: {e}")))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| dir_error(format!("failed to read directory entry: {e}")))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| dir_error(format!("failed to read file type: {e}")))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut cases = Vec::new();
        for path in &files {
            cases.extend(self.load_file(path).await?);
        }

        tracing::info!(
            dir = %dir.display(),
            files = files.len(),
            cases = cases.len(),
            "loaded fixtures"
        );
        Ok(cases)
    }

    /// 단일 픽스처 파일을 읽어 파싱합니다.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<Vec<TestCase>, HarnessError> {
        let path = path.as_ref();
        let file_error = |reason: String| HarnessError::FixtureParse {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| file_error(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_FIXTURE_FILE_SIZE {
            return Err(file_error(format!(
                "file too large: {} bytes (max: {MAX_FIXTURE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| file_error(format!("failed to read file: {e}")))?;

        self.parse(path, &content)
    }

    /// 픽스처 텍스트를 파싱합니다. `path`는 케이스 이름과 에러 메시지에 쓰입니다.
    pub fn parse(&self, path: &Path, text: &str) -> Result<Vec<TestCase>, HarnessError> {
        let parse_error = |reason: String| HarnessError::FixtureParse {
            path: path.display().to_string(),
            reason,
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut cases: Vec<TestCase> = Vec::new();
        let mut last = 0;

        for caps in self.block.captures_iter(text) {
            let (Some(whole), Some(kind), Some(id), Some(body)) =
                (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
            else {
                return Err(parse_error("malformed block marker".to_owned()));
            };

            check_gap(&text[last..whole.start()]).map_err(&parse_error)?;
            last = whole.end();

            let id = id.as_str();
            let payload: Value = serde_json::from_str(body.as_str()).map_err(|e| {
                parse_error(format!("invalid JSON in {} block '{id}': {e}", kind.as_str()))
            })?;

            match kind.as_str() {
                "INPUT" => {
                    let position = cases.len() + 1;
                    cases.push(TestCase {
                        name: format!("{file_name}#{position}"),
                        source: path.to_path_buf(),
                        position,
                        input_id: id.to_owned(),
                        input: payload,
                        expected: BTreeMap::new(),
                    });
                }
                _ => {
                    let current = cases.last_mut().ok_or_else(|| {
                        parse_error(format!("output block '{id}' before any input block"))
                    })?;
                    if current.expected.contains_key(id) {
                        return Err(parse_error(format!(
                            "duplicate output '{id}' in case {}",
                            current.name
                        )));
                    }
                    current.expected.insert(id.to_owned(), payload);
                }
            }
        }

        check_gap(&text[last..]).map_err(&parse_error)?;

        for case in &cases {
            self.warn_stripped_fields(case);
        }
        Ok(cases)
    }

    fn warn_stripped_fields(&self, case: &TestCase) {
        for (output_id, expected) in &case.expected {
            let fields = self.normalizer.stripped_fields_in(expected);
            if !fields.is_empty() {
                tracing::warn!(
                    case = %case.name,
                    output_id = %output_id,
                    fields = ?fields,
                    "expected output contains fields that are always ignored"
                );
            }
        }
    }
}

/// 블록 사이 텍스트에 떠도는 마커가 있으면 에러입니다.
fn check_gap(gap: &str) -> Result<(), String> {
    match gap.find(MARKER) {
        Some(offset) => {
            let snippet: String = gap[offset..].chars().take(40).collect();
            Err(format!("stray marker outside a block: '{}'", snippet.trim_end()))
        }
        None => Ok(()),
    }
}

/// 모든 케이스가 참조하는 입력/출력 id가 레지스트리에 있는지 확인합니다.
///
/// 누락된 참조는 한 번에 모두 보고합니다.
pub fn verify_channels(cases: &[TestCase], registry: &PortRegistry) -> Result<(), HarnessError> {
    let mut missing = Vec::new();
    for case in cases {
        if !registry.has_input(&case.input_id) {
            missing.push(format!(
                "case '{}' references unknown input '{}'",
                case.name, case.input_id
            ));
        }
        for output_id in case.output_ids() {
            if !registry.has_output(output_id) {
                missing.push(format!(
                    "case '{}' references unknown output '{output_id}'",
                    case.name
                ));
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::ChannelMismatch { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Result<Vec<TestCase>, HarnessError> {
        FixtureParser::new()
            .unwrap()
            .parse(Path::new("tests/basic.txt"), text)
    }

    #[test]
    fn parses_case_with_outputs() {
        let text = r#"
Free text describing the case.
###INPUT-in###
{"message": "hello"}
###END###
###OUTPUT-out###
{"message": "hello", "level": "info"}
###END###
###OUTPUT-audit###
{"seen": true}
###END###
"#;
        let cases = parse(text).unwrap();
        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.name, "basic.txt#1");
        assert_eq!(case.position, 1);
        assert_eq!(case.source, PathBuf::from("tests/basic.txt"));
        assert_eq!(case.input_id, "in");
        assert_eq!(case.input, json!({"message": "hello"}));
        assert_eq!(case.expected.len(), 2);
        assert_eq!(case.expected["audit"], json!({"seen": true}));
    }

    #[test]
    fn each_input_opens_new_case() {
        let text = "###INPUT-a###{}###END######OUTPUT-o###{}###END###\n\
                    ###INPUT-b###{\"x\":1}###END###";
        let cases = parse(text).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].expected.len(), 1);
        assert_eq!(cases[1].name, "basic.txt#2");
        assert!(cases[1].expected.is_empty());
    }

    #[test]
    fn payload_may_contain_hash_signs() {
        let text = "###INPUT-in###{\"msg\": \"#1 and ## two\"}###END###";
        let cases = parse(text).unwrap();
        assert_eq!(cases[0].input, json!({"msg": "#1 and ## two"}));
    }

    #[test]
    fn output_before_input_is_error() {
        let err = parse("###OUTPUT-out###{}###END###").unwrap_err();
        assert!(err.to_string().contains("before any input"));
        assert!(err.to_string().contains("tests/basic.txt"));
    }

    #[test]
    fn invalid_json_is_error() {
        let err = parse("###INPUT-in###{not json}###END###").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn unterminated_block_is_stray_marker() {
        let err = parse("###INPUT-in###{}###END###\n###OUTPUT-out###{}").unwrap_err();
        assert!(err.to_string().contains("stray marker"));
    }

    #[test]
    fn unknown_block_kind_is_stray_marker() {
        assert!(parse("###FILTER-x###{}###END###").is_err());
    }

    #[test]
    fn duplicate_output_id_is_error() {
        let text = "###INPUT-in###{}###END###\
                    ###OUTPUT-o###{}###END###\
                    ###OUTPUT-o###{}###END###";
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("duplicate output 'o'"));
    }

    #[test]
    fn empty_file_has_no_cases() {
        assert!(parse("just notes\n").unwrap().is_empty());
    }

    #[test]
    fn verify_channels_reports_all_missing() {
        let mut registry = PortRegistry::with_base(3200);
        registry.new_input("in").unwrap();
        registry.new_output("out").unwrap();
        let text = "###INPUT-in###{}###END######OUTPUT-out###{}###END######OUTPUT-gone###{}###END###\
                    ###INPUT-nope###{}###END###";
        let cases = parse(text).unwrap();
        match verify_channels(&cases, &registry).unwrap_err() {
            HarnessError::ChannelMismatch { missing } => {
                assert_eq!(missing.len(), 2);
                assert!(missing[0].contains("output 'gone'"));
                assert!(missing[1].contains("input 'nope'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn verify_channels_accepts_known_ids() {
        let mut registry = PortRegistry::with_base(3200);
        registry.new_input("in").unwrap();
        let cases = parse("###INPUT-in###{}###END###").unwrap();
        verify_channels(&cases, &registry).unwrap();
    }

    #[tokio::test]
    async fn load_dir_reads_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "###INPUT-b###{}###END###")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "###INPUT-a###{}###END###")
            .await
            .unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();
        tokio::fs::write(
            dir.path().join("nested").join("c.txt"),
            "###INPUT-c###{}###END###",
        )
        .await
        .unwrap();

        let cases = FixtureParser::new().unwrap().load_dir(dir.path()).await.unwrap();
        let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt#1", "b.txt#1"]);
    }

    #[tokio::test]
    async fn load_dir_missing_directory_fails() {
        let result = FixtureParser::new()
            .unwrap()
            .load_dir("/nonexistent/stashtest/fixtures")
            .await;
        assert!(matches!(result, Err(HarnessError::FixtureParse { .. })));
    }
}
