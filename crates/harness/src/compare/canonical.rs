//! 정규형(canonical form) 렌더링
//!
//! 구조화된 값을 결정적인 문자열로 렌더링합니다. 두 값은 정규형 문자열이
//! 같을 때만 같은 값으로 취급합니다.
//!
//! - 시퀀스: 원소 하나당 들여쓴 한 줄, 순서 유지
//! - 매핑: 키를 사전순으로 정렬, `"key": value` 한 쌍당 들여쓴 한 줄
//! - 문자열: 따옴표로 감싼 원문 그대로
//! - 그 외 스칼라: 자연스러운 텍스트 형태
//!
//! ```text
//! {
//!   "level": "info",
//!   "tags": [
//!     "parsed"
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Number, Value};

const INDENT_STEP: usize = 2;

/// 비교 전용 재귀 값
///
/// 매핑은 `BTreeMap`으로 보관하므로 원본의 키 삽입 순서가 렌더링에 영향을 주지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Seq(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Seq(items.iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl CanonicalValue {
    /// 정규형 문자열을 생성합니다.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, indent: usize) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => out.push_str(&n.to_string()),
            Self::String(s) => push_quoted(out, s),
            Self::Seq(items) if items.is_empty() => out.push_str("[]"),
            Self::Seq(items) => {
                out.push_str("[\n");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(",\n");
                    }
                    push_indent(out, indent + INDENT_STEP);
                    item.write_into(out, indent + INDENT_STEP);
                }
                out.push('\n');
                push_indent(out, indent);
                out.push(']');
            }
            Self::Map(map) if map.is_empty() => out.push_str("{}"),
            Self::Map(map) => {
                out.push_str("{\n");
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(",\n");
                    }
                    push_indent(out, indent + INDENT_STEP);
                    push_quoted(out, key);
                    out.push_str(": ");
                    value.write_into(out, indent + INDENT_STEP);
                }
                out.push('\n');
                push_indent(out, indent);
                out.push('}');
            }
        }
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// JSON 값을 정규형 문자열로 렌더링합니다.
pub fn canonicalize(value: &Value) -> String {
    CanonicalValue::from(value).render()
}

fn push_indent(out: &mut String, width: usize) {
    out.extend(std::iter::repeat_n(' ', width));
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    out.push_str(s);
    out.push('"');
}
