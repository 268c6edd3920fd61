//! 필드 정규화
//!
//! 실행마다 값이 달라지는 필드(타임스탬프, 전송 메타데이터, geoip 보강 결과)를
//! 최상위에서 제거하고, 라우팅 태그와 중복 태그를 정리합니다.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use crate::error::HarnessError;

/// 기본으로 제거되는 최상위 필드
pub const STRIPPED_FIELDS: &[&str] = &[
    "ignore_and_delete_headers",
    "ignore_and_delete_host",
    "@version",
    "geoip",
    "@timestamp",
];

/// 비교에서 제외되는 라우팅 태그 패턴
pub const ROUTING_TAG_PATTERN: &str = r"^(_input|_route|filebeat)-";

/// 비결정적 필드 정규화기
#[derive(Debug, Clone)]
pub struct Normalizer {
    stripped: Vec<String>,
    routing_tag: Regex,
}

impl Normalizer {
    /// 기본 제거 필드 집합으로 정규화기를 생성합니다.
    pub fn new() -> Result<Self, HarnessError> {
        Ok(Self {
            stripped: STRIPPED_FIELDS.iter().map(|f| (*f).to_owned()).collect(),
            routing_tag: Regex::new(ROUTING_TAG_PATTERN)?,
        })
    }

    /// 추가 제거 필드를 덧붙입니다. 이미 있는 이름은 무시됩니다.
    pub fn with_extra_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.stripped.contains(&field) {
                self.stripped.push(field);
            }
        }
        self
    }

    /// 현재 제거 대상 필드 목록
    pub fn stripped_fields(&self) -> &[String] {
        &self.stripped
    }

    /// 문서를 제자리에서 정규화합니다. 매핑이 아닌 문서는 건드리지 않습니다.
    pub fn normalize(&self, doc: &mut Value) {
        let Some(map) = doc.as_object_mut() else {
            return;
        };

        for field in &self.stripped {
            map.remove(field);
        }

        let has_data_tags = map
            .get("data")
            .and_then(Value::as_object)
            .is_some_and(|data| data.contains_key("tags"));

        let tags = if has_data_tags {
            map.get_mut("data").and_then(|data| data.get_mut("tags"))
        } else {
            map.get_mut("tags")
        };
        if let Some(tags) = tags {
            self.clean_tags(tags);
        }
    }

    /// 정규화된 사본을 반환합니다.
    pub fn normalized(&self, doc: &Value) -> Value {
        let mut copy = doc.clone();
        self.normalize(&mut copy);
        copy
    }

    /// 문서 최상위에 존재하는 제거 대상 필드 이름을 반환합니다.
    pub fn stripped_fields_in(&self, doc: &Value) -> Vec<String> {
        let Some(map) = doc.as_object() else {
            return Vec::new();
        };
        self.stripped
            .iter()
            .filter(|f| map.contains_key(f.as_str()))
            .cloned()
            .collect()
    }

    fn clean_tags(&self, tags: &mut Value) {
        let Some(items) = tags.as_array_mut() else {
            return;
        };

        let mut seen = HashSet::new();
        items.retain(|tag| {
            // Value는 Hash가 아니므로 정규형 문자열로 중복을 판정
            if !seen.insert(super::canonicalize(tag)) {
                return false;
            }
            match tag.as_str() {
                Some(s) => !self.routing_tag.is_match(s),
                None => true,
            }
        });
    }
}
