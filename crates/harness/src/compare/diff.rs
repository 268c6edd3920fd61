//! 정규형 문자열의 라인 단위 diff

use difference::{Changeset, Difference};

/// 기대/실제 정규형의 라인 diff를 생성합니다.
///
/// 각 줄 앞에 공통 `"  "`, 기대값에만 있음 `"- "`, 실제값에만 있음 `"+ "`
/// 접두사가 붙습니다.
pub fn line_diff(expected: &str, actual: &str) -> String {
    let changeset = Changeset::new(expected, actual, "\n");
    let mut out = String::new();
    for diff in &changeset.diffs {
        match diff {
            Difference::Same(text) => push_prefixed(&mut out, "  ", text),
            Difference::Rem(text) => push_prefixed(&mut out, "- ", text),
            Difference::Add(text) => push_prefixed(&mut out, "+ ", text),
        }
    }
    out
}

fn push_prefixed(out: &mut String, prefix: &str, text: &str) {
    for line in text.split('\n') {
        out.push_str(prefix);
        out.push_str(line);
        out.push('\n');
    }
}
