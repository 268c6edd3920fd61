#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use stashtest_harness::{ConfigTransformer, PortRegistry};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzPipeline {
    /// 세그먼트 목록 (최대 16개로 제한)
    segments: Vec<FuzzSegment>,
    /// 세그먼트 사이에 끼워 넣을 텍스트
    filler: String,
}

#[derive(Arbitrary, Debug)]
struct FuzzSegment {
    output: bool,
    plugin: String,
    id: String,
    quoted: bool,
}

fuzz_target!(|input: FuzzPipeline| {
    let Ok(transformer) = ConfigTransformer::new() else {
        return;
    };

    let mut source = String::new();
    for segment in input.segments.iter().take(16) {
        let marker = if segment.output { "###OUTPUT###" } else { "###INPUT###" };
        let id = if segment.quoted {
            format!("\"{}\"", segment.id)
        } else {
            segment.id.clone()
        };
        source.push_str(&format!(
            "{marker} {} {{ id => {id} }} ###END###\n{}\n",
            segment.plugin, input.filler
        ));
    }

    let mut registry = PortRegistry::new();
    if transformer.transform(&source, &mut registry).is_ok() {
        // 할당된 포트는 서로 겹치지 않아야 함
        let ports = registry.port_forwarding_spec().ports;
        let mut unique = ports.clone();
        unique.dedup();
        assert_eq!(ports, unique);
    }
});
