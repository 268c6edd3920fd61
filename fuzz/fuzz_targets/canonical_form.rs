#![no_main]

use libfuzzer_sys::fuzz_target;
use stashtest_harness::canonicalize;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        // 같은 문서는 항상 같은 정규형을 가져야 함
        assert_eq!(canonicalize(&value), canonicalize(&value.clone()));
    }
});
