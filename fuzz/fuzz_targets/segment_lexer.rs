#![no_main]

use libfuzzer_sys::fuzz_target;
use stashtest_harness::transform::lexer::tokenize;

fuzz_target!(|data: &[u8]| {
    if let Ok(segment) = std::str::from_utf8(data) {
        let _ = tokenize(segment);
    }
});
