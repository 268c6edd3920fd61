#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use stashtest_harness::FixtureParser;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(parser) = FixtureParser::new() {
            let _ = parser.parse(Path::new("fuzz/case.txt"), text);
        }
    }
});
