#![no_main]

use libfuzzer_sys::fuzz_target;
use snortmon_ingest::refresh::dump::rule_from_line;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = rule_from_line(line);
    }
});
