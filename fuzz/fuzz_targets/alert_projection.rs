#![no_main]

use libfuzzer_sys::fuzz_target;
use snortmon_ingest::parser::project;

fuzz_target!(|data: &[u8]| {
    // 센서 출력은 UTF-8이 보장되지 않으므로 손실 변환 후 투영
    let line = String::from_utf8_lossy(data);

    // 크래시나 패닉 없이 Ok 또는 ParseFailure를 반환해야 한다
    if let Ok(alert) = project(&line) {
        assert!(alert.key.is_valid());
    }
});
