#![no_main]

use libfuzzer_sys::fuzz_target;
use snortmon_ingest::tail::{decode_line, split_complete_lines};

fuzz_target!(|data: &[u8]| {
    let (lines, consumed) = split_complete_lines(data);

    // 소비한 바이트는 항상 개행으로 끝나고, 나머지에는 개행이 없다
    assert!(consumed <= data.len());
    if consumed > 0 {
        assert_eq!(data[consumed - 1], b'\n');
    }
    assert!(!data[consumed..].contains(&b'\n'));

    for line in lines {
        assert!(!line.contains(&b'\n'));
        let _ = decode_line(line);
    }
});
