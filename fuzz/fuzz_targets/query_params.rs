#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use snortmon_query::params::{count_request, event_filter, page_number, rule_filter};

/// 퍼저용 쿼리 파라미터
#[derive(Arbitrary, Debug)]
struct FuzzParams {
    pairs: Vec<(FuzzName, String)>,
}

/// 알려진 이름 위주로 생성해 값 검증 경로까지 도달하게 한다
#[derive(Arbitrary, Debug)]
enum FuzzName {
    Known(u8),
    Other(String),
}

const KNOWN: &[&str] = &[
    "src_addr", "src_port", "dst_addr", "dst_port", "sid", "rev", "gid", "proto", "type",
    "period", "page",
];

impl FuzzName {
    fn into_string(self) -> String {
        match self {
            FuzzName::Known(i) => KNOWN[i as usize % KNOWN.len()].to_owned(),
            FuzzName::Other(name) => name,
        }
    }
}

fuzz_target!(|input: FuzzParams| {
    let params: Vec<(String, String)> = input
        .pairs
        .into_iter()
        .take(16)
        .map(|(name, value)| (name.into_string(), value))
        .collect();

    let _ = event_filter(&params);
    let _ = rule_filter(&params);
    let _ = count_request(&params);
    if let Ok(page) = page_number(&params) {
        assert!(page >= 1);
    }
});
