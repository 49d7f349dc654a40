//! 알림 레코드 파서
//!
//! Snort 3 `alert_json` 한 줄을 [`NewAlert`]로 변환합니다.
//!
//! # 처리 순서
//! 1. JSON 구문 검사. 최상위가 객체가 아니면 `Malformed`
//! 2. 허용 필드(src_addr, src_port, dst_addr, dst_port, proto, seconds, sid, rev, gid)만
//!    [`RawAlert`]로 투영. 나머지 필드는 버립니다.
//! 3. 필드 타입/범위 오류는 `InvalidField`, 필수 필드 누락은 `Incomplete`
//! 4. `(sid, rev, gid)`를 [`RuleCatalog`]에서 조회. 없으면 `UnknownRule`
//!
//! 카탈로그 자체의 장애는 레코드 실패가 아니므로 [`LineError::Catalog`]로 구분합니다.
//!
//! # 사용 예시
//! ```ignore
//! let parser = RecordParser::new(stores.rules.clone());
//! match parser.parse(line) {
//!     Ok(alert) => store.append(alert)?,
//!     Err(LineError::Parse(failure)) => warn!(kind = %failure.kind, "rejected"),
//!     Err(LineError::Catalog(e)) => return Err(IngestError::Catalog(e)),
//! };
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use snortmon_core::error::StorageError;
use snortmon_core::store::RuleCatalog;
use snortmon_core::types::{NewAlert, RuleKey};

/// 레코드 거부 사유 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParseFailureKind {
    /// JSON 구문 오류 또는 객체가 아닌 최상위 값
    Malformed,
    /// 필수 필드(seconds, sid, rev, gid) 누락
    Incomplete,
    /// 허용 필드의 타입 또는 값 범위 오류
    InvalidField,
    /// 규칙 카탈로그에 없는 (sid, rev, gid)
    UnknownRule,
}

impl ParseFailureKind {
    /// 메트릭 라벨 및 로그용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Incomplete => "incomplete",
            Self::InvalidField => "invalid_field",
            Self::UnknownRule => "unknown_rule",
        }
    }
}

impl fmt::Display for ParseFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 한 레코드의 거부 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// 분류
    pub kind: ParseFailureKind,
    /// 상세 사유
    pub reason: String,
}

impl ParseFailure {
    fn new(kind: ParseFailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// [`RecordParser::parse`]의 실패
#[derive(Debug)]
pub enum LineError {
    /// 레코드가 거부됨 (배치는 계속 진행)
    Parse(ParseFailure),
    /// 카탈로그 장애 (사이클 중단)
    Catalog(StorageError),
}

impl From<ParseFailure> for LineError {
    fn from(failure: ParseFailure) -> Self {
        Self::Parse(failure)
    }
}

/// 허용 필드만 담는 투영
#[derive(Debug, Deserialize)]
struct RawAlert {
    src_addr: Option<String>,
    src_port: Option<u16>,
    dst_addr: Option<String>,
    dst_port: Option<u16>,
    proto: Option<String>,
    seconds: Option<i64>,
    sid: Option<u32>,
    rev: Option<u32>,
    gid: Option<u32>,
}

/// 규칙 해석 전 단계의 레코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedAlert {
    /// 이벤트 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 출발지 주소
    pub src_addr: String,
    /// 출발지 포트
    pub src_port: Option<u16>,
    /// 목적지 주소
    pub dst_addr: String,
    /// 목적지 포트
    pub dst_port: Option<u16>,
    /// 프로토콜
    pub proto: String,
    /// 참조 규칙 키
    pub key: RuleKey,
}

/// 라인을 허용 필드로 투영합니다. I/O가 없는 순수 함수입니다.
pub fn project(line: &str) -> Result<ProjectedAlert, ParseFailure> {
    use ParseFailureKind::*;

    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| ParseFailure::new(Malformed, format!("invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(ParseFailure::new(Malformed, "top-level value is not an object"));
    }

    let raw: RawAlert = serde_json::from_value(value)
        .map_err(|e| ParseFailure::new(InvalidField, e.to_string()))?;

    let (Some(seconds), Some(sid), Some(rev), Some(gid)) = (raw.seconds, raw.sid, raw.rev, raw.gid)
    else {
        let missing: Vec<&str> = [
            ("seconds", raw.seconds.is_none()),
            ("sid", raw.sid.is_none()),
            ("rev", raw.rev.is_none()),
            ("gid", raw.gid.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        return Err(ParseFailure::new(
            Incomplete,
            format!("missing required field(s): {}", missing.join(", ")),
        ));
    };

    let key = RuleKey::new(sid, rev, gid);
    if !key.is_valid() {
        return Err(ParseFailure::new(
            InvalidField,
            format!("rule key components must be positive: {key}"),
        ));
    }

    let timestamp = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| ParseFailure::new(InvalidField, format!("seconds out of range: {seconds}")))?;

    Ok(ProjectedAlert {
        timestamp,
        src_addr: raw.src_addr.unwrap_or_default(),
        src_port: raw.src_port,
        dst_addr: raw.dst_addr.unwrap_or_default(),
        dst_port: raw.dst_port,
        proto: raw.proto.unwrap_or_default(),
        key,
    })
}

/// 규칙 해석까지 수행하는 레코드 파서
#[derive(Clone)]
pub struct RecordParser {
    catalog: Arc<dyn RuleCatalog>,
}

impl RecordParser {
    /// 카탈로그를 받아 파서를 생성합니다.
    pub fn new(catalog: Arc<dyn RuleCatalog>) -> Self {
        Self { catalog }
    }

    /// 한 줄을 파싱하고 규칙을 해석합니다.
    pub fn parse(&self, line: &str) -> Result<NewAlert, LineError> {
        let projected = project(line)?;
        let rule = self
            .catalog
            .resolve(projected.key)
            .map_err(LineError::Catalog)?
            .ok_or_else(|| {
                ParseFailure::new(
                    ParseFailureKind::UnknownRule,
                    format!("no rule matches {}", projected.key),
                )
            })?;

        Ok(NewAlert {
            timestamp: projected.timestamp,
            src_addr: projected.src_addr,
            src_port: projected.src_port,
            dst_addr: projected.dst_addr,
            dst_port: projected.dst_port,
            proto: projected.proto,
            rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snortmon_core::types::Rule;
    use snortmon_storage::MemoryStore;

    const LINE: &str = r#"{ "seconds" : 1700000000, "action" : "allow", "class" : "none", "b64_data" : "AAAA", "dir" : "C2S", "dst_addr" : "10.0.0.9", "dst_port" : 80, "eth_dst" : "00:00:00:00:00:00", "gid" : 1, "iface" : "eth0", "msg" : "TEST", "pkt_gen" : "stream_tcp", "pkt_len" : 0, "pkt_num" : 12, "priority" : 0, "proto" : "TCP", "rev" : 2, "rule" : "1:1000001:2", "service" : "unknown", "sid" : 1000001, "src_addr" : "10.0.0.1", "src_port" : 51234, "timestamp" : "11/14-22:13:20.000000", "vlan" : 0 }"#;

    fn parser_with_rule() -> RecordParser {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_if_absent(&Rule::new(RuleKey::new(1_000_001, 2, 1), "alert", "TEST"))
            .unwrap();
        RecordParser::new(store)
    }

    fn kind_of(line: &str) -> ParseFailureKind {
        match parser_with_rule().parse(line) {
            Err(LineError::Parse(f)) => f.kind,
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[test]
    fn parses_full_record() {
        let alert = parser_with_rule().parse(LINE).unwrap();
        assert_eq!(alert.src_addr, "10.0.0.1");
        assert_eq!(alert.src_port, Some(51234));
        assert_eq!(alert.dst_port, Some(80));
        assert_eq!(alert.proto, "TCP");
        assert_eq!(alert.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(alert.rule.key, RuleKey::new(1_000_001, 2, 1));
        assert_eq!(alert.rule.message, "TEST");
    }

    #[test]
    fn optional_fields_default() {
        let alert = parser_with_rule()
            .parse(r#"{"seconds": 10, "sid": 1000001, "rev": 2, "gid": 1}"#)
            .unwrap();
        assert_eq!(alert.src_addr, "");
        assert_eq!(alert.proto, "");
        assert_eq!(alert.src_port, None);
        assert_eq!(alert.dst_port, None);
    }

    #[test]
    fn bad_json_is_malformed() {
        assert_eq!(kind_of("{not json"), ParseFailureKind::Malformed);
        assert_eq!(kind_of("[1, 2, 3]"), ParseFailureKind::Malformed);
        assert_eq!(kind_of("42"), ParseFailureKind::Malformed);
    }

    #[test]
    fn missing_key_fields_are_incomplete() {
        assert_eq!(
            kind_of(r#"{"seconds": 1, "sid": 1000001, "rev": 2}"#),
            ParseFailureKind::Incomplete
        );
        assert_eq!(
            kind_of(r#"{"sid": 1000001, "rev": 2, "gid": 1}"#),
            ParseFailureKind::Incomplete
        );
        assert_eq!(
            kind_of(r#"{"seconds": null, "sid": 1000001, "rev": 2, "gid": 1}"#),
            ParseFailureKind::Incomplete
        );
    }

    #[test]
    fn wrong_types_are_invalid_field() {
        assert_eq!(
            kind_of(r#"{"seconds": 1, "sid": "1000001", "rev": 2, "gid": 1}"#),
            ParseFailureKind::InvalidField
        );
        assert_eq!(
            kind_of(r#"{"seconds": 1, "sid": 1000001, "rev": 2, "gid": 1, "src_port": 70000}"#),
            ParseFailureKind::InvalidField
        );
        assert_eq!(
            kind_of(r#"{"seconds": 1, "sid": 0, "rev": 2, "gid": 1}"#),
            ParseFailureKind::InvalidField
        );
        assert_eq!(
            kind_of(r#"{"seconds": 9223372036854775807, "sid": 1000001, "rev": 2, "gid": 1}"#),
            ParseFailureKind::InvalidField
        );
    }

    #[test]
    fn unknown_rule_is_rejected() {
        assert_eq!(
            kind_of(r#"{"seconds": 1, "sid": 9, "rev": 9, "gid": 9}"#),
            ParseFailureKind::UnknownRule
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let projected = project(
            r#"{"seconds": 1, "sid": 1, "rev": 1, "gid": 1, "mark_as_deleted": true, "id": 5}"#,
        )
        .unwrap();
        assert_eq!(projected.key, RuleKey::new(1, 1, 1));
    }

    #[test]
    fn incomplete_reason_lists_missing_fields() {
        let failure = project(r#"{"seconds": 1, "sid": 1}"#).unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::Incomplete);
        assert!(failure.reason.contains("rev"));
        assert!(failure.reason.contains("gid"));
        assert!(!failure.reason.contains("sid"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn project_arbitrary_text_does_not_panic(line in ".{0,256}") {
                let _ = project(&line);
            }

            #[test]
            fn project_accepts_any_positive_key(
                sid in 1u32..=u32::MAX, rev in 1u32..=u32::MAX, gid in 1u32..=u32::MAX, secs in 0i64..4_000_000_000
            ) {
                let line = format!(r#"{{"seconds": {secs}, "sid": {sid}, "rev": {rev}, "gid": {gid}}}"#);
                let projected = project(&line).unwrap();
                prop_assert_eq!(projected.key, RuleKey::new(sid, rev, gid));
                prop_assert_eq!(projected.timestamp.timestamp(), secs);
            }
        }
    }
}
