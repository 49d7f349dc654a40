//! 규칙 메타데이터 덤프 로더
//!
//! 규칙 컴파일러(`snort --dump-rule-meta`)의 출력은 한 줄에 JSON 객체 하나이며
//! `sid`, `rev`, `gid`, `action`, `msg`와 그 밖의 임의 필드를 담고 있습니다.
//! 객체 전체를 규칙 메타데이터로 보관하고, 카탈로그에 없는 키만 새로 추가합니다.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use snortmon_core::store::RuleCatalog;
use snortmon_core::types::{Rule, RuleKey};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::tail::{decode_line, split_complete_lines};

/// 규칙 갱신 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// 새로 추가된 규칙 수
    pub added: u64,
    /// 이미 존재해 건너뛴 규칙 수
    pub skipped: u64,
    /// 형식 오류로 건너뛴 라인 수
    pub invalid: u64,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} already present, {} invalid",
            self.added, self.skipped, self.invalid
        )
    }
}

/// 덤프 파일을 읽어 카탈로그에 없는 규칙을 추가합니다.
///
/// 파일을 읽을 수 없으면 [`IngestError::Dump`], 카탈로그 장애는 [`IngestError::Catalog`]입니다.
/// 개별 라인의 형식 오류는 경고 후 건너뜁니다.
pub fn load_rule_dump(path: &Path, catalog: &dyn RuleCatalog) -> Result<RefreshReport, IngestError> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::Dump {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut report = RefreshReport::default();
    let (lines, consumed) = split_complete_lines(&bytes);
    // 개행 없이 끝나는 마지막 라인도 처리
    let tail = (consumed < bytes.len()).then(|| &bytes[consumed..]);

    for raw in lines.into_iter().chain(tail) {
        let line = decode_line(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match rule_from_line(line) {
            Ok(rule) => {
                if catalog.insert_if_absent(&rule).map_err(IngestError::Catalog)? {
                    debug!(rule = %rule.key, "rule added");
                    report.added += 1;
                } else {
                    report.skipped += 1;
                }
            }
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "skipping rule dump line");
                report.invalid += 1;
            }
        }
    }

    Ok(report)
}

/// 덤프 한 줄을 규칙으로 변환합니다.
pub fn rule_from_line(line: &str) -> Result<Rule, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "top-level value is not an object".to_owned())?;

    let key_part = |name: &str| -> Result<u32, String> {
        let field = object
            .get(name)
            .ok_or_else(|| format!("rule data is not complete: missing '{name}'"))?;
        field
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("'{name}' must be a positive integer, got {field}"))
    };
    let text = |name: &str| -> Result<String, String> {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| format!("rule data is not complete: missing '{name}'"))
    };

    let key = RuleKey::new(key_part("sid")?, key_part("rev")?, key_part("gid")?);
    let action = text("action")?;
    let message = text("msg")?;
    Ok(Rule::new(key, action, message).with_metadata(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use snortmon_core::query::RuleFilter;
    use snortmon_storage::MemoryStore;

    const DUMP: &str = concat!(
        r#"{"gid": 1, "sid": 1000001, "rev": 2, "msg": "TEST rule", "action": "alert", "rule": "alert tcp any any -> any any"}"#,
        "\n",
        r#"{"gid": 1, "sid": 1000002, "rev": 1, "msg": "second", "action": "block"}"#,
        "\n",
        r#"{"gid": 1, "sid": 1000003, "rev": 1, "action": "alert"}"#,
        "\n",
        "not json\n",
        "\n",
        r#"{"gid": 3, "sid": 7, "rev": 1, "msg": "no newline", "action": "drop"}"#,
    );

    #[test]
    fn loads_new_rules_and_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, DUMP).unwrap();
        let store = MemoryStore::new();

        let report = load_rule_dump(&path, &store).unwrap();
        assert_eq!(
            report,
            RefreshReport {
                added: 3,
                skipped: 0,
                invalid: 2
            }
        );

        let rule = store.resolve(RuleKey::new(1_000_001, 2, 1)).unwrap().unwrap();
        assert_eq!(rule.message, "TEST rule");
        assert_eq!(rule.metadata["rule"], "alert tcp any any -> any any");

        // 두 번째 로드는 모두 기존 규칙
        let again = load_rule_dump(&path, &store).unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.skipped, 3);
        assert_eq!(store.count_rules(&RuleFilter::default()).unwrap(), 3);
    }

    #[test]
    fn missing_dump_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_rule_dump(&dir.path().join("absent.json"), &MemoryStore::new()).unwrap_err();
        assert!(matches!(err, IngestError::Dump { .. }));
    }

    #[test]
    fn rule_from_line_validates_key() {
        assert!(rule_from_line(r#"{"gid": 1, "sid": 0, "rev": 1, "msg": "m", "action": "a"}"#).is_err());
        assert!(rule_from_line(r#"{"gid": 1, "sid": "5", "rev": 1, "msg": "m", "action": "a"}"#).is_err());
        let err = rule_from_line(r#"{"gid": 1, "rev": 1, "msg": "m", "action": "a"}"#).unwrap_err();
        assert!(err.contains("sid"));
    }

    #[test]
    fn report_display() {
        let report = RefreshReport {
            added: 2,
            skipped: 5,
            invalid: 1,
        };
        assert_eq!(report.to_string(), "2 added, 5 already present, 1 invalid");
    }
}
