//! SQLite 저장소
//!
//! 쓰기(append, 삭제 표시, 규칙 추가)는 하나의 writer 연결을 `Mutex`로 보호하여 수행합니다.
//! 읽기는 호출마다 읽기 전용 연결을 새로 엽니다. 데이터베이스는 WAL 모드로 동작하므로
//! 조회가 수집 writer를 기다리지 않습니다.
//!
//! 메모리 데이터베이스(`open_in_memory`)는 별도 연결을 열 수 없어 writer 연결로 읽습니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use tracing::{debug, info};

use snortmon_core::error::StorageError;
use snortmon_core::query::{CountRow, EventFilter, GroupBy, RuleFilter};
use snortmon_core::store::{EventStore, RuleCatalog};
use snortmon_core::types::{AlertRecord, NewAlert, Rule, RuleKey};

use crate::error::map_sqlite_err;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sid INTEGER NOT NULL,
    rev INTEGER NOT NULL,
    gid INTEGER NOT NULL,
    action TEXT NOT NULL,
    message TEXT NOT NULL,
    metadata TEXT NOT NULL,
    UNIQUE (sid, rev, gid)
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    src_addr TEXT NOT NULL,
    src_port INTEGER,
    dst_addr TEXT NOT NULL,
    dst_port INTEGER,
    proto TEXT NOT NULL,
    rule_id INTEGER NOT NULL REFERENCES rules(id) ON DELETE RESTRICT,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_events_visible_ts
    ON events(deleted, timestamp);

CREATE INDEX IF NOT EXISTS idx_events_rule
    ON events(rule_id);

CREATE INDEX IF NOT EXISTS idx_events_addr
    ON events(src_addr, dst_addr);
"#;

const EVENT_COLUMNS: &str = "e.id, e.timestamp, e.src_addr, e.src_port, e.dst_addr, e.dst_port, \
     e.proto, e.deleted, r.sid, r.rev, r.gid, r.action, r.message, r.metadata";

// 규칙 행이 사라진 이벤트를 감지하기 위해 LEFT JOIN 사용
const EVENT_FROM: &str = "FROM events e LEFT JOIN rules r ON r.id = e.rule_id";

/// SQLite 기반 이벤트 저장소 + 규칙 카탈로그
pub struct SqliteStore {
    /// 데이터베이스 파일 경로 (`None`이면 메모리 DB)
    path: Option<PathBuf>,
    /// 쓰기 전용 연결
    writer: Mutex<Connection>,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// 파일 데이터베이스를 열고 스키마를 초기화합니다.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!("{}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        conn.busy_timeout(busy_timeout).map_err(map_sqlite_err)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(map_sqlite_err)?;
        debug!(path = %path.display(), journal_mode = %mode, "opened sqlite store");

        let store = Self {
            path: Some(path.to_path_buf()),
            writer: Mutex::new(conn),
            busy_timeout,
        };
        store.init_schema()?;
        info!(path = %path.display(), "sqlite store ready");
        Ok(store)
    }

    /// 메모리 데이터베이스를 엽니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        let store = Self {
            path: None,
            writer: Mutex::new(conn),
            busy_timeout: Duration::from_secs(5),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.writer.lock();
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(map_sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)
    }

    /// 읽기 작업을 실행합니다.
    ///
    /// 파일 DB는 새 읽기 전용 연결에서, 메모리 DB는 writer 연결에서 실행합니다.
    fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        match &self.path {
            Some(path) => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(map_sqlite_err)?;
                conn.busy_timeout(self.busy_timeout)
                    .map_err(map_sqlite_err)?;
                f(&conn)
            }
            None => {
                let conn = self.writer.lock();
                f(&conn)
            }
        }
    }
}

/// 이벤트 필터를 WHERE 절과 바인딩 값으로 변환합니다.
///
/// 소프트 삭제된 행은 항상 제외됩니다.
fn where_clause(filter: &EventFilter) -> (String, Vec<Value>) {
    let mut conditions = vec!["e.deleted = 0".to_owned()];
    let mut values: Vec<Value> = Vec::new();

    let mut push = |column: &str, value: Value, op: &str| {
        values.push(value);
        conditions.push(format!("{column} {op} ?{}", values.len()));
    };

    if let Some(v) = &filter.src_addr {
        push("e.src_addr", Value::Text(v.clone()), "=");
    }
    if let Some(v) = filter.src_port {
        push("e.src_port", Value::Integer(i64::from(v)), "=");
    }
    if let Some(v) = &filter.dst_addr {
        push("e.dst_addr", Value::Text(v.clone()), "=");
    }
    if let Some(v) = filter.dst_port {
        push("e.dst_port", Value::Integer(i64::from(v)), "=");
    }
    if let Some(v) = filter.sid {
        push("r.sid", Value::Integer(i64::from(v)), "=");
    }
    if let Some(v) = &filter.proto {
        push("e.proto", Value::Text(v.clone()), "=");
    }
    if let Some(v) = filter.since {
        push("e.timestamp", Value::Integer(v.timestamp()), ">=");
    }

    (format!("WHERE {}", conditions.join(" AND ")), values)
}

fn rule_where_clause(filter: &RuleFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (column, value) in [("sid", filter.sid), ("rev", filter.rev), ("gid", filter.gid)] {
        if let Some(v) = value {
            values.push(Value::Integer(i64::from(v)));
            conditions.push(format!("{column} = ?{}", values.len()));
        }
    }
    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), values)
    }
}

/// 조인 결과 한 행 (검증 전)
struct EventRow {
    id: i64,
    timestamp: i64,
    src_addr: String,
    src_port: Option<u16>,
    dst_addr: String,
    dst_port: Option<u16>,
    proto: String,
    deleted: bool,
    sid: Option<u32>,
    rev: Option<u32>,
    gid: Option<u32>,
    action: Option<String>,
    message: Option<String>,
    metadata: Option<String>,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            src_addr: row.get(2)?,
            src_port: row.get(3)?,
            dst_addr: row.get(4)?,
            dst_port: row.get(5)?,
            proto: row.get(6)?,
            deleted: row.get(7)?,
            sid: row.get(8)?,
            rev: row.get(9)?,
            gid: row.get(10)?,
            action: row.get(11)?,
            message: row.get(12)?,
            metadata: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<AlertRecord, StorageError> {
        let (Some(sid), Some(rev), Some(gid)) = (self.sid, self.rev, self.gid) else {
            return Err(StorageError::Corrupt(format!(
                "event {} references a missing rule",
                self.id
            )));
        };
        let rule = Rule {
            key: RuleKey::new(sid, rev, gid),
            action: self.action.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            metadata: parse_metadata(self.metadata.as_deref())?,
        };
        Ok(AlertRecord {
            id: self.id,
            timestamp: epoch_to_utc(self.timestamp)?,
            src_addr: self.src_addr,
            src_port: self.src_port,
            dst_addr: self.dst_addr,
            dst_port: self.dst_port,
            proto: self.proto,
            rule,
            deleted: self.deleted,
        })
    }
}

fn epoch_to_utc(secs: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {secs}")))
}

fn parse_metadata(raw: Option<&str>) -> Result<serde_json::Value, StorageError> {
    match raw {
        None => Ok(serde_json::Value::Null),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| StorageError::Corrupt(format!("rule metadata is not JSON: {e}"))),
    }
}

fn rule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(RuleKey, String, String, String)> {
    Ok((
        RuleKey::new(row.get(0)?, row.get(1)?, row.get(2)?),
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_rule(
    (key, action, message, metadata): (RuleKey, String, String, String),
) -> Result<Rule, StorageError> {
    Ok(Rule {
        key,
        action,
        message,
        metadata: parse_metadata(Some(&metadata))?,
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl EventStore for SqliteStore {
    fn append(&self, alert: NewAlert) -> Result<AlertRecord, StorageError> {
        let conn = self.writer.lock();
        let key = alert.rule.key;
        let inserted = conn
            .prepare_cached(
                "INSERT INTO events (timestamp, src_addr, src_port, dst_addr, dst_port, proto, rule_id)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, id FROM rules
                 WHERE sid = ?7 AND rev = ?8 AND gid = ?9",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    alert.timestamp.timestamp(),
                    alert.src_addr,
                    alert.src_port,
                    alert.dst_addr,
                    alert.dst_port,
                    alert.proto,
                    key.sid,
                    key.rev,
                    key.gid,
                ])
            })
            .map_err(map_sqlite_err)?;

        if inserted == 0 {
            return Err(StorageError::Integrity(format!(
                "rule {key} does not exist"
            )));
        }
        let id = conn.last_insert_rowid();
        Ok(alert.into_record(id))
    }

    fn count(&self, filter: &EventFilter) -> Result<u64, StorageError> {
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) {EVENT_FROM} {clause}");
        self.read(|conn| {
            let n: i64 = conn
                .query_row(&sql, params_from_iter(values), |row| row.get(0))
                .map_err(map_sqlite_err)?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    fn list(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AlertRecord>, StorageError> {
        let (clause, mut values) = where_clause(filter);
        values.push(Value::Integer(to_i64(limit)));
        values.push(Value::Integer(to_i64(offset)));
        let n = values.len();
        let sql = format!(
            "SELECT {EVENT_COLUMNS} {EVENT_FROM} {clause} ORDER BY e.id ASC LIMIT ?{} OFFSET ?{n}",
            n - 1
        );
        self.read(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(map_sqlite_err)?;
            let rows = stmt
                .query_map(params_from_iter(values), EventRow::from_row)
                .map_err(map_sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_sqlite_err)?;
            rows.into_iter().map(EventRow::into_record).collect()
        })
    }

    fn mark_deleted(&self, filter: &EventFilter) -> Result<u64, StorageError> {
        let (clause, values) = where_clause(filter);
        let sql = format!(
            "UPDATE events SET deleted = 1 WHERE id IN (SELECT e.id {EVENT_FROM} {clause})"
        );
        let conn = self.writer.lock();
        let changed = conn
            .execute(&sql, params_from_iter(values))
            .map_err(map_sqlite_err)?;
        Ok(changed as u64)
    }

    fn aggregate(
        &self,
        filter: &EventFilter,
        group: GroupBy,
    ) -> Result<Vec<CountRow>, StorageError> {
        let (clause, values) = where_clause(filter);
        self.read(|conn| match group {
            GroupBy::Sid => {
                let sql = format!(
                    "SELECT r.sid, COUNT(*) AS n {EVENT_FROM} {clause} \
                     GROUP BY r.sid ORDER BY n ASC, r.sid ASC"
                );
                let mut stmt = conn.prepare(&sql).map_err(map_sqlite_err)?;
                let rows = stmt
                    .query_map(params_from_iter(values), |row| {
                        Ok((row.get::<_, Option<u32>>(0)?, row.get::<_, i64>(1)?))
                    })
                    .map_err(map_sqlite_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_sqlite_err)?;
                rows.into_iter()
                    .map(|(sid, n)| match sid {
                        Some(sid) => Ok(CountRow::Sid {
                            sid,
                            count: u64::try_from(n).unwrap_or(0),
                        }),
                        None => Err(StorageError::Corrupt(
                            "events reference a missing rule".to_owned(),
                        )),
                    })
                    .collect()
            }
            GroupBy::Addr => {
                let sql = format!(
                    "SELECT e.src_addr, e.dst_addr, COUNT(*) AS n {EVENT_FROM} {clause} \
                     GROUP BY e.src_addr, e.dst_addr ORDER BY n ASC, e.src_addr ASC, e.dst_addr ASC"
                );
                let mut stmt = conn.prepare(&sql).map_err(map_sqlite_err)?;
                stmt.query_map(params_from_iter(values), |row| {
                    Ok(CountRow::Addr {
                        src_addr: row.get(0)?,
                        dst_addr: row.get(1)?,
                        count: u64::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                    })
                })
                .map_err(map_sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_sqlite_err)
            }
        })
    }

    fn purge(&self) -> Result<u64, StorageError> {
        let conn = self.writer.lock();
        let removed = conn
            .execute("DELETE FROM events", [])
            .map_err(map_sqlite_err)?;
        info!(removed, "purged all events");
        Ok(removed as u64)
    }
}

impl RuleCatalog for SqliteStore {
    fn resolve(&self, key: RuleKey) -> Result<Option<Rule>, StorageError> {
        // 수집 경로에서 라인마다 호출되므로 writer 연결의 캐시된 statement 사용
        let conn = self.writer.lock();
        let row = conn
            .prepare_cached(
                "SELECT sid, rev, gid, action, message, metadata FROM rules
                 WHERE sid = ?1 AND rev = ?2 AND gid = ?3",
            )
            .and_then(|mut stmt| {
                stmt.query_row(params![key.sid, key.rev, key.gid], rule_from_row)
                    .optional()
            })
            .map_err(map_sqlite_err)?;
        row.map(build_rule).transpose()
    }

    fn insert_if_absent(&self, rule: &Rule) -> Result<bool, StorageError> {
        let metadata = serde_json::to_string(&rule.metadata)
            .map_err(|e| StorageError::Query(format!("metadata serialization failed: {e}")))?;
        let conn = self.writer.lock();
        let inserted = conn
            .prepare_cached(
                "INSERT OR IGNORE INTO rules (sid, rev, gid, action, message, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    rule.key.sid,
                    rule.key.rev,
                    rule.key.gid,
                    rule.action,
                    rule.message,
                    metadata,
                ])
            })
            .map_err(map_sqlite_err)?;
        Ok(inserted == 1)
    }

    fn count_rules(&self, filter: &RuleFilter) -> Result<u64, StorageError> {
        let (clause, values) = rule_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM rules {clause}");
        self.read(|conn| {
            let n: i64 = conn
                .query_row(&sql, params_from_iter(values), |row| row.get(0))
                .map_err(map_sqlite_err)?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    fn list_rules(
        &self,
        filter: &RuleFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Rule>, StorageError> {
        let (clause, mut values) = rule_where_clause(filter);
        values.push(Value::Integer(to_i64(limit)));
        values.push(Value::Integer(to_i64(offset)));
        let n = values.len();
        let sql = format!(
            "SELECT sid, rev, gid, action, message, metadata FROM rules {clause} \
             ORDER BY sid ASC, gid ASC, rev ASC LIMIT ?{} OFFSET ?{n}",
            n - 1
        );
        self.read(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(map_sqlite_err)?;
            let rows = stmt
                .query_map(params_from_iter(values), rule_from_row)
                .map_err(map_sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_sqlite_err)?;
            rows.into_iter().map(build_rule).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(sid: u32) -> Rule {
        Rule::new(RuleKey::new(sid, 1, 1), "alert", format!("rule {sid}"))
    }

    fn alert(sid: u32, src: &str, dst: &str, ts: i64) -> NewAlert {
        NewAlert {
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            src_addr: src.to_owned(),
            src_port: Some(1234),
            dst_addr: dst.to_owned(),
            dst_port: None,
            proto: "TCP".to_owned(),
            rule: rule(sid),
        }
    }

    #[test]
    fn where_clause_always_excludes_deleted() {
        let (clause, values) = where_clause(&EventFilter::all());
        assert_eq!(clause, "WHERE e.deleted = 0");
        assert!(values.is_empty());
    }

    #[test]
    fn where_clause_numbers_placeholders_in_order() {
        let filter = EventFilter {
            src_addr: Some("10.0.0.1".to_owned()),
            sid: Some(5),
            ..Default::default()
        };
        let (clause, values) = where_clause(&filter);
        assert_eq!(clause, "WHERE e.deleted = 0 AND e.src_addr = ?1 AND r.sid = ?2");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn append_assigns_ascending_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_if_absent(&rule(1)).unwrap();
        let a = store.append(alert(1, "a", "b", 10)).unwrap();
        let b = store.append(alert(1, "a", "b", 11)).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn append_with_unknown_rule_is_integrity_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.append(alert(99, "a", "b", 0)).unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)));
    }

    #[test]
    fn rule_with_events_cannot_be_deleted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_if_absent(&rule(1)).unwrap();
        store.append(alert(1, "a", "b", 0)).unwrap();
        let conn = store.writer.lock();
        let err = conn
            .execute("DELETE FROM rules WHERE sid = 1", [])
            .unwrap_err();
        assert!(matches!(map_sqlite_err(err), StorageError::Integrity(_)));
    }

    #[test]
    fn missing_rule_row_surfaces_as_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_if_absent(&rule(1)).unwrap();
        store.append(alert(1, "a", "b", 0)).unwrap();
        {
            let conn = store.writer.lock();
            conn.pragma_update(None, "foreign_keys", false).unwrap();
            conn.execute("DELETE FROM rules", []).unwrap();
        }
        let err = store.list(&EventFilter::all(), 0, 10).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn insert_if_absent_reports_new_rules_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.insert_if_absent(&rule(1)).unwrap());
        assert!(!store.insert_if_absent(&rule(1)).unwrap());
        assert_eq!(store.count_rules(&RuleFilter::default()).unwrap(), 1);
    }

    #[test]
    fn resolve_is_exact_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        let r = rule(7).with_metadata(serde_json::json!({"classtype": "trojan"}));
        store.insert_if_absent(&r).unwrap();
        assert_eq!(store.resolve(RuleKey::new(7, 1, 1)).unwrap(), Some(r));
        assert_eq!(store.resolve(RuleKey::new(7, 2, 1)).unwrap(), None);
    }
}
