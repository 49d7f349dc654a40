//! 저장소 계약 테스트
//!
//! 같은 시나리오를 SQLite(파일), SQLite(메모리), 메모리 백엔드에 모두 적용합니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use snortmon_core::query::{CountRow, EventFilter, GroupBy, RuleFilter, TimeWindow};
use snortmon_core::types::{NewAlert, Rule, RuleKey};
use snortmon_storage::{MemoryStore, SqliteStore, Stores};

fn backends() -> Vec<(&'static str, Stores, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = SqliteStore::open(dir.path().join("events.db"), Duration::from_secs(1))
        .expect("open sqlite file");
    vec![
        ("sqlite-file", Stores::from_backend(Arc::new(file)), Some(dir)),
        (
            "sqlite-memory",
            Stores::from_backend(Arc::new(SqliteStore::open_in_memory().expect("open"))),
            None,
        ),
        ("memory", Stores::from_backend(Arc::new(MemoryStore::new())), None),
    ]
}

fn rule(sid: u32) -> Rule {
    Rule::new(RuleKey::new(sid, 1, 1), "alert", format!("rule {sid}"))
}

fn alert(sid: u32, src: &str, dst: &str, dst_port: Option<u16>, secs: i64) -> NewAlert {
    NewAlert {
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        src_addr: src.to_owned(),
        src_port: Some(40000),
        dst_addr: dst.to_owned(),
        dst_port,
        proto: "TCP".to_owned(),
        rule: rule(sid),
    }
}

fn seed(stores: &Stores) {
    for sid in [1000, 2000, 3000] {
        stores.rules.insert_if_absent(&rule(sid)).expect("insert rule");
    }
    let now = Utc::now().timestamp();
    let rows = [
        alert(1000, "10.0.0.1", "10.0.0.9", Some(80), now - 60),
        alert(1000, "10.0.0.1", "10.0.0.9", Some(443), now - 120),
        alert(2000, "10.0.0.2", "10.0.0.9", Some(80), now - 3 * 86_400),
        alert(3000, "10.0.0.3", "10.0.0.8", None, now - 40 * 86_400),
        alert(1000, "10.0.0.1", "10.0.0.7", Some(22), now - 10),
    ];
    for row in rows {
        stores.events.append(row).expect("append");
    }
}

#[test]
fn list_is_filtered_anded_and_ordered_by_id() {
    for (name, stores, _guard) in backends() {
        seed(&stores);

        let all = stores.events.list(&EventFilter::all(), 0, 100).unwrap();
        assert_eq!(all.len(), 5, "{name}");
        assert!(all.windows(2).all(|w| w[0].id < w[1].id), "{name}");

        let filter = EventFilter {
            sid: Some(1000),
            dst_addr: Some("10.0.0.9".to_owned()),
            ..Default::default()
        };
        let rows = stores.events.list(&filter, 0, 100).unwrap();
        assert_eq!(rows.len(), 2, "{name}");
        assert!(rows.iter().all(|r| r.rule.key.sid == 1000), "{name}");
        assert_eq!(stores.events.count(&filter).unwrap(), 2, "{name}");

        let by_port = EventFilter {
            dst_port: Some(80),
            ..Default::default()
        };
        assert_eq!(stores.events.count(&by_port).unwrap(), 2, "{name}");
    }
}

#[test]
fn list_pages_with_offset_and_limit() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        let first = stores.events.list(&EventFilter::all(), 0, 2).unwrap();
        let second = stores.events.list(&EventFilter::all(), 2, 2).unwrap();
        let third = stores.events.list(&EventFilter::all(), 4, 2).unwrap();
        assert_eq!(first.len(), 2, "{name}");
        assert_eq!(second.len(), 2, "{name}");
        assert_eq!(third.len(), 1, "{name}");
        assert!(first[1].id < second[0].id, "{name}");
    }
}

#[test]
fn soft_delete_hides_rows_and_is_idempotent() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        let filter = EventFilter {
            src_addr: Some("10.0.0.1".to_owned()),
            ..Default::default()
        };
        assert_eq!(stores.events.mark_deleted(&filter).unwrap(), 3, "{name}");
        assert_eq!(stores.events.mark_deleted(&filter).unwrap(), 0, "{name}");
        assert_eq!(stores.events.count(&EventFilter::all()).unwrap(), 2, "{name}");

        assert_eq!(
            stores.events.mark_deleted(&EventFilter::all()).unwrap(),
            2,
            "{name}"
        );
        assert!(
            stores
                .events
                .list(&EventFilter::all(), 0, 10)
                .unwrap()
                .is_empty(),
            "{name}"
        );
    }
}

#[test]
fn aggregate_by_sid_ascending_count() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        let rows = stores
            .events
            .aggregate(&EventFilter::all(), GroupBy::Sid)
            .unwrap();
        assert_eq!(
            rows,
            vec![
                CountRow::Sid { sid: 2000, count: 1 },
                CountRow::Sid { sid: 3000, count: 1 },
                CountRow::Sid { sid: 1000, count: 3 },
            ],
            "{name}"
        );
    }
}

#[test]
fn aggregate_by_addr_pair() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        let rows = stores
            .events
            .aggregate(&EventFilter::all(), GroupBy::Addr)
            .unwrap();
        assert_eq!(rows.len(), 4, "{name}");
        assert_eq!(
            rows.last(),
            Some(&CountRow::Addr {
                src_addr: "10.0.0.1".to_owned(),
                dst_addr: "10.0.0.9".to_owned(),
                count: 2,
            }),
            "{name}"
        );
    }
}

#[test]
fn aggregate_respects_time_window() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        let now = Utc::now();
        let count_in = |window: TimeWindow| -> u64 {
            let filter = EventFilter {
                since: window.since(now),
                ..Default::default()
            };
            stores
                .events
                .aggregate(&filter, GroupBy::Sid)
                .unwrap()
                .iter()
                .map(CountRow::count)
                .sum()
        };
        assert_eq!(count_in(TimeWindow::Day), 3, "{name}");
        assert_eq!(count_in(TimeWindow::Week), 4, "{name}");
        assert_eq!(count_in(TimeWindow::Month), 4, "{name}");
        assert_eq!(count_in(TimeWindow::All), 5, "{name}");
    }
}

#[test]
fn aggregate_excludes_soft_deleted() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        stores
            .events
            .mark_deleted(&EventFilter {
                sid: Some(1000),
                ..Default::default()
            })
            .unwrap();
        let rows = stores
            .events
            .aggregate(&EventFilter::all(), GroupBy::Sid)
            .unwrap();
        assert!(rows.iter().all(|r| !matches!(r, CountRow::Sid { sid: 1000, .. })), "{name}");
    }
}

#[test]
fn day_window_boundary() {
    for (name, stores, _guard) in backends() {
        stores.rules.insert_if_absent(&rule(1)).unwrap();
        let now = Utc::now();
        let inside = now - TimeDelta::hours(23);
        let outside = now - TimeDelta::hours(25);
        for ts in [inside, outside] {
            stores
                .events
                .append(alert(1, "a", "b", None, ts.timestamp()))
                .unwrap();
        }
        let filter = EventFilter {
            since: TimeWindow::Day.since(now),
            ..Default::default()
        };
        assert_eq!(stores.events.count(&filter).unwrap(), 1, "{name}");
    }
}

#[test]
fn purge_removes_everything() {
    for (name, stores, _guard) in backends() {
        seed(&stores);
        stores.events.mark_deleted(&EventFilter::all()).unwrap();
        assert_eq!(stores.events.purge().unwrap(), 5, "{name}");
        assert_eq!(stores.events.purge().unwrap(), 0, "{name}");
        // 규칙은 남아 있음
        assert_eq!(stores.rules.count_rules(&RuleFilter::default()).unwrap(), 3, "{name}");
    }
}

#[test]
fn rule_listing_filters_and_orders() {
    for (name, stores, _guard) in backends() {
        for key in [
            RuleKey::new(5, 2, 1),
            RuleKey::new(5, 1, 1),
            RuleKey::new(5, 1, 3),
            RuleKey::new(4, 9, 9),
        ] {
            stores
                .rules
                .insert_if_absent(&Rule::new(key, "alert", "m"))
                .unwrap();
        }
        let filter = RuleFilter {
            sid: Some(5),
            ..Default::default()
        };
        let keys: Vec<RuleKey> = stores
            .rules
            .list_rules(&filter, 0, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                RuleKey::new(5, 1, 1),
                RuleKey::new(5, 2, 1),
                RuleKey::new(5, 1, 3)
            ],
            "{name}"
        );
        assert_eq!(stores.rules.count_rules(&filter).unwrap(), 3, "{name}");
    }
}

#[test]
fn sqlite_file_reader_sees_committed_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    let store = Arc::new(SqliteStore::open(&path, Duration::from_secs(1)).unwrap());
    let stores = Stores::from_backend(store.clone());
    stores.rules.insert_if_absent(&rule(1)).unwrap();

    let writer = {
        let stores = stores.clone();
        std::thread::spawn(move || {
            for i in 0..50 {
                stores
                    .events
                    .append(alert(1, "a", "b", Some(80), i))
                    .unwrap();
            }
        })
    };
    // 쓰기와 동시에 읽기가 실패하지 않아야 함
    for _ in 0..20 {
        stores.events.count(&EventFilter::all()).unwrap();
    }
    writer.join().unwrap();
    assert_eq!(stores.events.count(&EventFilter::all()).unwrap(), 50);

    // 재시작 후에도 데이터 유지
    drop(stores);
    drop(store);
    let reopened = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
    let stores = Stores::from_backend(Arc::new(reopened));
    assert_eq!(stores.events.count(&EventFilter::all()).unwrap(), 50);
}
