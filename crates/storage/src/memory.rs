//! 메모리 저장소
//!
//! 테스트와 일회성 배포용입니다. 프로세스가 종료되면 내용이 사라집니다.

use std::collections::HashMap;

use parking_lot::RwLock;

use snortmon_core::error::StorageError;
use snortmon_core::query::{self, CountRow, EventFilter, GroupBy, RuleFilter};
use snortmon_core::store::{EventStore, RuleCatalog};
use snortmon_core::types::{AlertRecord, NewAlert, Rule, RuleKey};

#[derive(Default)]
struct Inner {
    events: Vec<AlertRecord>,
    rules: HashMap<RuleKey, Rule>,
    next_id: i64,
}

/// `RwLock` 기반 이벤트 저장소 + 규칙 카탈로그
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }
}

fn clamp(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

impl EventStore for MemoryStore {
    fn append(&self, alert: NewAlert) -> Result<AlertRecord, StorageError> {
        let mut inner = self.inner.write();
        if !inner.rules.contains_key(&alert.rule.key) {
            return Err(StorageError::Integrity(format!(
                "rule {} does not exist",
                alert.rule.key
            )));
        }
        inner.next_id += 1;
        let record = alert.into_record(inner.next_id);
        inner.events.push(record.clone());
        Ok(record)
    }

    fn count(&self, filter: &EventFilter) -> Result<u64, StorageError> {
        let inner = self.inner.read();
        Ok(inner.events.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    fn list(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AlertRecord>, StorageError> {
        // events는 id 오름차순으로 쌓임
        let inner = self.inner.read();
        Ok(inner
            .events
            .iter()
            .filter(|r| filter.matches(r))
            .skip(clamp(offset))
            .take(clamp(limit))
            .cloned()
            .collect())
    }

    fn mark_deleted(&self, filter: &EventFilter) -> Result<u64, StorageError> {
        let mut inner = self.inner.write();
        let mut changed = 0u64;
        for record in inner.events.iter_mut().filter(|r| filter.matches(r)) {
            record.deleted = true;
            changed += 1;
        }
        Ok(changed)
    }

    fn aggregate(
        &self,
        filter: &EventFilter,
        group: GroupBy,
    ) -> Result<Vec<CountRow>, StorageError> {
        let inner = self.inner.read();
        Ok(query::aggregate(&inner.events, filter, group))
    }

    fn purge(&self) -> Result<u64, StorageError> {
        let mut inner = self.inner.write();
        let removed = inner.events.len() as u64;
        inner.events.clear();
        Ok(removed)
    }
}

impl RuleCatalog for MemoryStore {
    fn resolve(&self, key: RuleKey) -> Result<Option<Rule>, StorageError> {
        Ok(self.inner.read().rules.get(&key).cloned())
    }

    fn insert_if_absent(&self, rule: &Rule) -> Result<bool, StorageError> {
        let mut inner = self.inner.write();
        if inner.rules.contains_key(&rule.key) {
            return Ok(false);
        }
        inner.rules.insert(rule.key, rule.clone());
        Ok(true)
    }

    fn count_rules(&self, filter: &RuleFilter) -> Result<u64, StorageError> {
        let inner = self.inner.read();
        Ok(inner.rules.values().filter(|r| filter.matches(r)).count() as u64)
    }

    fn list_rules(
        &self,
        filter: &RuleFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Rule>, StorageError> {
        let inner = self.inner.read();
        let mut rules: Vec<&Rule> = inner.rules.values().filter(|r| filter.matches(r)).collect();
        rules.sort_by_key(|r| (r.key.sid, r.key.gid, r.key.rev));
        Ok(rules
            .into_iter()
            .skip(clamp(offset))
            .take(clamp(limit))
            .cloned()
            .collect())
    }
}
