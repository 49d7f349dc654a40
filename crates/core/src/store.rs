//! 저장소 trait -- 이벤트 저장소와 규칙 카탈로그
//!
//! 두 trait 모두 동기 API입니다. 비동기 컨텍스트에서는
//! `tokio::task::spawn_blocking` 안에서 호출합니다.
//! 구현체는 `snortmon-storage` 크레이트에 있습니다.

use crate::error::StorageError;
use crate::query::{CountRow, EventFilter, GroupBy, RuleFilter};
use crate::types::{AlertRecord, NewAlert, Rule, RuleKey};

/// 알림 레코드 저장소
///
/// append 전용이며, 생성 이후에는 소프트 삭제 플래그만 변경됩니다.
/// 모든 조회는 삭제되지 않은 레코드만 대상으로 합니다.
pub trait EventStore: Send + Sync {
    /// 레코드를 추가하고 식별자가 부여된 레코드를 반환합니다.
    ///
    /// 참조 규칙이 카탈로그에 없으면 `StorageError::Integrity`를 반환합니다.
    fn append(&self, alert: NewAlert) -> Result<AlertRecord, StorageError>;

    /// 필터를 만족하는 레코드 수
    fn count(&self, filter: &EventFilter) -> Result<u64, StorageError>;

    /// 필터를 만족하는 레코드를 id 오름차순으로 `offset`부터 최대 `limit`개 반환합니다.
    fn list(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AlertRecord>, StorageError>;

    /// 필터를 만족하는 레코드를 모두 삭제 표시하고 변경된 수를 반환합니다.
    ///
    /// 이미 삭제된 레코드는 대상이 아니므로 반복 호출은 0을 반환합니다.
    fn mark_deleted(&self, filter: &EventFilter) -> Result<u64, StorageError>;

    /// 필터를 만족하는 레코드를 그룹별로 셉니다.
    ///
    /// 결과는 개수 오름차순, 같은 개수는 그룹 값 오름차순입니다.
    fn aggregate(&self, filter: &EventFilter, group: GroupBy)
    -> Result<Vec<CountRow>, StorageError>;

    /// 모든 레코드를 물리적으로 삭제하고 삭제된 수를 반환합니다.
    fn purge(&self) -> Result<u64, StorageError>;
}

/// 탐지 규칙 카탈로그
pub trait RuleCatalog: Send + Sync {
    /// 자연 키로 규칙을 찾습니다 (정확히 일치).
    ///
    /// 없으면 `Ok(None)`, 백엔드 장애는 `Err`입니다.
    fn resolve(&self, key: RuleKey) -> Result<Option<Rule>, StorageError>;

    /// 처음 보는 키면 규칙을 추가하고 `true`, 이미 있으면 `false`를 반환합니다.
    fn insert_if_absent(&self, rule: &Rule) -> Result<bool, StorageError>;

    /// 필터를 만족하는 규칙 수
    fn count_rules(&self, filter: &RuleFilter) -> Result<u64, StorageError>;

    /// 필터를 만족하는 규칙을 (sid, gid, rev) 순으로 반환합니다.
    fn list_rules(
        &self,
        filter: &RuleFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Rule>, StorageError>;
}
