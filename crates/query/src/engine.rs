//! 조회 엔진
//!
//! 파라미터 검증 → 필터 생성 → 저장소 호출 → 페이지 구성을 한 곳에서 수행합니다.
//! 모든 메서드는 동기(blocking)이며 HTTP 계층은 `spawn_blocking` 안에서 호출합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use snortmon_core::metrics as m;
use snortmon_core::query::CountRow;
use snortmon_core::store::{EventStore, RuleCatalog};
use snortmon_core::types::{AlertRecord, Rule};
use tracing::info;

use crate::error::QueryError;
use crate::page::{Page, PageRequest};
use crate::params::{self, CountRequest, Params};

/// 기본 페이지 크기
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// 이벤트/규칙 조회 엔진
#[derive(Clone)]
pub struct QueryEngine {
    events: Arc<dyn EventStore>,
    rules: Arc<dyn RuleCatalog>,
    page_size: u64,
}

impl QueryEngine {
    /// 새 엔진을 생성합니다.
    pub fn new(events: Arc<dyn EventStore>, rules: Arc<dyn RuleCatalog>) -> Self {
        Self {
            events,
            rules,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// 페이지 크기를 설정합니다.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 페이지 크기
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    fn page_request(&self, params: &Params) -> Result<PageRequest, QueryError> {
        Ok(PageRequest::new(params::page_number(params)?, self.page_size))
    }

    /// 삭제되지 않은 이벤트를 필터링해 id 오름차순으로 반환합니다.
    pub fn list_events(&self, params: &Params) -> Result<Page<AlertRecord>, QueryError> {
        let filter = params::event_filter(params)?;
        let request = self.page_request(params)?;
        let count = self.events.count(&filter)?;
        request.check(count)?;
        let results = self.events.list(&filter, request.offset(), request.size)?;
        Ok(Page::new(request, count, results))
    }

    /// 필터에 맞는 이벤트를 모두 소프트 삭제하고 변경된 수를 반환합니다.
    ///
    /// 필터가 없으면 보이는 이벤트 전부가 대상입니다. 반복 호출해도 결과는 같습니다.
    pub fn mark_deleted(&self, params: &Params) -> Result<u64, QueryError> {
        let filter = params::event_filter(params)?;
        let changed = self.events.mark_deleted(&filter)?;
        metrics::counter!(m::QUERY_EVENTS_MARKED_DELETED_TOTAL).increment(changed);
        info!(changed, filtered = !filter.is_empty(), "events marked as deleted");
        Ok(changed)
    }

    /// 이벤트를 그룹별로 세어 개수 오름차순으로 반환합니다.
    pub fn count_events(
        &self,
        params: &Params,
        now: DateTime<Utc>,
    ) -> Result<Page<CountRow>, QueryError> {
        let CountRequest { group, window } = params::count_request(params)?;
        let request = self.page_request(params)?;
        let filter = snortmon_core::query::EventFilter {
            since: window.since(now),
            ..Default::default()
        };
        let rows = self.events.aggregate(&filter, group)?;
        Page::slice(request, rows)
    }

    /// 규칙을 (sid, gid, rev) 순서로 반환합니다.
    pub fn list_rules(&self, params: &Params) -> Result<Page<Rule>, QueryError> {
        let filter = params::rule_filter(params)?;
        let request = self.page_request(params)?;
        let count = self.rules.count_rules(&filter)?;
        request.check(count)?;
        let results = self
            .rules
            .list_rules(&filter, request.offset(), request.size)?;
        Ok(Page::new(request, count, results))
    }
}
