//! 쿼리 파라미터 검증과 필터 변환
//!
//! 파라미터는 `(이름, 값)` 쌍의 목록으로 받습니다. 같은 이름이 여러 번 나오면 마지막 값이 쓰입니다.
//! 값이 빈 문자열인 필터는 지정되지 않은 것으로 봅니다.

use std::str::FromStr;

use snortmon_core::query::{EventFilter, GroupBy, RuleFilter, TimeWindow};

use crate::error::QueryError;

/// 페이지 번호 파라미터. 모든 엔드포인트에서 허용됩니다.
pub const PAGE_PARAM: &str = "page";

/// 이벤트 목록/일괄 삭제 필터
pub const EVENT_LIST_PARAMS: &[&str] = &["src_addr", "src_port", "dst_addr", "dst_port", "sid", "proto"];

/// 이벤트 집계 파라미터
pub const EVENT_COUNT_PARAMS: &[&str] = &["type", "period"];

/// 규칙 목록 필터
pub const RULE_LIST_PARAMS: &[&str] = &["sid", "rev", "gid"];

/// 원시 쿼리 파라미터
pub type Params = [(String, String)];

/// 요청 파라미터 이름이 모두 `allowed` 또는 `page`인지 확인합니다.
///
/// 하나라도 벗어나면 요청 전체가 거부되며, 에러 메시지는 `page`를 포함한 전체 허용 목록을 담습니다.
pub fn validate_params<'a, I>(requested: I, allowed: &[&str]) -> Result<(), QueryError>
where
    I: IntoIterator<Item = &'a str>,
{
    let ok = requested
        .into_iter()
        .all(|name| name == PAGE_PARAM || allowed.contains(&name));
    if ok {
        return Ok(());
    }
    let mut allowed: Vec<String> = allowed.iter().map(|s| (*s).to_owned()).collect();
    allowed.push(PAGE_PARAM.to_owned());
    Err(QueryError::DisallowedParams { allowed })
}

/// 파라미터 이름 목록을 검증합니다.
pub fn validate(params: &Params, allowed: &[&str]) -> Result<(), QueryError> {
    validate_params(params.iter().map(|(name, _)| name.as_str()), allowed)
}

/// 마지막으로 지정된 비어 있지 않은 값
fn lookup<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: FromStr>(params: &Params, name: &str) -> Result<Option<T>, QueryError> {
    lookup(params, name)
        .map(|value| {
            value.parse::<T>().map_err(|_| QueryError::InvalidValue {
                param: name.to_owned(),
                value: value.to_owned(),
            })
        })
        .transpose()
}

/// 이벤트 필터를 만듭니다. 이름 검증을 먼저 수행합니다.
pub fn event_filter(params: &Params) -> Result<EventFilter, QueryError> {
    validate(params, EVENT_LIST_PARAMS)?;
    Ok(EventFilter {
        src_addr: lookup(params, "src_addr").map(str::to_owned),
        src_port: parse_number(params, "src_port")?,
        dst_addr: lookup(params, "dst_addr").map(str::to_owned),
        dst_port: parse_number(params, "dst_port")?,
        sid: parse_number(params, "sid")?,
        proto: lookup(params, "proto").map(str::to_owned),
        since: None,
    })
}

/// 규칙 필터를 만듭니다.
pub fn rule_filter(params: &Params) -> Result<RuleFilter, QueryError> {
    validate(params, RULE_LIST_PARAMS)?;
    Ok(RuleFilter {
        sid: parse_number(params, "sid")?,
        rev: parse_number(params, "rev")?,
        gid: parse_number(params, "gid")?,
    })
}

/// 집계 요청
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRequest {
    /// 집계 기준
    pub group: GroupBy,
    /// 기간
    pub window: TimeWindow,
}

/// 집계 요청을 해석합니다.
///
/// 이름 검증 → `type` 필수/값 검증 → `period` 값 검증 순서입니다.
pub fn count_request(params: &Params) -> Result<CountRequest, QueryError> {
    validate(params, EVENT_COUNT_PARAMS)?;
    let group = lookup(params, "type").ok_or(QueryError::MissingGroup)?;
    let group = GroupBy::parse(group).ok_or(QueryError::UnknownGroup)?;
    let window = match lookup(params, "period") {
        Some(period) => TimeWindow::parse(period).ok_or(QueryError::UnknownWindow)?,
        None => TimeWindow::All,
    };
    Ok(CountRequest { group, window })
}

/// 1부터 시작하는 페이지 번호. 없으면 1입니다.
pub fn page_number(params: &Params) -> Result<u64, QueryError> {
    match lookup(params, PAGE_PARAM) {
        None => Ok(1),
        Some(value) => value
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| QueryError::InvalidPage(value.to_owned())),
    }
}
