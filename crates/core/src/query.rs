//! 조회 어휘 -- 이벤트 필터, 그룹 기준, 시간 창, 집계 결과
//!
//! [`EventFilter`]는 저장소 종류와 무관한 술어(predicate)입니다.
//! 메모리 저장소는 [`EventFilter::matches`]를 그대로 사용하고,
//! SQLite 저장소는 같은 필터를 `WHERE` 절로 옮겨 사용합니다.
//!
//! 모든 필터는 AND로 결합되며, 소프트 삭제된 레코드는 항상 제외됩니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlertRecord, Rule};

/// 이벤트 필터
///
/// `None`인 필드는 조건에 참여하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// 출발지 주소 (정확히 일치)
    pub src_addr: Option<String>,
    /// 출발지 포트
    pub src_port: Option<u16>,
    /// 목적지 주소 (정확히 일치)
    pub dst_addr: Option<String>,
    /// 목적지 포트
    pub dst_port: Option<u16>,
    /// 참조 규칙의 signature id
    pub sid: Option<u32>,
    /// 프로토콜 (정확히 일치)
    pub proto: Option<String>,
    /// 이 시각 이후(포함)의 레코드만
    pub since: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// 조건이 없는 필터 (보이는 레코드 전체)
    pub fn all() -> Self {
        Self::default()
    }

    /// 레코드가 필터를 만족하는지 확인합니다.
    pub fn matches(&self, record: &AlertRecord) -> bool {
        !record.deleted
            && self
                .src_addr
                .as_deref()
                .is_none_or(|v| v == record.src_addr)
            && self.src_port.is_none_or(|v| record.src_port == Some(v))
            && self
                .dst_addr
                .as_deref()
                .is_none_or(|v| v == record.dst_addr)
            && self.dst_port.is_none_or(|v| record.dst_port == Some(v))
            && self.sid.is_none_or(|v| v == record.rule.key.sid)
            && self.proto.as_deref().is_none_or(|v| v == record.proto)
            && self.since.is_none_or(|v| record.timestamp >= v)
    }

    /// 아무 조건도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// 규칙 목록 필터 (정확히 일치)
///
/// `None`인 필드는 조건에서 빠집니다.
///
/// ```
/// use snortmon_core::query::RuleFilter;
/// use snortmon_core::types::{Rule, RuleKey};
///
/// let rule = Rule::new(RuleKey::new(2001, 3, 1), "alert", "DNS query");
/// let filter = RuleFilter { sid: Some(2001), ..Default::default() };
/// assert!(filter.matches(&rule));
/// assert!(!RuleFilter { rev: Some(4), ..filter }.matches(&rule));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFilter {
    /// 이 signature id만
    pub sid: Option<u32>,
    /// 이 revision만
    pub rev: Option<u32>,
    /// 이 generator id만
    pub gid: Option<u32>,
}

impl RuleFilter {
    /// 규칙이 필터를 만족하는지 확인합니다.
    pub fn matches(&self, rule: &Rule) -> bool {
        self.sid.is_none_or(|v| v == rule.key.sid)
            && self.rev.is_none_or(|v| v == rule.key.rev)
            && self.gid.is_none_or(|v| v == rule.key.gid)
    }
}

/// 집계 그룹 기준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// 참조 규칙의 signature id
    Sid,
    /// (출발지 주소, 목적지 주소) 쌍
    Addr,
}

impl GroupBy {
    /// 쿼리 값(`sid`, `addr`)에서 변환합니다.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sid" => Some(Self::Sid),
            "addr" => Some(Self::Addr),
            _ => None,
        }
    }

    /// 쿼리 값 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sid => "sid",
            Self::Addr => "addr",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 집계 시간 창
///
/// "현재 시각 - 기간"으로 계산하며 달력 단위로 정렬하지 않습니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// 시간 제한 없음
    #[default]
    All,
    /// 최근 1일
    Day,
    /// 최근 7일
    Week,
    /// 최근 30일
    Month,
}

impl TimeWindow {
    /// 쿼리 값(`all`, `day`, `week`, `month`)에서 변환합니다.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }

    /// 쿼리 값 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// 창의 길이 (`All`은 `None`)
    pub fn duration(&self) -> Option<TimeDelta> {
        match self {
            Self::All => None,
            Self::Day => Some(TimeDelta::days(1)),
            Self::Week => Some(TimeDelta::days(7)),
            Self::Month => Some(TimeDelta::days(30)),
        }
    }

    /// `now` 기준 창의 시작 시각 (`All`은 `None`)
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now - d)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 집계 결과 한 행
///
/// JSON으로는 `{sid, count}` 또는 `{src_addr, dst_addr, count}`로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountRow {
    /// signature id 기준
    Sid { sid: u32, count: u64 },
    /// 주소 쌍 기준
    Addr {
        src_addr: String,
        dst_addr: String,
        count: u64,
    },
}

impl CountRow {
    /// 그룹에 속한 레코드 수
    pub fn count(&self) -> u64 {
        match self {
            Self::Sid { count, .. } | Self::Addr { count, .. } => *count,
        }
    }
}

/// 집계 결과를 개수 오름차순으로, 같은 개수는 그룹 값 오름차순으로 정렬합니다.
pub fn sort_count_rows(rows: &mut [CountRow]) {
    rows.sort_by(|a, b| {
        a.count().cmp(&b.count()).then_with(|| match (a, b) {
            (CountRow::Sid { sid: x, .. }, CountRow::Sid { sid: y, .. }) => x.cmp(y),
            (
                CountRow::Addr {
                    src_addr: sa,
                    dst_addr: da,
                    ..
                },
                CountRow::Addr {
                    src_addr: sb,
                    dst_addr: db,
                    ..
                },
            ) => (sa, da).cmp(&(sb, db)),
            _ => std::cmp::Ordering::Equal,
        })
    });
}

/// 필터를 만족하는 레코드들을 그룹별로 셉니다.
///
/// 결과는 [`sort_count_rows`] 순서로 정렬됩니다.
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a AlertRecord>,
    filter: &EventFilter,
    group: GroupBy,
) -> Vec<CountRow> {
    let matching = records.into_iter().filter(|r| filter.matches(r));
    let mut rows: Vec<CountRow> = match group {
        GroupBy::Sid => {
            let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
            for record in matching {
                *counts.entry(record.rule.key.sid).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(sid, count)| CountRow::Sid { sid, count })
                .collect()
        }
        GroupBy::Addr => {
            let mut counts: BTreeMap<(&str, &str), u64> = BTreeMap::new();
            for record in matching {
                *counts
                    .entry((record.src_addr.as_str(), record.dst_addr.as_str()))
                    .or_default() += 1;
            }
            counts
                .into_iter()
                .map(|((src, dst), count)| CountRow::Addr {
                    src_addr: src.to_owned(),
                    dst_addr: dst.to_owned(),
                    count,
                })
                .collect()
        }
    };
    sort_count_rows(&mut rows);
    rows
}
