//! 응답 DTO

use chrono::{DateTime, Utc};
use serde::Serialize;
use snortmon_core::types::{AlertRecord, Rule};

/// 이벤트 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    /// 이벤트 ID
    pub id: i64,
    /// RFC 3339 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 규칙 signature id
    pub sid: u32,
    /// 규칙 동작 (alert, drop 등)
    pub action: String,
    /// 출발지 주소
    pub src_addr: String,
    /// 출발지 포트 (ICMP 등은 없음)
    pub src_port: Option<u16>,
    /// 목적지 주소
    pub dst_addr: String,
    /// 목적지 포트
    pub dst_port: Option<u16>,
    /// 프로토콜
    pub proto: String,
    /// 규칙 메시지
    pub message: String,
}

impl From<AlertRecord> for EventView {
    fn from(record: AlertRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.timestamp,
            sid: record.rule.key.sid,
            action: record.rule.action,
            src_addr: record.src_addr,
            src_port: record.src_port,
            dst_addr: record.dst_addr,
            dst_port: record.dst_port,
            proto: record.proto,
            message: record.rule.message,
        }
    }
}

/// 규칙 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleView {
    /// signature id
    pub sid: u32,
    /// revision
    pub rev: u32,
    /// generator id
    pub gid: u32,
    /// 규칙 동작
    pub action: String,
    /// 규칙 메시지
    pub message: String,
}

impl From<Rule> for RuleView {
    fn from(rule: Rule) -> Self {
        Self {
            sid: rule.key.sid,
            rev: rule.key.rev,
            gid: rule.key.gid,
            action: rule.action,
            message: rule.message,
        }
    }
}

/// 메시지 응답
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    /// 사람이 읽을 결과 메시지
    pub message: String,
    /// 변경된 행 수. 없으면 JSON에서 생략됩니다.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
}

impl MessageView {
    /// 행 수 없이 메시지만 담습니다.
    ///
    /// ```
    /// use snortmon_query::http::views::MessageView;
    ///
    /// let view = MessageView::new("rule refresh started");
    /// assert_eq!(view.message, "rule refresh started");
    /// assert_eq!(view.updated, None);
    /// ```
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            updated: None,
        }
    }
}
