//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 탐지 규칙([`Rule`])과 센서 알림 레코드([`AlertRecord`])를 정의합니다.
//! 수집 파이프라인과 조회 엔진은 이 타입들로 데이터를 교환합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 탐지 규칙의 자연 키 (signature-id, revision, generator-id)
///
/// 세 값 모두 양의 정수이며, 조합이 유일합니다. 한 번 생성된 키는 변경되지 않으며
/// 조회는 항상 정확히 일치(exact match)하는 경우만 허용합니다.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RuleKey {
    /// signature id
    pub sid: u32,
    /// revision
    pub rev: u32,
    /// generator id
    pub gid: u32,
}

impl RuleKey {
    /// 새 규칙 키를 생성합니다.
    pub fn new(sid: u32, rev: u32, gid: u32) -> Self {
        Self { sid, rev, gid }
    }

    /// 세 구성요소가 모두 양수인지 확인합니다.
    pub fn is_valid(&self) -> bool {
        self.sid > 0 && self.rev > 0 && self.gid > 0
    }
}

impl fmt::Display for RuleKey {
    // Snort 표기법 gid:sid:rev
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.gid, self.sid, self.rev)
    }
}

/// 탐지 규칙 메타데이터
///
/// 외부 규칙 갱신 작업이 규칙 컴파일러의 덤프에서 처음 보는 키를 발견했을 때 생성됩니다.
/// 수집 경로에서는 읽기 전용입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 자연 키
    pub key: RuleKey,
    /// 규칙 액션 (alert, block, drop 등)
    pub action: String,
    /// 사람이 읽을 수 있는 규칙 메시지
    pub message: String,
    /// 규칙 덤프 원본 (임의 구조)
    pub metadata: serde_json::Value,
}

impl Rule {
    /// 메타데이터 없이 규칙을 생성합니다.
    pub fn new(key: RuleKey, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key,
            action: action.into(),
            message: message.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// 메타데이터를 설정합니다.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} \"{}\"", self.key, self.action, self.message)
    }
}

/// 아직 저장되지 않은 알림 레코드
///
/// 레코드 파서가 생성하며, 이벤트 저장소에 append되면서 식별자를 부여받습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    /// 센서 이벤트 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 출발지 주소
    pub src_addr: String,
    /// 출발지 포트
    pub src_port: Option<u16>,
    /// 목적지 주소
    pub dst_addr: String,
    /// 목적지 포트
    pub dst_port: Option<u16>,
    /// 프로토콜 (TCP, UDP, ICMP 등)
    pub proto: String,
    /// 해석된 탐지 규칙
    pub rule: Rule,
}

impl NewAlert {
    /// 저장소가 부여한 식별자로 영속 레코드를 만듭니다.
    pub fn into_record(self, id: i64) -> AlertRecord {
        AlertRecord {
            id,
            timestamp: self.timestamp,
            src_addr: self.src_addr,
            src_port: self.src_port,
            dst_addr: self.dst_addr,
            dst_port: self.dst_port,
            proto: self.proto,
            rule: self.rule,
            deleted: false,
        }
    }
}

/// 영속화된 알림 레코드
///
/// 생성 이후에는 `deleted` 플래그만 (일괄로) 변경됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 자동 증가 식별자
    pub id: i64,
    /// 센서 이벤트 시각 (UTC)
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
    /// 참조 규칙 (항상 존재)
    pub rule: Rule,
    /// 소프트 삭제 여부
    pub deleted: bool,
}

impl fmt::Display for AlertRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}:{} -> {}:{} proto={} rule={}",
            self.id,
            self.timestamp.to_rfc3339(),
            self.src_addr,
            port_str(self.src_port),
            self.dst_addr,
            port_str(self.dst_port),
            self.proto,
            self.rule.key,
        )
    }
}

fn port_str(port: Option<u16>) -> String {
    port.map_or_else(|| "-".to_owned(), |p| p.to_string())
}
