//! 규칙 세트 갱신
//!
//! - [`updater`]: 외부 명령 실행과 단일 진행 보장
//! - [`dump`]: 규칙 메타데이터 덤프 로딩

pub mod dump;
pub mod updater;

pub use dump::{RefreshReport, load_rule_dump};
pub use updater::{RefreshGuard, RuleUpdater};
