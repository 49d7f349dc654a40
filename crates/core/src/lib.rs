//! # snortmon-core
//!
//! snortmon 워크스페이스의 공통 기반 크레이트입니다.
//!
//! - [`types`]: 알림 레코드와 탐지 규칙 도메인 타입
//! - [`query`]: 이벤트 필터, 집계 그룹/시간 창 어휘
//! - [`store`]: `EventStore` / `RuleCatalog` 저장소 trait
//! - [`pipeline`]: 장기 실행 모듈 생명주기 trait
//! - [`config`]: `snortmon.toml` 설정
//! - [`error`]: 최상위 에러 타입
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, PipelineError, SnortmonError, StorageError};

// 설정
pub use config::SnortmonConfig;

// 파이프라인 trait
pub use pipeline::{DynPipeline, HealthStatus, Pipeline};

// 조회 어휘
pub use query::{CountRow, EventFilter, GroupBy, RuleFilter, TimeWindow};

// 저장소 trait
pub use store::{EventStore, RuleCatalog};

// 도메인 타입
pub use types::{AlertRecord, NewAlert, Rule, RuleKey};
