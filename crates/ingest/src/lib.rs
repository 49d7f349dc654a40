//! # snortmon-ingest
//!
//! Snort 3 `alert_json` 로그를 tail하여 이벤트 저장소에 적재하는 파이프라인입니다.
//!
//! # 아키텍처
//! ```text
//! alert_json.txt ──> TailReader ──> RecordParser ──> RuleCatalog::resolve ──> EventStore::append
//!       (cursor + flock)                 │
//!                                        └── RejectedLine ──mpsc──> rejection logger
//! ```
//!
//! # 주요 구성 요소
//! - [`TailReader`]: 커서 기반으로 완전한 라인만 읽고, 처리가 끝난 위치까지만 오프셋을 영속화
//! - [`RecordParser`]: 허용 필드 투영과 규칙 해석
//! - [`IngestionWorker`]: 한 사이클 실행 (CLI 일회성 수집에서도 사용)
//! - [`IngestionLoop`]: 주기 실행, [`Pipeline`](snortmon_core::pipeline::Pipeline) 구현
//! - [`RuleUpdater`]: 외부 명령으로 규칙 세트를 갱신하고 덤프를 카탈로그에 반영
//!
//! # 사용 예시
//! ```ignore
//! use snortmon_ingest::{IngestSettings, IngestionLoopBuilder, spawn_rejection_logger};
//!
//! let (mut ingest, rejected_rx) = IngestionLoopBuilder::new()
//!     .settings(IngestSettings::from_core(&config.ingest))
//!     .catalog(stores.rules.clone())
//!     .store(stores.events.clone())
//!     .build()?;
//! if let Some(rx) = rejected_rx {
//!     spawn_rejection_logger(rx);
//! }
//! ingest.start().await?;
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod refresh;
pub mod rejection;
pub mod tail;
pub mod worker;

pub use config::{IngestSettings, IngestSettingsBuilder, RefreshSettings};
pub use cursor::{CursorLock, CursorPosition, CursorStore};
pub use error::IngestError;
pub use parser::{LineError, ParseFailure, ParseFailureKind, RecordParser};
pub use pipeline::{IngestionLoop, IngestionLoopBuilder, build_worker};
pub use refresh::{RefreshReport, RuleUpdater};
pub use rejection::{RejectedLine, spawn_rejection_logger};
pub use tail::{TailBatch, TailLine, TailReader};
pub use worker::{CycleReport, IngestState, IngestionWorker};
