//! # snortmon-query
//!
//! 저장된 알림 이벤트와 규칙을 조회/집계하는 엔진과 HTTP API입니다.
//!
//! # 요청 처리 순서
//!
//! 1. 파라미터 이름 허용 목록 검증 ([`params::validate_params`])
//! 2. 값 해석 및 필터 생성 ([`params::event_filter`], [`params::count_request`])
//! 3. 저장소 호출 ([`QueryEngine`])
//! 4. 페이지 구성 ([`Page`])
//!
//! 검증 실패는 저장소에 닿기 전에 요청 전체를 거부합니다.

pub mod engine;
pub mod error;
pub mod http;
pub mod page;
pub mod params;

pub use engine::{DEFAULT_PAGE_SIZE, QueryEngine};
pub use error::QueryError;
pub use http::{ApiError, AppState, build_router, run_http_server, serve};
pub use page::{Page, PageRequest};
pub use params::{CountRequest, validate_params};
