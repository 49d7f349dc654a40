//! axum 기반 조회 API
//!
//! - [`router::build_router`]: 라우트 구성
//! - [`server::run_http_server`]: 리스너 바인드 + graceful shutdown
//! - [`error::ApiError`]: `{"error": message}` 응답 변환

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod views;

pub use error::ApiError;
pub use router::build_router;
pub use server::{run_http_server, serve};
pub use state::AppState;
