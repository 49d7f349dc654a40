//! API 에러 응답
//!
//! 모든 에러는 `{"error": "<message>"}` 본문을 가집니다.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::QueryError;

/// 알 수 없는 경로에 대한 메시지
pub const MALFORMED_REQUEST: &str = "The request is malformed or invalid.";

#[derive(Serialize)]
pub(crate) struct ErrorBody {
    error: String,
}

/// API 에러
#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),
    /// 404
    NotFound(String),
    /// 409
    Conflict(String),
    /// 500
    Internal(String),
    /// 503
    Unavailable(String),
}

impl ApiError {
    /// 응답 상태 코드
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// 메트릭 라벨용 결과 분류
    pub fn result_label(&self) -> &'static str {
        if self.status().is_client_error() {
            "client_error"
        } else {
            "server_error"
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m)
            | Self::Unavailable(m) => m,
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::PageNotFound => {
                debug!(error = %err, "page out of range");
                Self::NotFound(err.to_string())
            }
            QueryError::Storage(ref source) => {
                error!(error = %source, "query failed on storage");
                Self::Internal(err.to_string())
            }
            _ => {
                debug!(error = %err, "query rejected");
                Self::BadRequest(err.to_string())
            }
        }
    }
}
