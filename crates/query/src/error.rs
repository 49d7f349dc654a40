//! 조회 엔진 에러 타입
//!
//! 저장소 장애를 제외한 모든 variant는 클라이언트 입력 오류이며
//! HTTP 계층에서 400/404로 변환됩니다.

use snortmon_core::error::StorageError;

/// 조회 요청 에러
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// 허용되지 않은 파라미터 이름
    #[error("You can use only {} as query filters.", .allowed.join(", "))]
    DisallowedParams {
        /// 허용 파라미터 목록 (`page` 포함)
        allowed: Vec<String>,
    },

    /// 정수여야 하는 파라미터 값이 정수가 아님
    #[error("'{param}' must be a non-negative integer, got '{value}'")]
    InvalidValue {
        /// 파라미터 이름
        param: String,
        /// 입력 값
        value: String,
    },

    /// 집계 기준(`type`) 누락
    #[error("You should define 'type' of filter (sid or addr)")]
    MissingGroup,

    /// 알 수 없는 집계 기준
    #[error("Unknown 'type', use 'sid' or 'addr'")]
    UnknownGroup,

    /// 알 수 없는 기간
    #[error("Unknown 'period', use 'all', 'day', 'week' or 'month'")]
    UnknownWindow,

    /// 페이지 번호 형식 오류
    #[error("Invalid page number: '{0}'")]
    InvalidPage(String),

    /// 범위를 벗어난 페이지
    #[error("Invalid page.")]
    PageNotFound,

    /// 저장소 장애
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueryError {
    /// 클라이언트 입력 오류인지 여부
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallowed_params_names_full_allowed_set() {
        let err = QueryError::DisallowedParams {
            allowed: vec!["src_addr".to_owned(), "sid".to_owned(), "page".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "You can use only src_addr, sid, page as query filters."
        );
    }

    #[test]
    fn count_validation_messages() {
        assert_eq!(
            QueryError::MissingGroup.to_string(),
            "You should define 'type' of filter (sid or addr)"
        );
        assert_eq!(
            QueryError::UnknownWindow.to_string(),
            "Unknown 'period', use 'all', 'day', 'week' or 'month'"
        );
    }

    #[test]
    fn storage_is_not_client_error() {
        assert!(QueryError::UnknownGroup.is_client_error());
        assert!(!QueryError::Storage(StorageError::Query("x".to_owned())).is_client_error());
    }
}
