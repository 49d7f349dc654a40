//! 수집 파이프라인 에러 타입
//!
//! [`IngestError`]는 사이클 단위로 복구 가능한 에러(파일 I/O, 저장소 장애)와
//! 규칙 갱신 서브프로세스 에러를 표현합니다.
//! 레코드 한 줄의 파싱 실패는 에러가 아니라 [`ParseFailure`](crate::parser::ParseFailure) 값으로 다룹니다.

use snortmon_core::error::{ConfigError, PipelineError, SnortmonError, StorageError};

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 커서 파일을 읽거나 쓸 수 없음
    #[error("cursor error: {path}: {reason}")]
    Cursor {
        /// 커서 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 커서 잠금 획득 실패
    #[error("cursor lock error: {path}: {reason}")]
    Lock {
        /// 잠금 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 알림 파일 읽기 실패 (권한 거부 등)
    #[error("tail error: {path}: {source}")]
    Tail {
        /// 알림 파일 경로
        path: String,
        /// 원인 I/O 에러
        #[source]
        source: std::io::Error,
    },

    /// 규칙 카탈로그 조회 실패
    #[error("rule catalog error: {0}")]
    Catalog(StorageError),

    /// 이벤트 저장 실패
    #[error("event store error: {0}")]
    Store(StorageError),

    /// 규칙 갱신 명령이 실패함
    #[error("rule update failed: {command}: {reason}")]
    RuleUpdate {
        /// 실행한 명령 (argv[0])
        command: String,
        /// 실패 사유
        reason: String,
    },

    /// 서브프로세스 시간 초과
    #[error("command timed out after {secs}s: {command}")]
    Timeout {
        /// 실행한 명령 (argv[0])
        command: String,
        /// 제한 시간 (초)
        secs: u64,
    },

    /// 규칙 갱신이 이미 진행 중
    #[error("rule refresh already in progress")]
    RefreshInProgress,

    /// 규칙 덤프 파일 형식 오류
    #[error("rule dump error: {path}: {reason}")]
    Dump {
        /// 덤프 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 기타 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IngestError> for SnortmonError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Catalog(e) | IngestError::Store(e) => SnortmonError::Storage(e),
            IngestError::Config { field, reason } => {
                SnortmonError::Config(ConfigError::InvalidValue { field, reason })
            }
            IngestError::Io(e) => SnortmonError::Io(e),
            other => SnortmonError::Pipeline(PipelineError::Runtime(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_error_display_includes_path() {
        let err = IngestError::Tail {
            path: "/var/log/snort/alert_json.txt".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let msg = err.to_string();
        assert!(msg.contains("alert_json.txt"));
        assert!(msg.contains("tail error"));
    }

    #[test]
    fn timeout_error_display() {
        let err = IngestError::Timeout {
            command: "pulledpork3".to_owned(),
            secs: 600,
        };
        assert_eq!(err.to_string(), "command timed out after 600s: pulledpork3");
    }

    #[test]
    fn store_error_converts_to_storage() {
        let err = IngestError::Store(StorageError::Query("locked".to_owned()));
        let converted: SnortmonError = err.into();
        assert!(matches!(converted, SnortmonError::Storage(StorageError::Query(_))));
    }

    #[test]
    fn config_error_converts_to_invalid_value() {
        let err = IngestError::Config {
            field: "poll_interval_ms".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let converted: SnortmonError = err.into();
        assert!(matches!(
            converted,
            SnortmonError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn cursor_error_converts_to_pipeline_runtime() {
        let err = IngestError::Cursor {
            path: "/tmp/cursor".to_owned(),
            reason: "not a number".to_owned(),
        };
        let converted: SnortmonError = err.into();
        match converted {
            SnortmonError::Pipeline(PipelineError::Runtime(msg)) => {
                assert!(msg.contains("not a number"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
