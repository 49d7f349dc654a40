//! rusqlite 에러를 코어 [`StorageError`]로 변환합니다.

use rusqlite::ErrorCode;
use snortmon_core::error::StorageError;

/// rusqlite 에러를 분류합니다.
///
/// 손상된 데이터베이스는 `Corrupt`로 올려 상위에서 복구 없이 전파되게 합니다.
pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(ffi, _) => match ffi.code {
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                StorageError::Corrupt(err.to_string())
            }
            ErrorCode::ConstraintViolation => StorageError::Integrity(err.to_string()),
            ErrorCode::CannotOpen | ErrorCode::PermissionDenied => {
                StorageError::Connection(err.to_string())
            }
            _ => StorageError::Query(err.to_string()),
        },
        _ => StorageError::Query(err.to_string()),
    }
}
