//! # snortmon-storage
//!
//! [`EventStore`]와 [`RuleCatalog`] 구현체를 제공합니다.
//!
//! - [`SqliteStore`]: WAL 모드 SQLite. 쓰기는 단일 연결, 읽기는 호출별 읽기 전용 연결
//! - [`MemoryStore`]: `parking_lot::RwLock` 기반 메모리 저장소
//!
//! [`open_stores`]는 `[storage]` 설정에 따라 백엔드를 골라 두 trait 객체를 함께 반환합니다.

mod error;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use snortmon_core::config::StorageConfig;
use snortmon_core::error::StorageError;
use snortmon_core::store::{EventStore, RuleCatalog};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 같은 백엔드를 가리키는 저장소 핸들 묶음
#[derive(Clone)]
pub struct Stores {
    /// 이벤트 저장소
    pub events: Arc<dyn EventStore>,
    /// 규칙 카탈로그
    pub rules: Arc<dyn RuleCatalog>,
}

impl Stores {
    /// 두 trait을 모두 구현한 백엔드 하나로 핸들을 만듭니다.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: EventStore + RuleCatalog + 'static,
    {
        Self {
            events: backend.clone(),
            rules: backend,
        }
    }

    /// 메모리 백엔드 핸들
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}

/// 설정된 백엔드를 엽니다.
pub fn open_stores(config: &StorageConfig) -> Result<Stores, StorageError> {
    match config.backend.as_str() {
        "memory" => {
            tracing::warn!("using in-memory storage; events are lost on exit");
            Ok(Stores::in_memory())
        }
        "sqlite" => {
            let store = SqliteStore::open(
                &config.database_path,
                Duration::from_millis(config.busy_timeout_ms),
            )?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
        other => Err(StorageError::Connection(format!(
            "unsupported storage backend: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_stores_rejects_unknown_backend() {
        let config = StorageConfig {
            backend: "postgres".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            open_stores(&config),
            Err(StorageError::Connection(_))
        ));
    }

    #[test]
    fn open_stores_creates_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snortmon.db");
        let config = StorageConfig {
            backend: "sqlite".to_owned(),
            database_path: path.display().to_string(),
            busy_timeout_ms: 100,
        };
        open_stores(&config).unwrap();
        assert!(path.exists());
    }
}
