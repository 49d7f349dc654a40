use std::sync::Arc;

use snortmon_core::pipeline::HealthStatus;
use snortmon_ingest::RuleUpdater;
use tokio::sync::watch;

use crate::engine::QueryEngine;

/// 핸들러 공유 상태
///
/// `State(Arc<AppState>)`로 전달됩니다.
pub struct AppState {
    /// 조회 엔진
    pub engine: QueryEngine,
    /// 규칙 갱신기. 없으면 갱신 엔드포인트는 503을 반환합니다.
    pub updater: Option<Arc<RuleUpdater>>,
    /// 데몬이 주기적으로 갱신하는 전체 건강 상태
    pub health: watch::Receiver<HealthStatus>,
}

impl AppState {
    /// 새 상태를 생성합니다.
    pub fn new(engine: QueryEngine, health: watch::Receiver<HealthStatus>) -> Self {
        Self {
            engine,
            updater: None,
            health,
        }
    }

    /// 규칙 갱신기를 연결합니다.
    pub fn with_updater(mut self, updater: Arc<RuleUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }
}
