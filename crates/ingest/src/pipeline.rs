//! 수집 루프 -- [`Pipeline`] trait 구현
//!
//! [`IngestionLoop`]은 고정 주기로 [`IngestionWorker`]의 사이클을 실행합니다.
//!
//! # 구조
//! ```text
//! interval tick ──> spawn_blocking(worker.run_cycle()) ──> worker 반환 ──> 다음 tick
//!                          │
//!                          └──> RejectedLine ──mpsc──> rejection logger
//! ```
//!
//! 사이클이 주기보다 오래 걸리면 놓친 tick은 건너뜁니다(`MissedTickBehavior::Skip`).
//! 정지 신호는 사이클 사이에서만 확인하므로 진행 중인 배치는 항상 끝까지 처리됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use snortmon_core::error::{PipelineError, SnortmonError};
use snortmon_core::pipeline::{HealthStatus, Pipeline};
use snortmon_core::store::{EventStore, RuleCatalog};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::IngestSettings;
use crate::cursor::CursorStore;
use crate::error::IngestError;
use crate::parser::RecordParser;
use crate::rejection::RejectedLine;
use crate::tail::TailReader;
use crate::worker::{IngestState, IngestionWorker, SharedState};

/// 연속 실패가 이 횟수 이상이면 unhealthy로 봅니다.
const UNHEALTHY_FAILURE_THRESHOLD: u64 = 10;

/// 사이클 결과 기록 (health_check용)
#[derive(Default)]
struct CycleHealth {
    consecutive_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl CycleHealth {
    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    fn record_failure(&self, reason: String) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(reason);
    }
}

/// 수집 루프
pub struct IngestionLoop {
    interval: Duration,
    /// 정지 상태에서만 Some. 실행 중에는 드라이버 태스크가 소유합니다.
    worker: Option<IngestionWorker>,
    state: SharedState,
    health: Arc<CycleHealth>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    driver: Option<JoinHandle<Option<IngestionWorker>>>,
}

impl IngestionLoop {
    /// 현재 수집 상태
    pub fn state(&self) -> IngestState {
        self.state.get()
    }

    /// 실행 중인지 여부
    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// 생명주기 상태 이름
    pub fn state_name(&self) -> &str {
        if self.is_running() {
            self.state().as_str()
        } else {
            "stopped"
        }
    }
}

async fn drive(
    mut worker: IngestionWorker,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    health: Arc<CycleHealth>,
) -> Option<IngestionWorker> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let cycle = tokio::task::spawn_blocking(move || {
            let result = worker.run_cycle();
            (worker, result)
        });
        match cycle.await {
            Ok((returned, result)) => {
                worker = returned;
                match result {
                    Ok(_) => health.record_success(),
                    Err(e) => {
                        warn!(error = %e, "ingest cycle failed, retrying next tick");
                        health.record_failure(e.to_string());
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "ingest cycle task failed, worker lost");
                health.record_failure(e.to_string());
                return None;
            }
        }
    }
    Some(worker)
}

impl Pipeline for IngestionLoop {
    async fn start(&mut self) -> Result<(), SnortmonError> {
        if self.driver.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let worker = self.worker.take().ok_or_else(|| {
            PipelineError::InitFailed("ingestion worker is unavailable".to_owned())
        })?;

        info!(
            file = %worker.reader().path().display(),
            interval_ms = self.interval.as_millis() as u64,
            "starting ingestion loop"
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.driver = Some(tokio::spawn(drive(
            worker,
            self.interval,
            shutdown_rx,
            Arc::clone(&self.health),
        )));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SnortmonError> {
        let Some(driver) = self.driver.take() else {
            return Err(PipelineError::NotRunning.into());
        };

        info!("stopping ingestion loop");
        if let Some(tx) = self.shutdown_tx.take() {
            // 수신측이 이미 종료된 경우는 무시
            let _ = tx.send(());
        }

        let worker = driver
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?;
        self.worker = worker;
        info!("ingestion loop stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.driver.is_none() {
            return HealthStatus::Unhealthy("ingestion loop is not running".to_owned());
        }
        let failures = self.health.consecutive_failures.load(Ordering::Relaxed);
        if failures == 0 {
            return HealthStatus::Healthy;
        }
        let reason = self
            .health
            .last_error
            .lock()
            .clone()
            .unwrap_or_else(|| "unknown error".to_owned());
        let reason = format!("{failures} consecutive failed cycles: {reason}");
        if failures >= UNHEALTHY_FAILURE_THRESHOLD {
            HealthStatus::Unhealthy(reason)
        } else {
            HealthStatus::Degraded(reason)
        }
    }
}

/// 수집 루프 빌더
///
/// # 반환값
/// `build()`는 `(IngestionLoop, Option<mpsc::Receiver<RejectedLine>>)`를 반환합니다.
/// 외부 거부 라인 송신측을 지정하지 않으면 새 채널의 수신측을 돌려주며,
/// 호출자는 보통 [`spawn_rejection_logger`](crate::rejection::spawn_rejection_logger)에 넘깁니다.
pub struct IngestionLoopBuilder {
    settings: IngestSettings,
    catalog: Option<Arc<dyn RuleCatalog>>,
    store: Option<Arc<dyn EventStore>>,
    rejected_tx: Option<mpsc::Sender<RejectedLine>>,
}

impl IngestionLoopBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            settings: IngestSettings::default(),
            catalog: None,
            store: None,
            rejected_tx: None,
        }
    }

    /// 수집 설정을 지정합니다.
    pub fn settings(mut self, settings: IngestSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 규칙 카탈로그를 지정합니다.
    pub fn catalog(mut self, catalog: Arc<dyn RuleCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 이벤트 저장소를 지정합니다.
    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 외부 거부 라인 송신측을 지정합니다.
    pub fn rejection_sender(mut self, tx: mpsc::Sender<RejectedLine>) -> Self {
        self.rejected_tx = Some(tx);
        self
    }

    /// 설정을 검증하고 수집 루프를 생성합니다.
    pub fn build(
        self,
    ) -> Result<(IngestionLoop, Option<mpsc::Receiver<RejectedLine>>), IngestError> {
        self.settings.validate()?;
        let catalog = self.catalog.ok_or_else(|| IngestError::Config {
            field: "catalog".to_owned(),
            reason: "a rule catalog is required".to_owned(),
        })?;
        let store = self.store.ok_or_else(|| IngestError::Config {
            field: "store".to_owned(),
            reason: "an event store is required".to_owned(),
        })?;

        let (rejected_tx, rejected_rx) = match self.rejected_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.settings.rejection_buffer);
                (tx, Some(rx))
            }
        };

        let worker = build_worker(&self.settings, catalog, store).with_rejection_sender(rejected_tx);
        let state = worker.shared_state();

        Ok((
            IngestionLoop {
                interval: self.settings.poll_interval,
                worker: Some(worker),
                state,
                health: Arc::new(CycleHealth::default()),
                shutdown_tx: None,
                driver: None,
            },
            rejected_rx,
        ))
    }
}

impl Default for IngestionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 설정으로부터 워커를 조립합니다. 일회성 수집(CLI)에서도 사용합니다.
pub fn build_worker(
    settings: &IngestSettings,
    catalog: Arc<dyn RuleCatalog>,
    store: Arc<dyn EventStore>,
) -> IngestionWorker {
    let reader = TailReader::new(
        settings.alert_file.clone(),
        CursorStore::new(settings.cursor_path.clone()),
        settings.max_read_bytes,
    );
    IngestionWorker::new(reader, RecordParser::new(catalog), store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snortmon_storage::Stores;

    fn settings(dir: &std::path::Path) -> IngestSettings {
        crate::config::IngestSettingsBuilder::new()
            .alert_file(dir.join("alert_json.txt"))
            .cursor_path(dir.join("cursor"))
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    fn builder(dir: &std::path::Path) -> IngestionLoopBuilder {
        let stores = Stores::in_memory();
        IngestionLoopBuilder::new()
            .settings(settings(dir))
            .catalog(stores.rules)
            .store(stores.events)
    }

    #[test]
    fn build_requires_store_and_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let result = IngestionLoopBuilder::new().settings(settings(dir.path())).build();
        assert!(matches!(result, Err(IngestError::Config { .. })));
    }

    #[test]
    fn build_returns_receiver_without_external_sender() {
        let dir = tempfile::tempdir().unwrap();
        let (_loop, rx) = builder(dir.path()).build().unwrap();
        assert!(rx.is_some());

        let (tx, _rx) = mpsc::channel(1);
        let (_loop, rx) = builder(dir.path()).rejection_sender(tx).build().unwrap();
        assert!(rx.is_none());
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ingest, _rx) = builder(dir.path()).build().unwrap();

        assert!(ingest.health_check().await.is_unhealthy());
        assert_eq!(ingest.state_name(), "stopped");

        ingest.start().await.unwrap();
        assert!(ingest.is_running());
        assert!(ingest.start().await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ingest.health_check().await.is_healthy());

        ingest.stop().await.unwrap();
        assert_eq!(ingest.state(), IngestState::Idle);
        assert!(ingest.stop().await.is_err());

        // 정지 후 재시작 가능
        ingest.start().await.unwrap();
        ingest.stop().await.unwrap();
    }
}
