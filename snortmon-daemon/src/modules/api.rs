//! Query API module.
//!
//! Wraps the axum server from `snortmon-query` in the `Pipeline`
//! lifecycle so the orchestrator can start, stop and health-check it
//! like any other module. The listener is bound in `start()` so a busy
//! port fails startup instead of a background task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use snortmon_core::config::SnortmonConfig;
use snortmon_core::error::{PipelineError, SnortmonError};
use snortmon_core::pipeline::{HealthStatus, Pipeline};
use snortmon_ingest::{RefreshSettings, RuleUpdater};
use snortmon_query::{AppState, QueryEngine};
use snortmon_storage::Stores;

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "api";

/// HTTP query API server.
pub struct ApiServer {
    state: Arc<AppState>,
    listen_addr: String,
    port: u16,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ApiServer {
    /// Create a stopped server.
    pub fn new(state: Arc<AppState>, listen_addr: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            listen_addr: listen_addr.into(),
            port,
            local_addr: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Pipeline for ApiServer {
    async fn start(&mut self) -> Result<(), SnortmonError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let listener = TcpListener::bind(format!("{}:{}", self.listen_addr, self.port)).await?;
        self.local_addr = Some(listener.local_addr()?);

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        self.task = Some(tokio::spawn(snortmon_query::serve(
            listener,
            Arc::clone(&self.state),
            shutdown,
        )));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SnortmonError> {
        let Some(task) = self.task.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.local_addr = None;
        task.await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.task {
            None => HealthStatus::Unhealthy("api server is not running".to_owned()),
            Some(task) if task.is_finished() => {
                HealthStatus::Unhealthy("api server exited unexpectedly".to_owned())
            }
            Some(_) => HealthStatus::Healthy,
        }
    }
}

/// Build the rule updater shared by the API.
///
/// Returns `None` when no dump command is configured; the refresh
/// endpoint then answers 503.
pub fn rule_updater(config: &SnortmonConfig, stores: &Stores) -> Result<Option<Arc<RuleUpdater>>> {
    if config.rules.dump_command.is_empty() {
        tracing::info!("rule dump command not configured; rule refresh disabled");
        return Ok(None);
    }
    let settings = RefreshSettings::from_core(&config.rules);
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid rules configuration: {}", e))?;
    Ok(Some(Arc::new(RuleUpdater::new(settings, stores.rules.clone()))))
}

/// Initialize the query API module.
///
/// Returns `None` if the API is disabled in configuration.
pub fn init(
    config: &SnortmonConfig,
    stores: &Stores,
    updater: Option<Arc<RuleUpdater>>,
    health: watch::Receiver<HealthStatus>,
) -> Result<Option<ModuleHandle>> {
    if !config.api.enabled {
        tracing::info!("query API disabled in configuration");
        return Ok(None);
    }

    let engine = QueryEngine::new(stores.events.clone(), stores.rules.clone())
        .with_page_size(config.api.page_size as u64);
    let mut state = AppState::new(engine, health);
    if let Some(updater) = updater {
        state = state.with_updater(updater);
    }

    let server = ApiServer::new(Arc::new(state), &config.api.listen_addr, config.api.port);
    Ok(Some(ModuleHandle::new(MODULE_NAME, true, Box::new(server))))
}
