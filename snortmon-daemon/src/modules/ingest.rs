//! Ingestion loop module initialization.
//!
//! Converts `SnortmonConfig.ingest` into `IngestSettings`, builds the
//! `IngestionLoop` on top of the shared stores, and wraps it in a
//! `ModuleHandle`.
//!
//! # Channel Wiring
//!
//! ```text
//! IngestionLoop --RejectedLine--> rejection logger task
//! ```

use anyhow::Result;

use snortmon_core::config::SnortmonConfig;
use snortmon_ingest::{IngestSettings, IngestionLoopBuilder, spawn_rejection_logger};
use snortmon_storage::Stores;

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "ingest";

/// Initialize the ingestion loop module.
///
/// Returns `None` if ingestion is disabled in configuration. The
/// rejection logger task is spawned here and exits on its own once the
/// loop (and with it the channel sender) is dropped.
pub fn init(config: &SnortmonConfig, stores: &Stores) -> Result<Option<ModuleHandle>> {
    if !config.ingest.enabled {
        tracing::info!("ingestion disabled in configuration");
        return Ok(None);
    }

    tracing::info!(alert_file = %config.ingest.alert_file, "initializing ingestion loop");

    let (ingest, rejected_rx) = IngestionLoopBuilder::new()
        .settings(IngestSettings::from_core(&config.ingest))
        .catalog(stores.rules.clone())
        .store(stores.events.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build ingestion loop: {}", e))?;

    if let Some(rx) = rejected_rx {
        tokio::spawn(async move {
            let logged = spawn_rejection_logger(rx).await.unwrap_or_default();
            tracing::debug!(logged, "rejection logger finished");
        });
    }

    Ok(Some(ModuleHandle::new(MODULE_NAME, true, Box::new(ingest))))
}
