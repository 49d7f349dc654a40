//! Module orchestration -- assembly, health publishing, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `snortmon-daemon`.
//! It validates configuration, opens the shared stores, builds enabled
//! modules, manages startup/shutdown ordering, and runs the main loop.
//!
//! # Startup Order
//!
//! 1. Ingestion loop (writes events)
//! 2. Query API (reads events, triggers rule refresh)
//!
//! # Shutdown Order (reverse)
//!
//! 1. Query API (drain in-flight requests)
//! 2. Ingestion loop (finish the current cycle)

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, watch};

use snortmon_core::config::SnortmonConfig;
use snortmon_core::metrics as m;
use snortmon_core::pipeline::HealthStatus;
use snortmon_storage::{Stores, open_stores};

use crate::health::{DaemonHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// How often module health is polled and published.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// How often the uptime gauge is refreshed.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: SnortmonConfig,
    /// Registered modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// Shared store handles.
    stores: Stores,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Publishes the aggregated status to `/healthz`.
    health_tx: watch::Sender<HealthStatus>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, parsed or
    /// validated, or if any enabled module fails to initialize.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = SnortmonConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: SnortmonConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let storage = config.storage.clone();
        let stores = tokio::task::spawn_blocking(move || open_stores(&storage))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking failed: {}", e))?
            .map_err(|e| anyhow::anyhow!("failed to open event store: {}", e))?;
        tracing::info!(backend = %config.storage.backend, "event store opened");

        let (shutdown_tx, _) = broadcast::channel(16);
        let (health_tx, health_rx) = watch::channel(HealthStatus::Healthy);

        let mut registry = ModuleRegistry::new();
        if let Some(handle) = modules::ingest::init(&config, &stores)? {
            registry.register(handle);
        }
        let updater = modules::api::rule_updater(&config, &stores)?;
        if let Some(handle) = modules::api::init(&config, &stores, updater, health_rx)? {
            registry.register(handle);
        }

        tracing::info!(
            total_modules = registry.count(),
            enabled_modules = registry.enabled_count(),
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            modules: registry,
            stores,
            shutdown_tx,
            health_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all modules and block until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start all modules and block until `shutdown` resolves.
    ///
    /// The future yields the name of the trigger for logging.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| self.config.general.pid_file.clone());
        if let Some(path) = &pid_file {
            write_pid_file(Path::new(path))?;
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            if let Some(path) = &pid_file {
                remove_pid_file(Path::new(path));
            }
            return Err(e);
        }

        let uptime_task = self.config.metrics.enabled.then(|| {
            spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe())
        });

        tracing::info!("entering main loop");
        let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                trigger = &mut shutdown => break trigger,
                _ = health_tick.tick() => self.publish_health().await,
            }
        };
        match &outcome {
            Ok(trigger) => tracing::info!(signal = trigger, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "shutdown signal handling failed"),
        }

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.shutdown().await;

        if let Some(path) = &pid_file {
            remove_pid_file(Path::new(path));
        }

        outcome?;
        stopped
    }

    /// Stop all modules in reverse registration order.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    async fn publish_health(&self) {
        let report = self.health().await;
        let changed = self.health_tx.send_if_modified(|current| {
            if *current == report.status {
                return false;
            }
            *current = report.status.clone();
            true
        });
        if changed {
            if report.status.is_healthy() {
                tracing::info!("daemon is healthy");
            } else {
                tracing::warn!(status = %report.status, "daemon health changed");
            }
        }
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health_statuses().await;
        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// A receiver for the status published to `/healthz`.
    pub fn health_receiver(&self) -> watch::Receiver<HealthStatus> {
        self.health_tx.subscribe()
    }

    /// Shared store handles.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &SnortmonConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Write the current process PID to a file.
///
/// Fails if the file already exists, which usually means another
/// instance is running.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file
/// - Verifies the created file is a regular file
/// - Creates the parent directory with mode 0o700
pub(crate) fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{pid}")?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub(crate) fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
