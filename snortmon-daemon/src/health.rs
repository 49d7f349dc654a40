//! Aggregated health check reporting.
//!
//! The orchestrator polls each module's `health_check()` and produces a
//! unified [`DaemonHealth`] report. The overall daemon status is the
//! worst status among all enabled modules and is published to the query
//! API's `/healthz` through a `watch` channel.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use snortmon_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all modules).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-module health reports.
    pub modules: Vec<ModuleHealth>,
}

/// Health status for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name (e.g., "ingest", "api").
    pub name: String,
    /// Whether the module is enabled in configuration.
    pub enabled: bool,
    /// Current health status of the module.
    pub status: HealthStatus,
}

/// Aggregate multiple module health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// Only considers enabled modules. Reasons of every non-healthy module
/// at the worst level are joined with `"; "`.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let worst = modules
        .iter()
        .filter(|m| m.enabled)
        .fold(HealthStatus::Healthy, |acc, m| acc.worst(m.status.clone()));

    let reasons = |unhealthy: bool| {
        modules
            .iter()
            .filter(|m| m.enabled)
            .filter_map(|m| match &m.status {
                HealthStatus::Unhealthy(reason) if unhealthy => Some(format!("{}: {reason}", m.name)),
                HealthStatus::Degraded(reason) if !unhealthy => Some(format!("{}: {reason}", m.name)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons(false)),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons(true)),
    }
}
