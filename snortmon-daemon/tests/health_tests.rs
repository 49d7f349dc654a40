//! Health aggregation tests.

use snortmon_core::pipeline::HealthStatus;
use snortmon_daemon::health::{DaemonHealth, ModuleHealth, aggregate_status};

fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
    ModuleHealth {
        name: name.to_owned(),
        enabled,
        status,
    }
}

#[test]
fn all_healthy_is_healthy() {
    let modules = vec![
        module("ingest", true, HealthStatus::Healthy),
        module("api", true, HealthStatus::Healthy),
    ];
    assert!(aggregate_status(&modules).is_healthy());
}

#[test]
fn empty_registry_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn degraded_module_names_itself() {
    let modules = vec![
        module("ingest", true, HealthStatus::Degraded("2 consecutive failed cycles".to_owned())),
        module("api", true, HealthStatus::Healthy),
    ];
    assert_eq!(
        aggregate_status(&modules),
        HealthStatus::Degraded("ingest: 2 consecutive failed cycles".to_owned())
    );
}

#[test]
fn unhealthy_wins_over_degraded() {
    let modules = vec![
        module("ingest", true, HealthStatus::Degraded("slow".to_owned())),
        module("api", true, HealthStatus::Unhealthy("api server exited unexpectedly".to_owned())),
    ];
    assert_eq!(
        aggregate_status(&modules),
        HealthStatus::Unhealthy("api: api server exited unexpectedly".to_owned())
    );
}

#[test]
fn disabled_modules_are_ignored() {
    let modules = vec![
        module("ingest", false, HealthStatus::Unhealthy("not running".to_owned())),
        module("api", true, HealthStatus::Healthy),
    ];
    assert!(aggregate_status(&modules).is_healthy());
}

#[test]
fn daemon_health_serializes_with_tagged_statuses() {
    let modules = vec![
        module("ingest", true, HealthStatus::Degraded("slow".to_owned())),
        module("api", true, HealthStatus::Healthy),
    ];
    let report = DaemonHealth {
        status: aggregate_status(&modules),
        uptime_secs: 42,
        modules,
    };

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"]["status"], "degraded");
    assert_eq!(json["status"]["reason"], "ingest: slow");
    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["modules"][1]["name"], "api");
    assert_eq!(json["modules"][1]["status"], serde_json::json!({"status": "healthy"}));
}
