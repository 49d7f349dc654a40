//! HTTP API 통합 테스트 -- 라우터에 직접 요청을 보내 응답 본문을 검증합니다.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{TimeDelta, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use snortmon_core::pipeline::HealthStatus;
use snortmon_core::types::{NewAlert, Rule, RuleKey};
use snortmon_query::{AppState, QueryEngine, build_router};
use snortmon_storage::Stores;
use tokio::sync::watch;
use tower::ServiceExt;

fn seed(stores: &Stores, sid: u32, src: &str, dst: &str, age: TimeDelta) {
    let rule = Rule::new(RuleKey::new(sid, 1, 1), "alert", format!("rule {sid}"));
    stores.rules.insert_if_absent(&rule).unwrap();
    stores
        .events
        .append(NewAlert {
            timestamp: Utc::now() - age,
            src_addr: src.to_owned(),
            src_port: Some(50000),
            dst_addr: dst.to_owned(),
            dst_port: Some(443),
            proto: "TCP".to_owned(),
            rule,
        })
        .unwrap();
}

fn router(stores: &Stores, page_size: u64) -> (Router, watch::Sender<HealthStatus>) {
    let engine =
        QueryEngine::new(stores.events.clone(), stores.rules.clone()).with_page_size(page_size);
    let (health_tx, health_rx) = watch::channel(HealthStatus::Healthy);
    let state = Arc::new(AppState::new(engine, health_rx));
    (build_router(state), health_tx)
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn disallowed_param_is_rejected_with_allowed_list() {
    let stores = Stores::in_memory();
    let (router, _health) = router(&stores, 50);

    let (status, body) = send(&router, Method::GET, "/api/v1/events/?src_addr=a&invalid_param=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "You can use only src_addr, src_port, dst_addr, dst_port, sid, proto, page as query filters."})
    );
}

#[tokio::test]
async fn list_reports_pagination_metadata() {
    let stores = Stores::in_memory();
    for i in 0..5 {
        seed(&stores, 1000 + i, "10.0.0.1", "10.0.0.2", TimeDelta::minutes(1));
    }
    let (router, _health) = router(&stores, 2);

    let (status, body) = send(&router, Method::GET, "/api/v1/events/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 5);
    assert_eq!(body["next"], 2);
    assert_eq!(body["previous"], Value::Null);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"][0]["sid"], 1000);
    assert_eq!(body["results"][0]["message"], "rule 1000");

    let (_, body) = send(&router, Method::GET, "/api/v1/events/?page=3").await;
    assert_eq!(body["next"], Value::Null);
    assert_eq!(body["previous"], 2);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);

    let (status, body) = send(&router, Method::GET, "/api/v1/events/?page=4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid page.");
}

#[tokio::test]
async fn list_applies_filters() {
    let stores = Stores::in_memory();
    seed(&stores, 1, "10.0.0.1", "10.0.0.9", TimeDelta::zero());
    seed(&stores, 2, "10.0.0.2", "10.0.0.9", TimeDelta::zero());
    let (router, _health) = router(&stores, 50);

    let (_, body) = send(&router, Method::GET, "/api/v1/events?src_addr=10.0.0.2&dst_port=443").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["sid"], 2);

    let (status, _) = send(&router, Method::GET, "/api/v1/events/?src_port=http").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_marks_deleted_and_is_idempotent() {
    let stores = Stores::in_memory();
    seed(&stores, 1, "a", "b", TimeDelta::zero());
    seed(&stores, 2, "a", "b", TimeDelta::zero());
    let (router, _health) = router(&stores, 50);

    let (status, body) = send(&router, Method::PATCH, "/api/v1/events/?sid=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (_, body) = send(&router, Method::PATCH, "/api/v1/events/").await;
    assert_eq!(body, json!({"message": "All events are marked as deleted.", "updated": 1}));

    let (_, body) = send(&router, Method::PATCH, "/api/v1/events/").await;
    assert_eq!(body["updated"], 0);

    let (_, body) = send(&router, Method::GET, "/api/v1/events/").await;
    assert_eq!(body["count"], 0);
    assert_eq!(stores.events.purge().unwrap(), 2);
}

#[tokio::test]
async fn count_orders_by_ascending_count() {
    let stores = Stores::in_memory();
    for _ in 0..3 {
        seed(&stores, 10, "10.0.0.1", "10.0.0.2", TimeDelta::hours(1));
    }
    seed(&stores, 20, "10.0.0.3", "10.0.0.4", TimeDelta::hours(1));
    seed(&stores, 20, "10.0.0.3", "10.0.0.4", TimeDelta::days(40));
    let (router, _health) = router(&stores, 50);

    let (status, body) = send(&router, Method::GET, "/api/v1/events/count/?type=sid").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"],
        json!([{"sid": 20, "count": 2}, {"sid": 10, "count": 3}])
    );

    let (_, body) = send(&router, Method::GET, "/api/v1/events/count?type=addr&period=month").await;
    assert_eq!(
        body["results"],
        json!([
            {"src_addr": "10.0.0.3", "dst_addr": "10.0.0.4", "count": 1},
            {"src_addr": "10.0.0.1", "dst_addr": "10.0.0.2", "count": 3},
        ])
    );
}

#[tokio::test]
async fn count_validation_messages() {
    let stores = Stores::in_memory();
    let (router, _health) = router(&stores, 50);

    let (status, body) = send(&router, Method::GET, "/api/v1/events/count/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You should define 'type' of filter (sid or addr)");

    let (_, body) = send(&router, Method::GET, "/api/v1/events/count/?type=sid&period=year").await;
    assert_eq!(body["error"], "Unknown 'period', use 'all', 'day', 'week' or 'month'");
}

#[tokio::test]
async fn rules_are_listed_with_key_filter() {
    let stores = Stores::in_memory();
    seed(&stores, 7, "a", "b", TimeDelta::zero());
    seed(&stores, 8, "a", "b", TimeDelta::zero());
    let (router, _health) = router(&stores, 50);

    let (status, body) = send(&router, Method::GET, "/api/v1/rules/?sid=8").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"],
        json!([{"sid": 8, "rev": 1, "gid": 1, "action": "alert", "message": "rule 8"}])
    );

    let (status, _) = send(&router, Method::GET, "/api/v1/rules/?action=alert").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rule_update_without_updater_is_unavailable() {
    let stores = Stores::in_memory();
    let (router, _health) = router(&stores, 50);
    let (status, body) = send(&router, Method::POST, "/api/v1/rules/update/").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[cfg(unix)]
#[tokio::test]
async fn rule_update_runs_in_background() {
    use std::time::Duration;

    use snortmon_ingest::{RefreshSettings, RuleUpdater};

    let dir = tempfile::tempdir().unwrap();
    let stores = Stores::in_memory();
    let settings = RefreshSettings {
        update_command: vec!["sleep".to_owned(), "0.2".to_owned()],
        dump_command: vec![
            "echo".to_owned(),
            r#"{"gid": 1, "sid": 99, "rev": 2, "msg": "bg", "action": "alert"}"#.to_owned(),
        ],
        restart_command: Vec::new(),
        dump_path: dir.path().join("rules.json"),
        timeout: Duration::from_secs(5),
    };
    let updater = Arc::new(RuleUpdater::new(settings, stores.rules.clone()));
    let engine = QueryEngine::new(stores.events.clone(), stores.rules.clone());
    let (_health_tx, health_rx) = watch::channel(HealthStatus::Healthy);
    let router = build_router(Arc::new(
        AppState::new(engine, health_rx).with_updater(updater.clone()),
    ));

    let (status, body) = send(&router, Method::POST, "/api/v1/rules/update/").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"message": "Update process started."}));

    let (status, _) = send(&router, Method::POST, "/api/v1/rules/update").await;
    assert_eq!(status, StatusCode::CONFLICT);

    for _ in 0..100 {
        if !updater.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let (_, body) = send(&router, Method::GET, "/api/v1/rules/?sid=99").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["rev"], 2);
}

#[tokio::test]
async fn healthz_reports_current_status() {
    let stores = Stores::in_memory();
    let (router, health) = router(&stores, 50);

    let (status, body) = send(&router, Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy"}));

    health
        .send(HealthStatus::Degraded("ingestion: 2 consecutive failures".to_owned()))
        .unwrap();
    let (_, body) = send(&router, Method::GET, "/healthz").await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn unknown_route_is_malformed_request() {
    let stores = Stores::in_memory();
    let (router, _health) = router(&stores, 50);
    let (status, body) = send(&router, Method::GET, "/api/v2/whatever").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "The request is malformed or invalid."}));
}
