use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use super::handlers::{
    count_events, healthz, list_events, list_rules, mark_events_deleted, not_found, update_rules,
};
use super::state::AppState;

/// 조회 API 라우터를 구성합니다.
///
/// 모든 API 경로는 끝의 `/` 유무와 관계없이 같은 핸들러로 연결됩니다.
pub fn build_router(state: Arc<AppState>) -> Router {
    let events = get(list_events).patch(mark_events_deleted);
    let count = get(count_events);
    let rules = get(list_rules);
    let update = post(update_rules);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/events/", events.clone())
        .route("/api/v1/events", events)
        .route("/api/v1/events/count/", count.clone())
        .route("/api/v1/events/count", count)
        .route("/api/v1/rules/", rules.clone())
        .route("/api/v1/rules", rules)
        .route("/api/v1/rules/update/", update.clone())
        .route("/api/v1/rules/update", update)
        .fallback(not_found)
        .with_state(state)
}
