//! 요청 핸들러
//!
//! 저장소 호출은 모두 `spawn_blocking` 안에서 실행됩니다.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use snortmon_core::metrics as m;
use snortmon_core::pipeline::HealthStatus;
use snortmon_core::query::CountRow;
use tracing::{error, info};

use super::error::{ApiError, MALFORMED_REQUEST};
use super::state::AppState;
use super::views::{EventView, MessageView, RuleView};
use crate::error::QueryError;
use crate::page::Page;
use crate::params::PAGE_PARAM;

/// 쿼리 문자열 그대로의 `(이름, 값)` 목록
type RawParams = Query<Vec<(String, String)>>;

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, QueryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("spawn_blocking failed: {e}")))?
        .map_err(ApiError::from)
}

fn record<T>(endpoint: &'static str, result: &Result<T, ApiError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(err) => {
            if matches!(err, ApiError::BadRequest(_) | ApiError::NotFound(_)) {
                metrics::counter!(m::QUERY_VALIDATION_ERRORS_TOTAL, m::LABEL_ENDPOINT => endpoint)
                    .increment(1);
            }
            err.result_label()
        }
    };
    metrics::counter!(
        m::QUERY_REQUESTS_TOTAL,
        m::LABEL_ENDPOINT => endpoint,
        m::LABEL_RESULT => label
    )
    .increment(1);
}

/// `GET /api/v1/events/`
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): RawParams,
) -> Result<Json<Page<EventView>>, ApiError> {
    let engine = state.engine.clone();
    let result = blocking(move || engine.list_events(&params)).await;
    record("events_list", &result);
    Ok(Json(result?.map(EventView::from)))
}

/// `PATCH /api/v1/events/` -- 필터에 맞는 이벤트를 모두 삭제 표시
pub async fn mark_events_deleted(
    State(state): State<Arc<AppState>>,
    Query(params): RawParams,
) -> Result<Json<MessageView>, ApiError> {
    let filtered = params
        .iter()
        .any(|(name, value)| name != PAGE_PARAM && !value.is_empty());
    let engine = state.engine.clone();
    let result = blocking(move || engine.mark_deleted(&params)).await;
    record("events_mark_deleted", &result);
    let updated = result?;

    let message = if filtered {
        "All matching events are marked as deleted."
    } else {
        "All events are marked as deleted."
    };
    Ok(Json(MessageView {
        message: message.to_owned(),
        updated: Some(updated),
    }))
}

/// `GET /api/v1/events/count/`
pub async fn count_events(
    State(state): State<Arc<AppState>>,
    Query(params): RawParams,
) -> Result<Json<Page<CountRow>>, ApiError> {
    let engine = state.engine.clone();
    let result = blocking(move || engine.count_events(&params, Utc::now())).await;
    record("events_count", &result);
    Ok(Json(result?))
}

/// `GET /api/v1/rules/`
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(params): RawParams,
) -> Result<Json<Page<RuleView>>, ApiError> {
    let engine = state.engine.clone();
    let result = blocking(move || engine.list_rules(&params)).await;
    record("rules_list", &result);
    Ok(Json(result?.map(RuleView::from)))
}

/// `POST /api/v1/rules/update/` -- 규칙 갱신을 백그라운드로 시작합니다.
///
/// 이미 진행 중이면 409를 반환합니다.
pub async fn update_rules(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let result = start_refresh(&state);
    record("rules_update", &result);
    result?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageView::new("Update process started.")),
    ))
}

fn start_refresh(state: &AppState) -> Result<(), ApiError> {
    let Some(updater) = state.updater.clone() else {
        return Err(ApiError::Unavailable(
            "Rule updates are not configured.".to_owned(),
        ));
    };
    let Some(guard) = updater.try_begin() else {
        return Err(ApiError::Conflict(
            "Update process is already running.".to_owned(),
        ));
    };

    tokio::spawn(async move {
        match updater.refresh_with(guard).await {
            Ok(report) => info!(%report, "rule refresh finished"),
            Err(e) => error!(error = %e, "rule refresh failed"),
        }
    });
    Ok(())
}

/// `GET /healthz`
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.health.borrow().clone())
}

/// 매칭되는 라우트가 없을 때
pub async fn not_found() -> ApiError {
    ApiError::NotFound(MALFORMED_REQUEST.to_owned())
}
