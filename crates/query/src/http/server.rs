use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::router::build_router;
use super::state::AppState;

/// 조회 API 서버를 실행합니다.
///
/// `shutdown`이 완료되면 진행 중인 요청을 마무리한 뒤 반환합니다.
pub async fn run_http_server(
    state: Arc<AppState>,
    bind_address: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(format!("{bind_address}:{port}")).await?;
    serve(listener, state, shutdown).await
}

/// 이미 바인드된 리스너로 서버를 실행합니다.
///
/// 바인드 실패를 시작 시점에 보고해야 하는 호출자가 사용합니다.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(%local, "query API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
