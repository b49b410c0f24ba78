//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Extension, Router};
use fault_guard::shutdown::kill_timer;
use fault_guard::{fault_scope_middleware, FaultGuard, ScopeHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Make sure the kill timer never terminates the test process.
pub fn init_test_mode() {
    std::env::set_var(kill_timer::TEST_MODE_ENV, "1");
}

/// Routes mirroring the classic failure patterns: a healthy route plus
/// handlers that schedule one, two, or three failing callbacks.
pub fn test_routes() -> Router<()> {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            // An in-stack failure: reported through the framework's own
            // error path, never through the fault scope.
            "/sync_error",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "sync_error") }),
        )
        .route(
            "/async_error",
            get(|Extension(scope): Extension<ScopeHandle>| async move {
                schedule_failure(&scope, 10, "ff is not defined");
                std::future::pending::<String>().await
            }),
        )
        .route(
            "/async_error_triple",
            get(|Extension(scope): Extension<ScopeHandle>| async move {
                schedule_failure(&scope, 10, "ff is not defined");
                schedule_failure(&scope, 40, "bar is not defined");
                schedule_failure(&scope, 40, "hehe is not defined");
                std::future::pending::<String>().await
            }),
        )
}

fn schedule_failure(scope: &ScopeHandle, delay_ms: u64, message: &'static str) {
    scope.spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Err::<(), std::io::Error>(std::io::Error::other(message))
    });
}

/// Serve `routes` behind the guard's middleware on an ephemeral port.
///
/// Returns the bound address and the serve task; the task finishes when the
/// shutdown signal resolves.
pub async fn start_guarded_app(
    guard: Arc<FaultGuard>,
    routes: Router<()>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> (SocketAddr, JoinHandle<()>) {
    let app = routes.layer(middleware::from_fn_with_state(
        guard,
        fault_scope_middleware,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .unwrap();
    });

    // Give the serve loop a beat to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, server_task)
}

/// Client that never reuses connections, so `Connection: close` responses
/// do not poison later requests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
