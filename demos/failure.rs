//! Failure demo: a guarded worker that retires itself after an
//! out-of-band error.
//!
//! Run with `cargo run --example failure`, then `curl http://127.0.0.1:1984/`.
//! The handler schedules a background task that fails after it has yielded;
//! the guard answers the request with a 500, stops the listener, and a
//! 3-second kill timer bounds the rest.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{middleware, Extension, Router};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fault_guard::{fault_scope_middleware, GracefulServer, GuardBuilder, ScopeHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fault_guard=debug,failure=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = Arc::new(GracefulServer::new());
    let guard = GuardBuilder::new()
        .server(server.clone())
        .kill_timeout(Duration::from_secs(3))
        .build()?;

    let app = Router::new()
        .route("/", get(trigger))
        .layer(middleware::from_fn_with_state(
            guard.clone(),
            fault_scope_middleware,
        ))
        // Sync panics in a handler's own stack are the framework's concern,
        // not the fault scope's.
        .layer(CatchPanicLayer::new());

    let listener = TcpListener::bind("127.0.0.1:1984").await?;
    tracing::info!(address = %listener.local_addr()?, "worker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(server.shutdown_signal())
        .await?;
    server.mark_closed();

    tracing::info!("worker retired");
    Ok(())
}

/// Schedules failing background work tied to the request and never answers
/// on its own; the fault scope supplies the response.
async fn trigger(Extension(scope): Extension<ScopeHandle>) -> String {
    scope.spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err::<(), std::io::Error>(std::io::Error::other("keepalive response handler failed"))
    });
    std::future::pending::<String>().await
}
