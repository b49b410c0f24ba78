//! Fault scope middleware for axum.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::guard::FaultGuard;
use crate::scope::{FaultScope, ScopeInfo};

/// Wrap every request in a fault scope.
///
/// Layer it with the guard as state:
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(middleware::from_fn_with_state(guard.clone(), fault_scope_middleware));
/// ```
///
/// The scope's [`ScopeHandle`](crate::scope::ScopeHandle) is inserted into
/// request extensions for handlers to spawn request-scoped work through.
/// The inner service's response is raced against the scope's first captured
/// error: on a clean response the middleware is transparent; on an error it
/// answers with the escalation policy's fallback response instead. Either
/// way the scope then lingers as a background drain so late errors are
/// still counted and logged.
pub async fn fault_scope_middleware(
    State(guard): State<Arc<FaultGuard>>,
    mut request: Request,
    next: Next,
) -> Response {
    let info = ScopeInfo::for_request(request.method(), request.uri());
    let mut scope = FaultScope::new(guard, info);
    request.extensions_mut().insert(scope.handle());

    let response = tokio::select! {
        response = next.run(request) => response,
        response = scope.escalated() => response,
    };

    scope.into_drain();
    response
}
