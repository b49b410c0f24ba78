//! Per-request fault scopes.
//!
//! # Responsibilities
//! - Funnel every failure from request-scoped asynchronous work into one
//!   error callback per request
//! - Escalate the first error; log and suppress the rest
//! - Keep capture attached across suspension points for the life of the
//!   request
//!
//! # Design Decisions
//! - Capture is explicit, not ambient: handlers spawn request-scoped work
//!   through the [`ScopeHandle`] found in request extensions, and the handle
//!   carries the error sink across every asynchronous boundary
//! - Synchronous errors inside a handler's own stack never reach the scope;
//!   axum's dispatch turns them into responses before the scope would see
//!   them, and in-stack panics belong to the host framework (see
//!   `tower_http::catch_panic`)
//! - A scope outlives its request as a background drain task, so errors
//!   arriving after the response still get counted and logged

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::{Method, Uri};
use axum::response::Response;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::CapturedError;
use crate::guard::FaultGuard;
use crate::observability::metrics;

pub mod counter;
pub mod middleware;

pub use counter::ErrorCounter;

/// Identity of a fault scope, carried into every diagnostic record.
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    /// Unique scope id.
    pub id: Uuid,
    /// Request method, or `-` for a detached scope.
    pub method: String,
    /// Request path, or `-` for a detached scope.
    pub path: String,
}

impl ScopeInfo {
    pub fn for_request(method: &Method, uri: &Uri) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.to_string(),
            path: uri.path().to_string(),
        }
    }

    /// Identity for a scope not tied to any request (degraded mode).
    pub fn detached() -> Self {
        Self {
            id: Uuid::new_v4(),
            method: "-".to_string(),
            path: "-".to_string(),
        }
    }
}

/// State shared between a scope, its handles, and its drain task.
struct ScopeShared {
    info: ScopeInfo,
    counter: ErrorCounter,
    guard: Arc<FaultGuard>,
}

impl ScopeShared {
    /// The scope's single error callback.
    ///
    /// Occurrence 1 escalates and yields the response for the triggering
    /// request; occurrences 2+ are logged and suppressed, because
    /// escalation already put the process on an irreversible retirement
    /// path and repeating it would race the shutdown sequence.
    fn on_error(&self, error: CapturedError) -> Option<Response> {
        let occurrence = self.counter.record();
        metrics::record_captured_error(occurrence);

        if occurrence > 1 {
            tracing::error!(
                scope = %self.info.id,
                method = %self.info.method,
                path = %self.info.path,
                occurrence,
                error = %error,
                "error suppressed, scope already escalated"
            );
            return None;
        }

        Some(self.guard.escalate(&self.info, &error))
    }
}

/// Cloneable handle through which request handlers attach asynchronous work
/// to their request's fault scope.
///
/// The middleware inserts one into request extensions; extract it with
/// `axum::Extension<ScopeHandle>`. Any task spawned through it that returns
/// `Err` or panics is delivered to the scope's error callback instead of
/// being silently lost.
#[derive(Clone)]
pub struct ScopeHandle {
    shared: Arc<ScopeShared>,
    tx: mpsc::UnboundedSender<CapturedError>,
}

impl ScopeHandle {
    /// Spawn asynchronous work inside this scope's fault extent.
    ///
    /// The future's `Err` result, or its panic, is captured and funneled to
    /// the scope; a clean `Ok(())` is discarded.
    pub fn spawn<F, E>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => handle.deliver(CapturedError::task(error)),
                Err(payload) => handle.deliver(CapturedError::from_panic(payload)),
            }
        })
    }

    /// Deliver an error directly, for callback-style code that cannot be
    /// expressed as a spawned future.
    pub fn report<E>(&self, error: E)
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.deliver(CapturedError::task(error));
    }

    fn deliver(&self, error: CapturedError) {
        // The drain task holds the receiver for as long as any handle is
        // alive, so this only fails if delivery races process teardown.
        if self.tx.send(error).is_err() {
            tracing::error!(scope = %self.shared.info.id, "scope drain gone, error dropped");
        }
    }
}

/// The per-request execution scope.
///
/// Created by the middleware for each inbound request. Holds the receiving
/// end of the error funnel; [`escalated`](Self::escalated) races the inner
/// service inside the middleware, and [`into_drain`](Self::into_drain)
/// keeps the funnel alive for errors arriving after the response.
pub struct FaultScope {
    shared: Arc<ScopeShared>,
    tx: mpsc::UnboundedSender<CapturedError>,
    rx: mpsc::UnboundedReceiver<CapturedError>,
}

impl FaultScope {
    pub fn new(guard: Arc<FaultGuard>, info: ScopeInfo) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(ScopeShared {
                info,
                counter: ErrorCounter::new(),
                guard,
            }),
            tx,
            rx,
        }
    }

    /// A new handle bound to this scope.
    pub fn handle(&self) -> ScopeHandle {
        ScopeHandle {
            shared: self.shared.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Resolve with the escalation response once the first error arrives.
    ///
    /// Pends forever if no error ever surfaces; callers race it against the
    /// inner service's response.
    pub async fn escalated(&mut self) -> Response {
        loop {
            match self.rx.recv().await {
                Some(error) => {
                    if let Some(response) = self.shared.on_error(error) {
                        return response;
                    }
                }
                // Unreachable while the scope holds a sender; pend rather
                // than fabricate a response.
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Detach into a background drain for errors that arrive after the
    /// request has been answered.
    ///
    /// Late errors still go through the scope's callback: a late first
    /// error escalates (its response has nowhere to go and is discarded),
    /// later ones are logged and suppressed. The drain ends when the last
    /// [`ScopeHandle`] is dropped.
    pub fn into_drain(self) {
        let FaultScope { shared, tx, mut rx } = self;
        drop(tx);
        tokio::spawn(async move {
            while let Some(error) = rx.recv().await {
                // Side effects only; the request is no longer writable.
                let _ = shared.on_error(error);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardBuilder;
    use crate::control::GracefulServer;
    use crate::shutdown::kill_timer;
    use std::time::Duration;

    fn test_guard() -> Arc<FaultGuard> {
        std::env::set_var(kill_timer::TEST_MODE_ENV, "1");
        GuardBuilder::new()
            .server(Arc::new(GracefulServer::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn spawned_error_escalates_with_error_message_body() {
        let mut scope = FaultScope::new(test_guard(), ScopeInfo::detached());
        let handle = scope.handle();
        handle.spawn(async {
            Err::<(), std::io::Error>(std::io::Error::other("ff is not defined"))
        });

        let response = scope.escalated().await;
        assert_eq!(response.status(), 500);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ff is not defined");
    }

    #[tokio::test]
    async fn spawned_panic_is_captured() {
        let mut scope = FaultScope::new(test_guard(), ScopeInfo::detached());
        let handle = scope.handle();
        handle.spawn(async {
            panic!("undefined symbol");
            #[allow(unreachable_code)]
            Ok::<(), std::io::Error>(())
        });

        let response = scope.escalated().await;
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"panic: undefined symbol");
    }

    #[tokio::test]
    async fn later_errors_are_suppressed() {
        let guard = test_guard();
        let mut scope = FaultScope::new(guard.clone(), ScopeInfo::detached());
        let handle = scope.handle();
        handle.report(std::io::Error::other("first"));
        handle.report(std::io::Error::other("second"));
        handle.report(std::io::Error::other("third"));

        let response = scope.escalated().await;
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"first");

        scope.into_drain();
        drop(handle);
        // Let the drain consume the suppressed occurrences.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(guard.flags().listener_closed());
    }

    #[tokio::test]
    async fn clean_task_leaves_scope_silent() {
        let mut scope = FaultScope::new(test_guard(), ScopeInfo::detached());
        let handle = scope.handle();
        let join = handle.spawn(async { Ok::<(), std::io::Error>(()) });
        join.await.unwrap();

        tokio::select! {
            _ = scope.escalated() => panic!("clean task must not escalate"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
        assert_eq!(scope.shared.counter.count(), 0);
    }
}
