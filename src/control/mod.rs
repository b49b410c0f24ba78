//! Handles to the listening endpoint and the worker-supervision context.
//!
//! # Responsibilities
//! - Define the collaborator traits the shutdown coordinator acts through
//! - Provide tokio-native default implementations for both
//! - Expose completion events so externally observed close/disconnect keeps
//!   the coordinator's idempotency flags consistent
//!
//! # Design Decisions
//! - Closing and retiring are fire-and-forget requests; completion is
//!   reported separately through a `watch` channel
//! - The guard never owns the listener or the supervisor link, only handles

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::error::ControlError;

/// Handle to the listening endpoint.
///
/// `close` asks the endpoint to stop accepting new work; `closed` yields a
/// receiver that flips to `true` once the endpoint has fully shut down,
/// whether or not the shutdown was requested through this handle.
pub trait ListenerControl: Send + Sync {
    /// Request that the endpoint stop accepting new connections.
    fn close(&self) -> Result<(), ControlError>;

    /// Completion event for the close.
    fn closed(&self) -> watch::Receiver<bool>;
}

/// Handle to the worker's own identity under a process supervisor.
///
/// Present only when the process runs as a supervised worker. Retiring the
/// worker stops new work from arriving and lets the supervisor provision a
/// replacement.
pub trait WorkerControl: Send + Sync {
    /// Signal retirement to the supervisor.
    fn disconnect(&self) -> Result<(), ControlError>;

    /// Completion event for the retirement.
    fn disconnected(&self) -> watch::Receiver<bool>;
}

/// Default [`ListenerControl`] built on a broadcast shutdown channel.
///
/// Pair it with `axum::serve`:
///
/// ```ignore
/// let server = Arc::new(GracefulServer::new());
/// axum::serve(listener, app)
///     .with_graceful_shutdown(server.shutdown_signal())
///     .await?;
/// server.mark_closed();
/// ```
pub struct GracefulServer {
    trigger: broadcast::Sender<()>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl GracefulServer {
    pub fn new() -> Self {
        let (trigger, _) = broadcast::channel(1);
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            trigger,
            closed_tx,
            closed_rx,
        }
    }

    /// Future suitable for `axum::serve(..).with_graceful_shutdown(..)`.
    ///
    /// Resolves when [`ListenerControl::close`] is called on this handle.
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.trigger.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Record that the serve loop has finished.
    ///
    /// Call after the serve future returns so observers of [`closed`]
    /// see the completion.
    ///
    /// [`closed`]: ListenerControl::closed
    pub fn mark_closed(&self) {
        self.closed_tx.send_replace(true);
    }
}

impl Default for GracefulServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerControl for GracefulServer {
    fn close(&self) -> Result<(), ControlError> {
        if *self.closed_rx.borrow() {
            return Err(ControlError::AlreadyClosed);
        }
        self.trigger
            .send(())
            .map(|_| ())
            .map_err(|_| ControlError::Channel("no serve loop subscribed".to_string()))
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }
}

/// Retirement request delivered to the supervisor.
#[derive(Debug)]
pub struct RetireRequest;

/// Default [`WorkerControl`] that reports retirement over a channel.
///
/// The supervisor end holds the receiver; on [`WorkerControl::disconnect`]
/// it receives a [`RetireRequest`] and is expected to stop routing work to
/// this worker and spawn a replacement.
pub struct SupervisedWorker {
    retire_tx: mpsc::UnboundedSender<RetireRequest>,
    disconnected_tx: watch::Sender<bool>,
    disconnected_rx: watch::Receiver<bool>,
}

impl SupervisedWorker {
    /// Create the worker handle and the supervisor's receiving end.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RetireRequest>) {
        let (retire_tx, retire_rx) = mpsc::unbounded_channel();
        let (disconnected_tx, disconnected_rx) = watch::channel(false);
        (
            Arc::new(Self {
                retire_tx,
                disconnected_tx,
                disconnected_rx,
            }),
            retire_rx,
        )
    }

    /// Record that the supervisor has acknowledged the retirement.
    pub fn mark_disconnected(&self) {
        self.disconnected_tx.send_replace(true);
    }
}

impl WorkerControl for SupervisedWorker {
    fn disconnect(&self) -> Result<(), ControlError> {
        if *self.disconnected_rx.borrow() {
            return Err(ControlError::AlreadyDisconnected);
        }
        self.retire_tx
            .send(RetireRequest)
            .map_err(|_| ControlError::Channel("supervisor receiver dropped".to_string()))
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn graceful_server_close_resolves_shutdown_signal() {
        let server = GracefulServer::new();
        let signal = server.shutdown_signal();
        server.close().expect("close should reach the subscriber");
        signal.await;
    }

    #[tokio::test]
    async fn graceful_server_close_fails_without_subscriber() {
        let server = GracefulServer::new();
        assert!(matches!(server.close(), Err(ControlError::Channel(_))));
    }

    #[tokio::test]
    async fn graceful_server_rejects_close_after_completion() {
        let server = GracefulServer::new();
        server.mark_closed();
        assert!(matches!(server.close(), Err(ControlError::AlreadyClosed)));
        assert!(*server.closed().borrow());
    }

    #[tokio::test]
    async fn supervised_worker_delivers_retire_request() {
        let (worker, mut retire_rx) = SupervisedWorker::new();
        worker.disconnect().expect("supervisor end is alive");
        assert!(retire_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn supervised_worker_rejects_disconnect_after_completion() {
        let (worker, _retire_rx) = SupervisedWorker::new();
        worker.mark_disconnected();
        assert!(matches!(
            worker.disconnect(),
            Err(ControlError::AlreadyDisconnected)
        ));
    }
}
