//! The process-wide guard: configuration plus shutdown state.

use std::sync::Arc;

use axum::response::Response;

use crate::config::GuardConfig;
use crate::error::CapturedError;
use crate::scope::{FaultScope, ScopeHandle, ScopeInfo};
use crate::shutdown::coordinator::{error_response, DefaultEscalation, Downstream, EscalationPolicy};
use crate::shutdown::ShutdownFlags;

/// One guard per worker process.
///
/// Owns the immutable [`GuardConfig`] and the process-wide
/// [`ShutdownFlags`]; every fault scope reaches both through a shared
/// `Arc<FaultGuard>`. Built with [`GuardBuilder`](crate::config::GuardBuilder).
pub struct FaultGuard {
    config: GuardConfig,
    flags: ShutdownFlags,
}

impl std::fmt::Debug for FaultGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultGuard")
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl FaultGuard {
    pub(crate) fn new(config: GuardConfig) -> Arc<Self> {
        let guard = Arc::new(Self {
            config,
            flags: ShutdownFlags::new(),
        });
        guard.spawn_completion_monitors();
        guard
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// The process-wide idempotency flags.
    ///
    /// Custom escalation policies may consult or claim them; the default
    /// policy always does.
    pub fn flags(&self) -> &ShutdownFlags {
        &self.flags
    }

    /// A scope not tied to any request: a pure error funnel.
    ///
    /// Errors reported through the returned handle follow the same
    /// first-escalates/rest-suppressed rules; there is no response to
    /// deliver.
    pub fn detached_scope(self: &Arc<Self>) -> ScopeHandle {
        let scope = FaultScope::new(self.clone(), ScopeInfo::detached());
        let handle = scope.handle();
        scope.into_drain();
        handle
    }

    /// Run the configured escalation policy for a scope's first error.
    pub(crate) fn escalate(&self, scope: &ScopeInfo, error: &CapturedError) -> Response {
        let downstream: &Downstream = &error_response;
        match self.config.on_error() {
            Some(policy) => policy.escalate(scope, error, downstream, self),
            None => DefaultEscalation.escalate(scope, error, downstream, self),
        }
    }

    /// Watch the collaborators' completion events so a close or retirement
    /// that finishes outside the coordinator's own call still flips the
    /// corresponding flag.
    fn spawn_completion_monitors(self: &Arc<Self>) {
        // Without a runtime (plain construction in unit tests) the events
        // go unmonitored; the claim flags alone still hold the invariants.
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no tokio runtime at guard construction, completion events unmonitored");
            return;
        };

        let mut closed = self.config.server().closed();
        let guard = self.clone();
        rt.spawn(async move {
            while closed.changed().await.is_ok() {
                if *closed.borrow() {
                    guard.flags.note_listener_closed();
                    tracing::debug!("listener close completion observed");
                    break;
                }
            }
        });

        if let Some(worker) = self.config.worker() {
            let mut disconnected = worker.disconnected();
            let guard = self.clone();
            rt.spawn(async move {
                while disconnected.changed().await.is_ok() {
                    if *disconnected.borrow() {
                        guard.flags.note_worker_retired();
                        tracing::debug!("worker retirement completion observed");
                        break;
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardBuilder;
    use crate::control::{GracefulServer, SupervisedWorker, WorkerControl};
    use crate::shutdown::kill_timer;
    use std::time::Duration;

    #[tokio::test]
    async fn external_listener_close_flips_the_flag() {
        let server = Arc::new(GracefulServer::new());
        let guard = GuardBuilder::new().server(server.clone()).build().unwrap();
        assert!(!guard.flags().listener_closed());

        server.mark_closed();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(guard.flags().listener_closed());
    }

    #[tokio::test]
    async fn external_worker_retirement_flips_the_flag() {
        let server = Arc::new(GracefulServer::new());
        let (worker, _retire_rx) = SupervisedWorker::new();
        let guard = GuardBuilder::new()
            .server(server)
            .worker(worker.clone() as Arc<dyn WorkerControl>)
            .build()
            .unwrap();

        worker.mark_disconnected();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(guard.flags().worker_retired());
    }

    #[tokio::test]
    async fn detached_scope_acts_as_error_funnel() {
        std::env::set_var(kill_timer::TEST_MODE_ENV, "1");
        let guard = GuardBuilder::new()
            .server(Arc::new(GracefulServer::new()))
            .build()
            .unwrap();

        let handle = guard.detached_scope();
        handle.report(std::io::Error::other("background job failed"));
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(guard.flags().kill_timer_armed());
        assert!(guard.flags().listener_closed());
    }
}
