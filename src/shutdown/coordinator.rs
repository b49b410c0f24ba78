//! Default escalation policy.
//!
//! Converts the first captured error on a scope into the retirement
//! sequence: answer the request, arm the kill timer, then stop new inbound
//! work by closing the listener (standalone) or retiring the worker
//! (supervised). Close and retire failures are logged and swallowed; the
//! idempotency flags are already set, so nothing retries them.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::CapturedError;
use crate::guard::FaultGuard;
use crate::observability::metrics;
use crate::scope::ScopeInfo;
use crate::shutdown::kill_timer;

/// The downstream error-reporting continuation: builds the fallback
/// response the triggering request is answered with.
pub type Downstream = dyn Fn(&CapturedError) -> Response + Send + Sync;

/// Escalation policy invoked on the first captured error of a scope.
///
/// The default is [`DefaultEscalation`]; a caller-supplied policy replaces
/// it entirely. The guard's idempotency flags stay reachable through
/// [`FaultGuard::flags`] for custom policies that want them, but nothing
/// forces a custom policy to use them.
pub trait EscalationPolicy: Send + Sync {
    /// Handle the first captured error for `scope` and produce the response
    /// for the triggering request.
    ///
    /// When the error arrives after the request has already been answered
    /// the returned response is discarded; side effects still count.
    fn escalate(
        &self,
        scope: &ScopeInfo,
        error: &CapturedError,
        downstream: &Downstream,
        guard: &FaultGuard,
    ) -> Response;
}

/// Build the fallback response: status 500, body equal to the error's
/// message.
pub fn error_response(error: &CapturedError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
}

/// The built-in escalation sequence.
pub struct DefaultEscalation;

impl EscalationPolicy for DefaultEscalation {
    fn escalate(
        &self,
        scope: &ScopeInfo,
        error: &CapturedError,
        downstream: &Downstream,
        guard: &FaultGuard,
    ) -> Response {
        // Answer the triggering request and refuse connection reuse, so the
        // transport does not pipeline further requests onto this channel.
        let mut response = downstream(error);
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));

        // Bound the retirement: whatever happens below, the process is gone
        // once the grace period elapses.
        guard.flags().note_kill_timer_armed();
        kill_timer::arm(guard.config().kill_timeout(), guard.config().exit_code());

        match guard.config().worker() {
            // Supervised: retire the worker and let the supervisor's own
            // bookkeeping stop the listeners. Closing them here as well
            // would invite duplicate-close errors.
            Some(worker) => {
                if guard.flags().begin_worker_retire() {
                    metrics::record_escalation("worker_retire");
                    match worker.disconnect() {
                        Ok(()) => tracing::warn!(
                            scope = %scope.id,
                            method = %scope.method,
                            path = %scope.path,
                            pid = std::process::id(),
                            "worker retirement signaled"
                        ),
                        Err(control_err) => tracing::error!(
                            scope = %scope.id,
                            error = %control_err,
                            "failed to retire worker"
                        ),
                    }
                }
            }
            // Standalone: stop the listener ourselves.
            None => {
                if guard.flags().begin_listener_close() {
                    metrics::record_escalation("listener_close");
                    match guard.config().server().close() {
                        Ok(()) => tracing::warn!(
                            scope = %scope.id,
                            method = %scope.method,
                            path = %scope.path,
                            pid = std::process::id(),
                            "listener close requested"
                        ),
                        Err(control_err) => tracing::error!(
                            scope = %scope.id,
                            error = %control_err,
                            "failed to close listener"
                        ),
                    }
                }
            }
        }

        response
    }
}
