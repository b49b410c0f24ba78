//! Shutdown coordination subsystem.
//!
//! # Data Flow
//! ```text
//! First captured error on a scope
//!     → coordinator.rs (default escalation policy)
//!     → fallback response + Connection: close
//!     → kill_timer.rs (forced exit after the grace period)
//!     → listener close OR worker retirement, gated by flags below
//! ```
//!
//! # Design Decisions
//! - Close and retire each run at most once per process lifetime
//! - The attempt, not the outcome, flips the flag: a failed close is not
//!   retried, a later escalation from another scope skips it
//! - Flags are atomics, not locks; a single-writer-wins race is enough
//!   because the guarded actions are idempotent by flag

use std::sync::atomic::{AtomicBool, Ordering};

pub mod coordinator;
pub mod kill_timer;

/// Process-wide idempotency flags for the shutdown actions.
///
/// Initialized false/false at worker startup; each flag flips to true
/// permanently the first time its action is attempted, regardless of how
/// many scopes escalate concurrently.
#[derive(Debug, Default)]
pub struct ShutdownFlags {
    listener_closed: AtomicBool,
    worker_retired: AtomicBool,
    kill_timer_armed: AtomicBool,
}

impl ShutdownFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the listener-close action.
    ///
    /// Returns `true` for exactly one caller per process lifetime; that
    /// caller must attempt the close. Everyone else skips it.
    pub fn begin_listener_close(&self) -> bool {
        !self.listener_closed.swap(true, Ordering::SeqCst)
    }

    /// Claim the worker-retire action. Same discipline as
    /// [`begin_listener_close`](Self::begin_listener_close).
    pub fn begin_worker_retire(&self) -> bool {
        !self.worker_retired.swap(true, Ordering::SeqCst)
    }

    /// Record a listener close observed outside the coordinator's own call.
    pub fn note_listener_closed(&self) {
        self.listener_closed.store(true, Ordering::SeqCst);
    }

    /// Record a worker retirement observed outside the coordinator's call.
    pub fn note_worker_retired(&self) {
        self.worker_retired.store(true, Ordering::SeqCst);
    }

    /// Record that a kill timer has been armed.
    pub fn note_kill_timer_armed(&self) {
        self.kill_timer_armed.store(true, Ordering::SeqCst);
    }

    pub fn listener_closed(&self) -> bool {
        self.listener_closed.load(Ordering::SeqCst)
    }

    pub fn worker_retired(&self) -> bool {
        self.worker_retired.load(Ordering::SeqCst)
    }

    pub fn kill_timer_armed(&self) -> bool {
        self.kill_timer_armed.load(Ordering::SeqCst)
    }
}
