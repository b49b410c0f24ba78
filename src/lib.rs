//! Per-request fault containment for axum/tokio worker processes.
//!
//! When a request handler schedules asynchronous work and that work fails
//! after the framework's own synchronous error handling has already returned
//! control, the error arrives outside any request call stack. This crate
//! captures such errors, reports each one exactly once, answers the
//! triggering request with a safe fallback response, and then retires the
//! worker process in a bounded, best-effort way instead of leaving it
//! running in an unknown state.
//!
//! # Architecture Overview
//!
//! ```text
//!   Inbound request
//!        │
//!        ▼
//!   ┌──────────────────┐    ScopeHandle in     ┌────────────────┐
//!   │  fault scope     │──request extensions──▶│    handler     │
//!   │  middleware      │                       │  scope.spawn() │
//!   └───────┬──────────┘                       └───────┬────────┘
//!           │ races response vs first error            │ Err / panic
//!           ▼                                          ▼
//!   ┌──────────────────┐      first error      ┌────────────────┐
//!   │   FaultScope     │◀──────────────────────│  error funnel  │
//!   │  (ErrorCounter)  │                       └────────────────┘
//!   └───────┬──────────┘
//!           │ occurrence == 1
//!           ▼
//!   ┌──────────────────────────────────────────────┐
//!   │  shutdown coordinator                        │
//!   │   - fallback 500 + Connection: close         │
//!   │   - arm kill timer (forced exit after grace) │
//!   │   - close listener OR retire worker,         │
//!   │     each at most once per process lifetime   │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! Errors after the first on the same scope are logged and suppressed: the
//! process is already on an irreversible retirement path, and repeated
//! escalation would race the shutdown sequence.

// Core subsystems
pub mod config;
pub mod control;
pub mod error;
pub mod guard;
pub mod scope;
pub mod shutdown;

// Cross-cutting concerns
pub mod observability;

pub use config::{GuardBuilder, GuardSettings};
pub use control::{GracefulServer, ListenerControl, SupervisedWorker, WorkerControl};
pub use error::{CapturedError, ConfigError, ControlError};
pub use guard::FaultGuard;
pub use scope::middleware::fault_scope_middleware;
pub use scope::ScopeHandle;
pub use shutdown::coordinator::EscalationPolicy;
