//! Metric recorders.
//!
//! # Metrics
//! - `guard_errors_total` (counter): errors delivered to fault scopes
//! - `guard_errors_suppressed_total` (counter): occurrences ≥ 2 on a scope
//! - `guard_escalations_total` (counter): escalations by mode
//!   (`listener_close` | `worker_retire`)
//!
//! Exposition is the host application's concern; these recorders publish to
//! whatever global recorder it installs.

use metrics::counter;

/// Record an error delivered to a fault scope.
pub fn record_captured_error(occurrence: u32) {
    counter!("guard_errors_total").increment(1);
    if occurrence > 1 {
        counter!("guard_errors_suppressed_total").increment(1);
    }
}

/// Record an escalation and which shutdown mode it took.
pub fn record_escalation(mode: &'static str) {
    counter!("guard_escalations_total", "mode" => mode).increment(1);
}
