//! Observability helpers.
//!
//! Logging is plain `tracing` at the call sites; this module only carries
//! the metric recorders.

pub mod metrics;
