//! Guard configuration.
//!
//! # Data Flow
//! ```text
//! GuardBuilder (handles, overrides)
//!     + GuardSettings (optional, TOML-loadable tunables)
//!     → build() validates (server handle required)
//!     → GuardConfig (immutable)
//!     → shared via Arc<FaultGuard> with every scope
//! ```
//!
//! # Design Decisions
//! - Everything except the server handle has a default and never fails
//! - Validation happens once, at construction, never at request time
//! - Config is immutable after build; retuning requires a new guard

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::control::{ListenerControl, WorkerControl};
use crate::error::ConfigError;
use crate::guard::FaultGuard;
use crate::shutdown::coordinator::EscalationPolicy;

/// Grace period given to in-flight work before forced exit.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(30);

/// Process exit code used on forced termination.
pub const DEFAULT_EXIT_CODE: i32 = 1;

/// Immutable guard configuration, produced by [`GuardBuilder::build`].
pub struct GuardConfig {
    server: Arc<dyn ListenerControl>,
    worker: Option<Arc<dyn WorkerControl>>,
    kill_timeout: Duration,
    exit_code: i32,
    on_error: Option<Arc<dyn EscalationPolicy>>,
}

impl GuardConfig {
    /// Handle to the listening endpoint.
    pub fn server(&self) -> &Arc<dyn ListenerControl> {
        &self.server
    }

    /// Worker-supervision handle; `Some` means supervision is active.
    pub fn worker(&self) -> Option<&Arc<dyn WorkerControl>> {
        self.worker.as_ref()
    }

    /// Grace period before the kill timer forces exit.
    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    /// Exit code used when the kill timer fires.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Escalation-policy override, if any.
    pub fn on_error(&self) -> Option<&Arc<dyn EscalationPolicy>> {
        self.on_error.as_ref()
    }
}

/// File-loadable tunables.
///
/// Only the numeric knobs live here; handles and policy overrides are code,
/// not configuration, and go through [`GuardBuilder`] directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Grace period in seconds before forced exit.
    pub kill_timeout_secs: u64,

    /// Process exit code on forced termination.
    pub exit_code: i32,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            kill_timeout_secs: DEFAULT_KILL_TIMEOUT.as_secs(),
            exit_code: DEFAULT_EXIT_CODE,
        }
    }
}

impl GuardSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Builder for a [`FaultGuard`].
///
/// ```ignore
/// let guard = GuardBuilder::new()
///     .server(server.clone())
///     .kill_timeout(Duration::from_secs(10))
///     .build()?;
/// ```
#[derive(Default)]
pub struct GuardBuilder {
    server: Option<Arc<dyn ListenerControl>>,
    worker: Option<Arc<dyn WorkerControl>>,
    kill_timeout: Option<Duration>,
    exit_code: Option<i32>,
    on_error: Option<Arc<dyn EscalationPolicy>>,
}

impl GuardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the listening endpoint. Required.
    pub fn server(mut self, server: Arc<dyn ListenerControl>) -> Self {
        self.server = Some(server);
        self
    }

    /// Worker-supervision handle. Supplying one switches escalation from
    /// closing the listener to retiring the worker.
    pub fn worker(mut self, worker: Arc<dyn WorkerControl>) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Grace period before forced exit. Default 30 seconds.
    pub fn kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = Some(timeout);
        self
    }

    /// Exit code on forced termination. Default 1.
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Replace the entire escalation policy.
    ///
    /// The default close/retire sequence does not run when an override is
    /// set; the override is responsible for everything it wants done.
    pub fn on_error(mut self, policy: Arc<dyn EscalationPolicy>) -> Self {
        self.on_error = Some(policy);
        self
    }

    /// Apply file-loaded tunables on top of whatever is already set.
    pub fn settings(mut self, settings: &GuardSettings) -> Self {
        self.kill_timeout = Some(Duration::from_secs(settings.kill_timeout_secs));
        self.exit_code = Some(settings.exit_code);
        self
    }

    /// Validate and assemble the guard.
    ///
    /// Fails with [`ConfigError::MissingServer`] if no listener handle was
    /// supplied; every other field defaults.
    pub fn build(self) -> Result<Arc<FaultGuard>, ConfigError> {
        let server = self.server.ok_or(ConfigError::MissingServer)?;
        let config = GuardConfig {
            server,
            worker: self.worker,
            kill_timeout: self.kill_timeout.unwrap_or(DEFAULT_KILL_TIMEOUT),
            exit_code: self.exit_code.unwrap_or(DEFAULT_EXIT_CODE),
            on_error: self.on_error,
        };
        Ok(FaultGuard::new(config))
    }
}
