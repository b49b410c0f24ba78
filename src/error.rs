//! Error types for construction, capture, and shutdown control.

use thiserror::Error;

/// Error raised while building or loading the guard configuration.
///
/// Construction errors are fatal at setup time, never at request time: a
/// guard that builds successfully will not fail requests over configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No listening-endpoint handle was supplied to the builder.
    #[error("server handle required: supply a ListenerControl via GuardBuilder::server")]
    MissingServer,

    /// Settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed.
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// An error captured inside a fault scope's extent.
///
/// Every failure surfacing from work spawned through a [`ScopeHandle`] is
/// wrapped in one of these before being delivered to the scope's error
/// callback. The `Display` output becomes the body of the fallback response.
///
/// [`ScopeHandle`]: crate::scope::ScopeHandle
#[derive(Debug, Error)]
pub enum CapturedError {
    /// A spawned task returned an error.
    #[error("{0}")]
    Task(Box<dyn std::error::Error + Send + Sync>),

    /// A spawned task panicked; the payload is rendered to a message.
    #[error("panic: {0}")]
    Panic(String),
}

impl CapturedError {
    /// Wrap a task failure.
    pub fn task<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CapturedError::Task(error.into())
    }

    /// Render a panic payload into a captured error.
    ///
    /// Panic payloads are almost always `&str` or `String`; anything else is
    /// reported as opaque.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CapturedError::Panic(message)
    }

    /// True when this error came from a panic rather than an `Err` return.
    pub fn is_panic(&self) -> bool {
        matches!(self, CapturedError::Panic(_))
    }
}

/// Error raised by a listener-close or worker-retire attempt.
///
/// These are terminal locally: the shutdown coordinator logs them and moves
/// on, because by the time they occur the process is already being retired.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The listening endpoint is already closed.
    #[error("listener already closed")]
    AlreadyClosed,

    /// The worker has already been disconnected from its supervisor.
    #[error("worker already disconnected")]
    AlreadyDisconnected,

    /// The control channel to the serve loop or supervisor is gone.
    #[error("control channel unavailable: {0}")]
    Channel(String),
}
