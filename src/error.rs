//! Error types surfaced by the redirection controller and its helpers.
//!
//! Capacity exhaustion on the emit path is never reported through these
//! types; it is visible only as a short accepted count or a counter bump.

use std::io;

use thiserror::Error;

/// Lifecycle and installation failures reported by [`SocketLog`](crate::SocketLog).
#[derive(Debug, Error)]
pub enum RedirectError {
    /// The context has not been initialised with [`SocketLog::init`](crate::SocketLog::init).
    #[error("socket log is not initialised")]
    NotInitialised,
    /// The deferred echo queue does not exist yet; `redirect_start` creates it.
    #[error("deferred echo queue has not been created; call redirect_start first")]
    QueueMissing,
    /// The configured echo mode does not use the deferred echo task.
    #[error("deferred echo is not enabled in the redirect configuration")]
    DeferredDisabled,
    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    /// Another global `log` implementation is already installed.
    #[error("a global logger is already installed")]
    LoggerAlreadySet,
    /// The socket driver was handed an invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Reasons a message could not be handed to the deferred echo task.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeferredError {
    /// The fixed-size message buffer could not be obtained.
    #[error("deferred echo buffer allocation failed")]
    AllocationFailed,
    /// The bounded queue is full.
    #[error("deferred echo queue is full")]
    QueueFull,
    /// No queue exists to accept the message.
    #[error("deferred echo queue has not been created")]
    QueueMissing,
    /// The consumer side of the queue has gone away.
    #[error("deferred echo queue is closed")]
    Closed,
}

/// Errors raised while building or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid user supplied configuration.
    #[error("invalid socket log configuration: {0}")]
    InvalidConfig(String),
    /// The configuration file could not be read.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The configuration file is not valid INI.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
