//! Server error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the listening surface.
///
/// Startup failures come back from `start`/`listen`; shutdown failures come
/// back from `stop`. Neither is reported to the event sink.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration cannot be served.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The accept loop failed after binding.
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    /// `start` or `listen` was called while already serving.
    #[error("server is already running")]
    AlreadyRunning,
    /// `start` or `listen` was called after `stop`.
    #[error("server has been stopped")]
    Stopped,
    /// `stop` was called on a server that is not serving.
    #[error("server is not running")]
    NotRunning,
    /// The listener did not drain in time.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

impl ServerError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::Bind { .. } => "bind",
            Self::Serve(_) => "serve",
            Self::AlreadyRunning => "already_running",
            Self::Stopped => "stopped",
            Self::NotRunning => "not_running",
            Self::ShutdownTimeout(_) => "shutdown_timeout",
        }
    }
}
