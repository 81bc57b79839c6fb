//! Server configuration.
//!
//! A server is configured by applying an ordered list of [`ConfigFn`]
//! mutators over [`ServerConfig::default()`]. Later mutators win.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// Configuration mutator applied before the server starts.
pub type ConfigFn = Box<dyn FnOnce(&mut ServerConfig) + Send>;

/// Configuration for the roomcast server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `3000`; `0` auto-assigns).
    pub port: u16,
    /// WebSocket endpoint path (default `"/ws"`).
    pub path: String,
    /// Cookie carrying the session id. `None` uses the first cookie pair.
    pub session_cookie: Option<String>,
    /// Bound on a single recipient send, in milliseconds.
    pub send_timeout_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server pings, in seconds.
    pub ping_interval_secs: u64,
    /// How long `stop` waits for the listener to drain, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            path: "/ws".into(),
            session_cookie: None,
            send_timeout_ms: 5_000,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            ping_interval_secs: 30,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Apply `configs` in order over the defaults.
    pub fn apply(configs: impl IntoIterator<Item = ConfigFn>) -> Self {
        let mut config = Self::default();
        for f in configs {
            f(&mut config);
        }
        config
    }

    /// Reject configurations that cannot be served.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !self.path.starts_with('/') {
            return Err(ServerError::InvalidConfig(format!(
                "path must start with '/', got {:?}",
                self.path
            )));
        }
        if matches!(self.path.as_str(), "/health" | "/metrics") {
            return Err(ServerError::InvalidConfig(format!(
                "path {:?} is reserved",
                self.path
            )));
        }
        if self.send_timeout_ms == 0 {
            return Err(ServerError::InvalidConfig(
                "send timeout must be positive".into(),
            ));
        }
        if self.send_queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "send queue capacity must be positive".into(),
            ));
        }
        if self.ping_interval_secs == 0 {
            return Err(ServerError::InvalidConfig(
                "ping interval must be positive".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` as passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-recipient send bound.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Server ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Bound on `stop`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Set the bind host.
pub fn with_host(host: impl Into<String>) -> ConfigFn {
    let host = host.into();
    Box::new(move |c| c.host = host)
}

/// Set the bind port.
pub fn with_port(port: u16) -> ConfigFn {
    Box::new(move |c| c.port = port)
}

/// Set the WebSocket endpoint path.
pub fn with_path(path: impl Into<String>) -> ConfigFn {
    let path = path.into();
    Box::new(move |c| c.path = path)
}

/// Read the session id from the named cookie.
pub fn with_session_cookie(name: impl Into<String>) -> ConfigFn {
    let name = name.into();
    Box::new(move |c| c.session_cookie = Some(name))
}

/// Bound each recipient send.
pub fn with_send_timeout(timeout: Duration) -> ConfigFn {
    let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    Box::new(move |c| c.send_timeout_ms = ms)
}

/// Set the per-connection outbound queue depth.
pub fn with_send_queue_capacity(capacity: usize) -> ConfigFn {
    Box::new(move |c| c.send_queue_capacity = capacity)
}

/// Set the bound on `stop`.
pub fn with_shutdown_timeout(timeout: Duration) -> ConfigFn {
    let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    Box::new(move |c| c.shutdown_timeout_ms = ms)
}
