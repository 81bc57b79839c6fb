//! Settings schema.
//!
//! Field names serialize as camelCase so `~/.roomcast/settings.json` reads
//! like:
//!
//! ```json
//! {
//!   "server": { "port": 4000, "path": "/chat", "sessionCookie": "sid" },
//!   "logging": { "level": "debug", "json": true }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomcastSettings {
    /// Settings schema version.
    pub version: String,
    /// Listening surface and connection tuning.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for RoomcastSettings {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RoomcastSettings {
    /// Reject values that would leave the server unable to start.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if !server.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.path must start with '/', got {:?}",
                server.path
            )));
        }
        if server.send_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendTimeoutMs must be positive".to_string(),
            ));
        }
        if server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be positive".to_string(),
            ));
        }
        if server.session_cookie.as_deref().is_some_and(str::is_empty) {
            return Err(SettingsError::InvalidValue(
                "server.sessionCookie must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listening surface and per-connection tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// WebSocket endpoint path.
    pub path: String,
    /// Cookie carrying the session id. When unset, the first cookie is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    /// Bound on a single recipient send, in milliseconds.
    pub send_timeout_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Interval between server pings, in seconds.
    pub ping_interval_secs: u64,
    /// How long `stop` waits for the listener to drain, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            path: "/ws".to_string(),
            session_cookie: None,
            send_timeout_ms: 5_000,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            ping_interval_secs: 30,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Log output configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
