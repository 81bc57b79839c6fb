//! # roomcast-server
//!
//! Axum listening surface for the roomcast router.
//!
//! - `GET {path}` (default `/ws`): WebSocket upgrade. The session id comes
//!   from the handshake `Cookie` header; a handshake without one is answered
//!   with `400 Bad Request`.
//! - `GET /health`: liveness and table sizes.
//! - `GET /metrics`: Prometheus text, when a recorder handle is attached.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;
mod socket;

pub use config::{
    ConfigFn, ServerConfig, with_host, with_path, with_port, with_send_queue_capacity,
    with_send_timeout, with_session_cookie, with_shutdown_timeout,
};
pub use errors::ServerError;
pub use server::RoomcastServer;
pub use session::HandshakeError;
