//! # roomcast-core
//!
//! Connection registry, room directory and message routing for a room-based
//! WebSocket fan-out server.
//!
//! The crate is transport-agnostic. A transport accepts a client, wraps it in
//! a [`Connection`] (normally a [`ChannelConnection`]), hands it to
//! [`MessageRouter::accept`], and feeds every inbound text frame to
//! [`MessageRouter::handle_text`] in arrival order.
//!
//! ## Control messages
//!
//! | `type`       | extra field | effect                                   |
//! |--------------|-------------|------------------------------------------|
//! | `join`       | `room`      | move the sender into `room`              |
//! | `leave`      | `room`      | take the sender out of `room`            |
//! | `disconnect` |             | tear the sender down                     |
//! | `multicast`  | `room`      | send the rest of the frame to `room`     |
//! | `broadcast`  |             | send the rest of the frame to everyone   |
//!
//! `type` and `room` are never forwarded. The sender never receives its own
//! multicast or broadcast.

#![deny(unsafe_code)]

pub mod connection;
pub mod delivery;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod rooms;
pub mod router;

pub use connection::{ChannelConnection, Connection};
pub use delivery::{DeliveryEngine, DeliveryReport};
pub use envelope::{Envelope, Payload};
pub use errors::{ProtocolError, ReceiveError, SendError};
pub use events::{EventSink, NoopEventSink, TracingEventSink};
pub use ids::{ConnectionId, SessionId};
pub use lifecycle::LifecycleManager;
pub use registry::ConnectionRegistry;
pub use rooms::RoomDirectory;
pub use router::{DEFAULT_SEND_TIMEOUT, Dispatched, MessageRouter, RouterOptions};
