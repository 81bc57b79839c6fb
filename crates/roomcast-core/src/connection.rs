//! Connection handles.
//!
//! The core never touches sockets. It talks to connections through the
//! [`Connection`] trait; [`ChannelConnection`] is the implementation used by
//! the server, backed by a bounded queue drained by the transport's writer.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::envelope::Payload;
use crate::errors::SendError;
use crate::ids::{ConnectionId, SessionId};

/// A live bidirectional message channel to one client.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Server-generated identifier, unique per connection.
    fn id(&self) -> &ConnectionId;

    /// Session this connection was accepted under.
    fn session_id(&self) -> &SessionId;

    /// Deliver a payload. Resolves once the transport has accepted it.
    async fn send(&self, payload: Arc<Payload>) -> Result<(), SendError>;

    /// Release the connection. Idempotent.
    fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Resolves once the connection is closed.
    async fn closed(&self);
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", self.id())
            .field("session_id", self.session_id())
            .finish_non_exhaustive()
    }
}

/// Queue-backed connection handed to the router by the transport layer.
pub struct ChannelConnection {
    id: ConnectionId,
    session_id: SessionId,
    /// Outbound queue drained by the transport's writer task.
    tx: mpsc::Sender<Arc<Payload>>,
    /// Cancelled on close; doubles as the per-connection stop signal.
    closed: CancellationToken,
    /// When this connection was accepted.
    connected_at: Instant,
}

impl ChannelConnection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(session_id: SessionId, capacity: usize) -> (Self, mpsc::Receiver<Arc<Payload>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            session_id,
            tx,
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
        };
        (conn, rx)
    }

    /// A token that is cancelled when this connection closes.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn send(&self, payload: Arc<Payload>) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        tokio::select! {
            result = self.tx.send(payload) => result.map_err(|_| SendError::Closed),
            () = self.closed.cancelled() => Err(SendError::Closed),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn closed(&self) {
        self.closed.cancelled().await;
    }
}
