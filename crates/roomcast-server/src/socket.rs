//! Per-connection task: from upgrade through teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use roomcast_core::metrics::WS_CONNECTION_DURATION_SECONDS;
use roomcast_core::{
    ChannelConnection, Connection, MessageRouter, Payload, ProtocolError, ReceiveError, SessionId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What a connection task needs from the server.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub router: MessageRouter,
    pub shutdown: CancellationToken,
    pub queue_capacity: usize,
    pub ping_interval: Duration,
}

/// Run one accepted WebSocket connection.
///
/// 1. Registers a [`ChannelConnection`] with the router
/// 2. Spawns the writer, which serializes queued payloads and sends pings
/// 3. Feeds inbound frames to the router in arrival order
/// 4. Tears the connection down when the client leaves, a read fails, the
///    connection is disconnected or evicted, or the server shuts down
#[instrument(skip_all, fields(session_id = %session_id))]
pub(crate) async fn run_connection(socket: WebSocket, session_id: SessionId, ctx: ConnectionContext) {
    let (ws_tx, mut ws_rx) = socket.split();

    let (channel, outbound_rx) = ChannelConnection::new(session_id, ctx.queue_capacity);
    let closed = channel.close_token();
    let channel = Arc::new(channel);
    let connection: Arc<dyn Connection> = channel.clone();
    ctx.router.accept(Arc::clone(&connection));

    let writer = tokio::spawn(write_loop(
        ws_tx,
        outbound_rx,
        closed.clone(),
        ctx.ping_interval,
    ));

    loop {
        // Stop signals win over frames the client already pipelined.
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => {
                debug!(conn_id = %connection.id(), "connection closed");
                break;
            }
            () = ctx.shutdown.cancelled() => {
                debug!(conn_id = %connection.id(), "server shutting down");
                break;
            }
            frame = ws_rx.next() => frame,
        };

        let message = match frame {
            None => {
                debug!(conn_id = %connection.id(), "stream ended");
                break;
            }
            Some(Err(error)) => {
                ctx.router
                    .receive_failed(&connection, &ReceiveError::Transport(error.to_string()));
                break;
            }
            Some(Ok(message)) => message,
        };

        match message {
            Message::Text(text) => {
                let _ = ctx.router.handle_text(&connection, text.as_str()).await;
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = ctx.router.handle_text(&connection, text).await;
                }
                Err(_) => {
                    ctx.router
                        .report_protocol_error(connection.as_ref(), &ProtocolError::NotUtf8);
                }
            },
            Message::Close(_) => {
                info!(conn_id = %connection.id(), "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let _ = ctx.router.disconnect(&connection);
    if let Err(error) = writer.await {
        warn!(conn_id = %connection.id(), error = %error, "writer task failed");
    }
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(channel.age().as_secs_f64());
    info!(conn_id = %connection.id(), "client disconnected");
}

/// Drain the outbound queue into the socket until the connection closes.
///
/// A failed socket write closes the connection so that pending and future
/// sends to it fail and it gets evicted.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Arc<Payload>>,
    closed: CancellationToken,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = closed.cancelled() => break,
            payload = outbound_rx.recv() => {
                let Some(payload) = payload else { break };
                let text = match serde_json::to_string(payload.as_ref()) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(error = %error, "failed to serialize payload, dropping");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    closed.cancel();
    let _ = ws_tx.send(Message::Close(None)).await;
    let _ = ws_tx.close().await;
}
