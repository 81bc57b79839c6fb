//! `RoomcastServer`: axum HTTP + WebSocket listening surface.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use roomcast_core::{EventSink, MessageRouter, RouterOptions};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{ConfigFn, ServerConfig};
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::session::session_id_from_headers;
use crate::shutdown::ShutdownCoordinator;
use crate::socket::{ConnectionContext, run_connection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Message router shared by every connection.
    pub router: MessageRouter,
    /// Effective configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server was created.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if attached.
    pub metrics: Option<PrometheusHandle>,
}

/// A roomcast server instance. Each instance owns its own tables.
pub struct RoomcastServer {
    config: Arc<ServerConfig>,
    router: MessageRouter,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    state: Mutex<RunState>,
}

impl std::fmt::Debug for RoomcastServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomcastServer")
            .field("config", &self.config)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

impl RoomcastServer {
    /// Create a server from `configs` applied over the defaults.
    pub fn new(events: Arc<dyn EventSink>, configs: Vec<ConfigFn>) -> Result<Self, ServerError> {
        let config = ServerConfig::apply(configs);
        config.validate()?;
        let router = MessageRouter::new(
            events,
            RouterOptions {
                send_timeout: config.send_timeout(),
            },
        );
        Ok(Self {
            config: Arc::new(config),
            router,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
            state: Mutex::new(RunState::Idle),
        })
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn app(&self) -> Router {
        let state = AppState {
            router: self.router.clone(),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let mut app = Router::new()
            .route(&self.config.path, get(ws_handler))
            .route("/health", get(health_handler));
        if self.metrics.is_some() {
            app = app.route("/metrics", get(metrics_handler));
        }
        app.with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind and serve until stopped.
    ///
    /// Returns `Ok(())` after a graceful [`stop`](Self::stop), or the bind or
    /// accept-loop failure that ended serving.
    pub async fn start(&self) -> Result<(), ServerError> {
        let (_, handle) = self.listen().await?;
        match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(ServerError::Serve(std::io::Error::other(join_error))),
        }
    }

    /// Bind and spawn the accept loop, returning the bound address.
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), ServerError> {
        self.begin()?;

        let addr = self.config.bind_addr();
        let bound = TcpListener::bind(&addr).await.and_then(|listener| {
            let local = listener.local_addr()?;
            Ok((listener, local))
        });
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                error!(addr, error = %source, "failed to bind");
                let mut state = self.state.lock();
                if *state == RunState::Running {
                    *state = RunState::Idle;
                }
                drop(state);
                return Err(ServerError::Bind { addr, source });
            }
        };

        info!(addr = %local_addr, path = %self.config.path, "roomcast server listening");
        let handle = tokio::spawn(self.serve(listener));
        Ok((local_addr, handle))
    }

    /// Stop serving.
    ///
    /// Signals every connection task, tears down every registered connection,
    /// then waits (bounded by the shutdown timeout) for the listener to drain.
    /// In-flight reads may still be unwinding when this returns.
    pub async fn stop(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Running {
                return Err(ServerError::NotRunning);
            }
            *state = RunState::Stopped;
        }

        info!("stopping roomcast server");
        self.shutdown.shutdown();
        let _ = self.router.disconnect_all();

        let timeout = self.config.shutdown_timeout();
        if !self.shutdown.graceful_shutdown(timeout).await {
            return Err(ServerError::ShutdownTimeout(timeout));
        }
        info!("roomcast server stopped");
        Ok(())
    }

    /// Get the message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn begin(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock();
        match *state {
            RunState::Idle => {
                *state = RunState::Running;
                Ok(())
            }
            RunState::Running => Err(ServerError::AlreadyRunning),
            RunState::Stopped => Err(ServerError::Stopped),
        }
    }

    fn serve(
        &self,
        listener: TcpListener,
    ) -> impl Future<Output = Result<(), ServerError>> + Send + use<> {
        let app = self.app();
        let token = self.shutdown.token();
        let shutdown = Arc::clone(&self.shutdown);
        async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            shutdown.mark_finished();
            if let Err(error) = &result {
                error!(error = %error, "accept loop failed");
            }
            result.map_err(ServerError::Serve)
        }
    }
}

/// GET {path}: upgrade to a WebSocket once a session id is found.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let session_id = match session_id_from_headers(&headers, state.config.session_cookie.as_deref())
    {
        Ok(id) => id,
        Err(error) => {
            warn!(error = %error, "rejecting handshake without session");
            return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
        }
    };

    let ctx = ConnectionContext {
        router: state.router.clone(),
        shutdown: state.shutdown.token(),
        queue_capacity: state.config.send_queue_capacity,
        ping_interval: state.config.ping_interval(),
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, session_id, ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.router.registry().len(),
        state.router.rooms().room_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use roomcast_core::NoopEventSink;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{with_path, with_port, with_shutdown_timeout};

    fn make_server(configs: Vec<ConfigFn>) -> RoomcastServer {
        RoomcastServer::new(Arc::new(NoopEventSink), configs).unwrap()
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[test]
    fn new_applies_configs() {
        let server = make_server(vec![with_port(0), with_path("/chat")]);
        assert_eq!(server.config().port, 0);
        assert_eq!(server.config().path, "/chat");
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = RoomcastServer::new(Arc::new(NoopEventSink), vec![with_path("chat")]);
        assert_matches!(result, Err(ServerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server(Vec::new());
        let (status, body) = get_json(server.app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
    }

    #[tokio::test]
    async fn metrics_route_only_with_handle() {
        let server = make_server(Vec::new());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server(Vec::new()).with_metrics(handle);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(Vec::new());
        let (status, _) = get_json(server.app(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_without_start_is_not_running() {
        let server = make_server(Vec::new());
        assert_matches!(server.stop().await, Err(ServerError::NotRunning));
    }

    #[tokio::test]
    async fn listen_then_stop() {
        let server = make_server(vec![with_port(0), with_shutdown_timeout(Duration::from_secs(5))]);
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_matches!(server.listen().await, Err(ServerError::AlreadyRunning));

        server.stop().await.unwrap();
        assert!(handle.await.unwrap().is_ok());
        assert_matches!(server.stop().await, Err(ServerError::NotRunning));
        assert_matches!(server.listen().await, Err(ServerError::Stopped));
    }

    #[tokio::test]
    async fn start_returns_ok_after_stop() {
        let server = Arc::new(make_server(vec![with_port(0)]));
        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };

        // Wait for the accept loop to come up.
        for _ in 0..100 {
            if server.stop().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(running.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();
        let server = make_server(vec![with_port(port)]);

        let err = server.start().await.unwrap_err();
        assert_matches!(err, ServerError::Bind { .. });
        // A failed bind leaves the server startable.
        assert_matches!(server.stop().await, Err(ServerError::NotRunning));
    }
}
