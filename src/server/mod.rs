/// HTTP and WebSocket server surfaces.
///
/// One axum router carries every endpoint the data layer exposes:
///
/// - `GET /health`, `GET /ready` — liveness and readiness
/// - `GET /_sync` — incremental delta sync
/// - `POST /_webhooks/:plugin/*path` — webhook intake
/// - `GET /ws` — WebSocket push channel (path configurable)
///
/// Every endpoint answers with permissive CORS so browser-based dev
/// tooling can talk to a local instance directly. Wrong verbs get 405 from
/// the router's method filtering.
pub mod health;
pub mod sync;
pub mod webhook;
pub mod ws;

pub use health::ReadinessChecks;
pub use ws::{
    NodeEventPayload, SubscribeTarget, SubscriptionFilter, WsClientMessage, WsServerMessage,
    WsState, DEFAULT_HEARTBEAT_INTERVAL,
};

use crate::error::{UdlError, UdlResult};
use crate::runtime::Runtime;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// The node-graph runtime.
    pub runtime: Runtime,
    /// WebSocket connection registry.
    pub ws: Arc<WsState>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port; 0 picks an ephemeral port.
    pub port: u16,
    /// Path serving WebSocket upgrades.
    pub ws_path: String,
    /// WebSocket heartbeat interval.
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4000,
            ws_path: "/ws".into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Build the router over an [`AppState`].
pub fn router(state: AppState, ws_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .route("/_sync", get(sync::sync_handler))
        .route("/_webhooks/:plugin/*path", post(webhook::webhook_handler))
        .route(ws_path, get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

/// The data-layer server: binds the router and runs until closed.
pub struct Server {
    runtime: Runtime,
    config: ServerConfig,
}

impl Server {
    /// Create a server over a runtime.
    pub fn new(runtime: Runtime, config: ServerConfig) -> Self {
        Self { runtime, config }
    }

    /// Bind and start serving. Returns a handle carrying the bound address
    /// and the shutdown switch.
    pub async fn bind(self) -> UdlResult<ServerHandle> {
        let ws = WsState::start(&self.runtime, self.config.heartbeat_interval);
        let state = AppState {
            runtime: self.runtime.clone(),
            ws: ws.clone(),
        };
        let app = router(state, &self.config.ws_path);

        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
                .await
                .map_err(UdlError::Io)?;
        let addr = listener.local_addr().map_err(UdlError::Io)?;
        info!(%addr, "data layer listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "server exited with error");
            }
        });

        Ok(ServerHandle {
            addr,
            ws,
            runtime: self.runtime,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    ws: Arc<WsState>,
    runtime: Runtime,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base `http://` URL of the server.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `ws://` URL of the push channel.
    pub fn ws_url(&self, ws_path: &str) -> String {
        format!("ws://{}{}", self.addr, ws_path)
    }

    /// The WebSocket connection registry.
    pub fn ws(&self) -> &Arc<WsState> {
        &self.ws
    }

    /// Stop accepting, drop every WebSocket connection, flush nothing:
    /// pending webhook batches are dropped with the runtime's timers.
    pub async fn close(mut self) {
        self.ws.close();
        self.runtime.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.task.await;
    }
}
