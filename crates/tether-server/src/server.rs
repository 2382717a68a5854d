//! `TetherServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tether_core::ClientId;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::group::GroupInfo;
use crate::health::{self, HealthResponse};
use crate::reclaim::spawn_reclaim_task;
use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Transport configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Tether server.
pub struct TetherServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

/// Background tasks of a listening server.
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    server: JoinHandle<()>,
    reclaim: JoinHandle<()>,
}

impl ServerHandle {
    /// Task handles, for [`ShutdownCoordinator::graceful_shutdown`].
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.reclaim]
    }
}

impl TetherServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/groups", get(groups_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Bind, then serve and reclaim in the background until shutdown.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(error) = result {
                warn!(%error, "server exited with error");
            }
        });

        let reclaim = spawn_reclaim_task(
            Arc::clone(&self.registry),
            self.config.reclaim_interval,
            self.shutdown.token(),
        );

        info!(%addr, reclaim_interval = ?self.config.reclaim_interval, "tether server listening");
        Ok(ServerHandle {
            addr,
            server,
            reclaim,
        })
    }

    /// Cancel all tasks, wait for them, then stop every session group.
    pub async fn shutdown_gracefully(&self, handle: ServerHandle, timeout: Option<Duration>) {
        self.shutdown
            .graceful_shutdown(handle.into_tasks(), timeout)
            .await;
        self.registry.shutdown().await;
        info!("tether server stopped");
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let client_id = ClientId::generate();
    let token = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, client_id, state.registry, state.config, token)
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.client_count(),
        state.registry.group_count(),
    ))
}

/// GET /groups
async fn groups_handler(State(state): State<AppState>) -> Json<Vec<GroupInfo>> {
    Json(state.registry.groups())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
