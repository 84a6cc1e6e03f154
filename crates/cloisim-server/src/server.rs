//! `ControlServer`: axum HTTP + WebSocket server for the control channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use cloisim_core::{BridgeRegistry, SimulationController};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::control::ControlService;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_CONNECTIONS_REJECTED_TOTAL, render};
use crate::websocket::session::{SessionContext, run_control_session};
use crate::websocket::tracker::SessionTracker;

/// WebSocket path of the control service.
pub const CONTROL_PATH: &str = "/control";

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Per-session dependencies.
    pub session: SessionContext,
    /// One permit per allowed control connection.
    pub slots: Arc<Semaphore>,
    /// Upgrade limit.
    pub max_connections: usize,
    /// Inbound frame limit.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The control server.
pub struct ControlServer {
    config: ServerConfig,
    service: Arc<ControlService>,
    tracker: Arc<SessionTracker>,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl ControlServer {
    /// Create a server answering from `registry` and `controller`.
    pub fn new(
        config: ServerConfig,
        registry: Arc<dyn BridgeRegistry>,
        controller: Arc<dyn SimulationController>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(
                config.max_connections.min(Semaphore::MAX_PERMITS),
            )),
            config,
            service: Arc::new(ControlService::new(registry, controller)),
            tracker: Arc::new(SessionTracker::new()),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the router: `/control`, `/health`, `/metrics`.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: SessionContext::new(
                &self.config,
                self.service.clone(),
                self.tracker.clone(),
                self.shutdown.clone(),
            ),
            slots: self.slots.clone(),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(CONTROL_PATH, get(control_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address and the serve task. The task ends after
    /// [`stop`](Self::stop) or when the shutdown token is cancelled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.clone();
        let serve = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "control server stopped with error");
            }
        });

        info!(addr = %local, path = CONTROL_PATH, "control server listening");
        Ok((local, serve))
    }

    /// Cancel the server and wait up to `timeout` for the serve task and
    /// every open session to finish. Returns `false` on timeout.
    pub async fn stop(&self, serve: JoinHandle<()>, timeout: Duration) -> bool {
        self.shutdown.cancel();
        let tracker = self.tracker.clone();
        let drain = async move {
            let _ = serve.await;
            while tracker.count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };

        let drained = tokio::time::timeout(timeout, drain).await.is_ok();
        if drained {
            info!("control server stopped");
        } else {
            warn!(?timeout, open = self.tracker.count(), "control server stop timed out");
        }
        drained
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Shutdown token observed by the serve task and every session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Open-session registry.
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Request handler.
    pub fn service(&self) -> &Arc<ControlService> {
        &self.service
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn new_session_id() -> String {
    format!("ctl_{}", Uuid::now_v7())
}

/// GET /control
///
/// A connection slot is reserved before the upgrade headers are checked and
/// held until the session ends.
async fn control_handler(
    State(state): State<AppState>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(permit) = state.slots.clone().try_acquire_owned() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            open = state.session.tracker.count(),
            limit = state.max_connections,
            "control connection refused"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many control connections").into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let session_id = new_session_id();
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "control upgrade failed"))
        .on_upgrade(move |socket| async move {
            let _permit = permit;
            run_control_session(socket, session_id, state.session).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.session.tracker.count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    render(&state.metrics)
}
