//! Control session lifecycle, from upgrade to close.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::SinkExt;
use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ControlConnection;
use super::tracker::SessionTracker;
use crate::config::ServerConfig;
use crate::control::ControlService;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Everything a session needs besides its socket.
#[derive(Clone)]
pub struct SessionContext {
    /// Request handler.
    pub service: Arc<ControlService>,
    /// Open-session registry.
    pub tracker: Arc<SessionTracker>,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
    /// Drop sessions that stop answering pings.
    pub keep_clean: bool,
    /// Ping cadence.
    pub heartbeat_interval: Duration,
    /// Silence after which a session is dropped.
    pub pong_timeout: Duration,
}

impl SessionContext {
    /// Build a context from server configuration.
    pub fn new(
        config: &ServerConfig,
        service: Arc<ControlService>,
        tracker: Arc<SessionTracker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            tracker,
            shutdown,
            keep_clean: config.keep_clean,
            heartbeat_interval: config.heartbeat_interval(),
            pong_timeout: config.pong_timeout(),
        }
    }
}

/// What an inbound frame means to the control channel.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Text to decode as a request.
    Payload(String),
    /// Ping or pong from the peer.
    Heartbeat,
    /// Nothing to do.
    Ignore,
    /// Peer is closing.
    Close(Option<CloseFrame>),
}

pub(crate) fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) if text.is_empty() => Inbound::Ignore,
        Message::Text(text) => Inbound::Payload(text.as_str().to_owned()),
        Message::Binary(data) if data.is_empty() => Inbound::Ignore,
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Inbound::Payload(text),
            Err(_) => {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                Inbound::Ignore
            }
        },
        Message::Ping(_) | Message::Pong(_) => Inbound::Heartbeat,
        Message::Close(frame) => Inbound::Close(frame),
    }
}

/// Run one control session.
///
/// Each frame is handled to completion, reply written, before the next one
/// is read. Pings and shutdown are served from the same loop. The session is
/// unregistered when this function returns or its task is cancelled.
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_control_session(mut ws: WebSocket, session_id: String, ctx: SessionContext) {
    let connection = Arc::new(ControlConnection::new(session_id));
    let _guard = ctx.tracker.register(connection.clone());

    info!(open = ctx.tracker.count(), "control session opened");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut ping = tokio::time::interval(ctx.heartbeat_interval);
    let _ = ping.tick().await;

    let mut close: Option<CloseFrame> = None;
    loop {
        tokio::select! {
            frame = ws.recv() => {
                let Some(frame) = frame else { break };
                let msg = match frame {
                    Ok(msg) => msg,
                    Err(e) => {
                        // The stream reports None on the next read if the
                        // error left it unusable.
                        warn!(error = %e, "control session transport error");
                        continue;
                    }
                };

                match classify(msg) {
                    Inbound::Payload(text) => {
                        let Some(reply) = ctx.service.handle_text(&text) else {
                            continue;
                        };
                        if let Err(e) = ws.send(Message::Text(reply.into())).await {
                            warn!(error = %e, "failed to send control reply");
                            break;
                        }
                    }
                    Inbound::Heartbeat => connection.mark_alive(),
                    Inbound::Ignore => {}
                    Inbound::Close(frame) => {
                        close = frame;
                        // Completes the handshake with the reply queued on read.
                        if let Err(e) = SinkExt::close(&mut ws).await {
                            debug!(error = %e, "close reply not delivered");
                        }
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if ctx.keep_clean && connection.is_unresponsive(ctx.pong_timeout) {
                    warn!(timeout = ?ctx.pong_timeout, "control client unresponsive, dropping session");
                    break;
                }
                if ws.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            () = ctx.shutdown.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = ws.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }

    let (code, reason) = close
        .as_ref()
        .map_or((close_code::ABNORMAL, ""), |f| (f.code, f.reason.as_str()));
    info!(code, reason, age = ?connection.age(), "control session closed");

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}
