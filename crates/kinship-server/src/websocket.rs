//! WebSocket transport: handshake authentication, a writer with heartbeat
//! and a sequential reader per connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use kinship_core::messages::Identity;
use kinship_core::ChatError;

use crate::auth::extract_token;
use crate::config::ServerConfig;
use crate::connection::{ClientConnection, Frame};
use crate::error::ApiError;
use crate::handlers;
use crate::hub::ChatHub;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&ServerConfig> for Heartbeat {
    fn from(config: &ServerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.heartbeat_interval_secs),
            timeout: Duration::from_secs(config.heartbeat_timeout_secs),
        }
    }
}

/// `GET /ws`. The token is verified and the identity recorded before the
/// upgrade, so a rejected handshake never becomes a connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let token = extract_token(&headers, params.token.as_deref())
        .ok_or_else(|| ChatError::auth("missing access token"))?;
    let identity = state.verifier.verify(&token)?;
    state.hub.admit(&identity).await?;
    Ok(ws.on_upgrade(move |socket| run_connection(socket, identity, state)))
}

async fn run_connection(socket: WebSocket, identity: Identity, state: AppState) {
    let hub = Arc::clone(&state.hub);
    let (conn, rx) = hub.connect(identity);
    let (sink, stream) = socket.split();

    let mut writer = tokio::spawn(write_loop(
        sink,
        rx,
        Arc::clone(&conn),
        Heartbeat::from(state.config.as_ref()),
        state.shutdown.clone(),
    ));
    let mut reader = tokio::spawn(read_loop(stream, Arc::clone(&hub), Arc::clone(&conn)));

    tokio::select! {
        _ = &mut writer => {},
        _ = &mut reader => {},
    }
    writer.abort();
    reader.abort();

    hub.disconnect(&conn).await;
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Frame>,
    conn: Arc<ClientConnection>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let mut ping = tokio::time::interval(heartbeat.interval);
    ping.tick().await;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(text) = frame else { break };
                if sink.send(WsMessage::Text(text.as_ref().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if conn.is_closed() || conn.idle_for() > heartbeat.timeout {
                    info!(connection_id = %conn.id, idle = ?conn.idle_for(), "heartbeat timeout, closing");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
                if sink.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
                trace!(connection_id = %conn.id, "sent ping");
            }
            _ = shutdown.cancelled() => {
                debug!(connection_id = %conn.id, "closing for shutdown");
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
    conn.mark_closed();
}

/// Frames from one connection are handled one at a time, so a client's
/// events take effect in the order it sent them.
async fn read_loop(mut stream: SplitStream<WebSocket>, hub: Arc<ChatHub>, conn: Arc<ClientConnection>) {
    while let Some(Ok(msg)) = stream.next().await {
        conn.mark_alive();
        match msg {
            WsMessage::Text(text) => handlers::handle_frame(&hub, &conn, text.as_str()).await,
            WsMessage::Binary(_) => {
                handlers::reject(&conn, ChatError::validation("binary frames are not supported"))
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
}
