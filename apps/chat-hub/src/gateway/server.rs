//! WebSocket upgrade handler and per-connection pump.
//!
//! Each accepted socket becomes one [`Client`] submitted to the hub. Inbound
//! frames are broadcast verbatim; outbound payloads come only from the hub.

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::AppState;

use super::client::Client;

/// Close codes.
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_TOO_BIG: u16 = 1009;

/// Identity of the connecting user, established before the hub sees it.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// Why a connection's pump stopped.
enum Exit {
    /// Socket closed or errored on the client side.
    Client,
    /// The hub closed our outbound buffer.
    Hub,
    /// Inbound frame exceeded the size limit.
    TooBig,
    /// The hub loop is gone.
    HubStopped,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = params
        .user_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let username = params
        .username
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| user_id.clone());

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user_id, username)))
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: String, username: String) {
    let (client, outbound) = Client::new(user_id, username, state.config.client_buffer);
    let conn_id = client.conn_id().clone();

    tracing::info!(%conn_id, user_id = %client.user_id, "connection accepted");

    if state.hub.register(client).await.is_err() {
        tracing::error!(%conn_id, "hub loop stopped, refusing connection");
        return;
    }

    let (ws_tx, ws_rx) = socket.split();
    let exit = pump(&state, ws_tx, ws_rx, outbound).await;

    match exit {
        Exit::Client => tracing::debug!(%conn_id, "client closed connection"),
        Exit::Hub => tracing::debug!(%conn_id, "hub closed connection"),
        Exit::TooBig => tracing::debug!(%conn_id, "inbound frame too large"),
        Exit::HubStopped => tracing::warn!(%conn_id, "hub loop stopped mid-session"),
    }

    // Exactly one unregister per connection, whichever side ended it.
    if state.hub.unregister(conn_id.clone()).await.is_err() {
        tracing::warn!(%conn_id, "hub loop stopped before unregister");
    }

    tracing::info!(%conn_id, "connection ended");
}

async fn pump(
    state: &AppState,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut outbound: mpsc::Receiver<Bytes>,
) -> Exit {
    let max_bytes = state.config.max_message_bytes;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => return Exit::Client,
                    Some(Err(e)) => {
                        tracing::debug!(?e, "ws read error");
                        return Exit::Client;
                    }
                };

                if payload.len() > max_bytes {
                    let _ = send_close(&mut ws_tx, CLOSE_TOO_BIG, "Message too large").await;
                    return Exit::TooBig;
                }

                if state.hub.broadcast(payload).await.is_err() {
                    let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Server shutting down").await;
                    return Exit::HubStopped;
                }
            }

            out = outbound.recv() => {
                match out {
                    Some(payload) => {
                        if ws_tx.send(frame(payload)).await.is_err() {
                            return Exit::Client;
                        }
                    }
                    None => {
                        let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Disconnected").await;
                        return Exit::Hub;
                    }
                }
            }
        }
    }
}

/// Text frame when the payload is valid UTF-8, binary otherwise. Neither
/// path copies the payload.
fn frame(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
