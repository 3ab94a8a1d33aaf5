#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use chat_hub::config::Config;
use chat_hub::gateway::hub::{Hub, HubOptions};
use chat_hub::gateway::presence::{MemoryPresence, PresenceGateway};
use chat_hub::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build an AppState backed by a running hub loop and the given presence store.
pub fn test_state_with(presence: Arc<dyn PresenceGateway>, config: Config) -> AppState {
    let (hub, handle) = Hub::new(
        presence,
        HubOptions {
            offline_on_evict: config.offline_on_evict,
        },
    );
    tokio::spawn(hub.run());

    AppState {
        hub: handle,
        config: Arc::new(config),
    }
}

/// AppState with in-memory presence and default config.
pub fn test_state() -> (AppState, Arc<MemoryPresence>) {
    let presence = Arc::new(MemoryPresence::new());
    let state = test_state_with(presence.clone(), Config::default());
    (state, presence)
}

pub fn test_app(state: AppState) -> Router {
    chat_hub::routes::router().with_state(state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub async fn connect(addr: SocketAddr, user_id: &str, username: &str) -> WsClient {
    let url = format!("ws://{addr}/ws?user_id={user_id}&username={username}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Poll until the hub reports `expected` active connections.
pub async fn wait_for_connections(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.hub.connected_count() == expected {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} connections, hub reports {}",
        state.hub.connected_count()
    );
}

/// Poll until `check` holds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Next data frame as text, skipping pings.
pub async fn next_text(ws: &mut WsClient) -> String {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => return text.to_string(),
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Wait for the server to close the socket; returns the close code if sent.
pub async fn expect_closed(ws: &mut WsClient) -> Option<u16> {
    loop {
        let next = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close");
        match next {
            Some(Ok(tungstenite::Message::Close(frame))) => {
                return frame.map(|f| u16::from(f.code));
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}
