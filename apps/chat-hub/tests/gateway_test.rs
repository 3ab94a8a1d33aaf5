mod common;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite;

use chat_hub::config::Config;
use chat_hub::error::PresenceError;
use chat_hub::gateway::presence::{PresenceGateway, UserExistence};

/// Presence store that is always down.
struct UnavailablePresence;

#[async_trait]
impl PresenceGateway for UnavailablePresence {
    async fn exists(&self, _user_id: &str) -> Result<UserExistence, PresenceError> {
        Ok(UserExistence::NotExists)
    }

    async fn create_user(&self, _username: &str, _user_id: &str) -> Result<(), PresenceError> {
        Err(PresenceError::Internal("store unavailable".into()))
    }

    async fn set_online_status(&self, _user_id: &str, _online: bool) -> Result<(), PresenceError> {
        Err(PresenceError::Internal("store unavailable".into()))
    }
}

#[tokio::test]
async fn first_connection_creates_user_and_marks_online() {
    let (state, presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let _ws = common::connect(addr, "U1", "alice").await;
    common::wait_for_connections(&state, 1).await;

    assert_eq!(presence.is_online("U1"), Some(true));
    assert_eq!(presence.username("U1").as_deref(), Some("alice"));
}

#[tokio::test]
async fn username_defaults_to_user_id() {
    let (state, presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let url = format!("ws://{addr}/ws?user_id=U7");
    let (_ws, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    common::wait_for_connections(&state, 1).await;

    assert_eq!(presence.username("U7").as_deref(), Some("U7"));
}

#[tokio::test]
async fn inbound_frame_reaches_every_client() {
    let (state, _presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut a = common::connect(addr, "U1", "alice").await;
    let mut b = common::connect(addr, "U2", "bob").await;
    common::wait_for_connections(&state, 2).await;

    a.send(tungstenite::Message::Text("hello".to_string().into()))
        .await
        .expect("send");

    // The sender is a member of the active set too.
    assert_eq!(common::next_text(&mut a).await, "hello");
    assert_eq!(common::next_text(&mut b).await, "hello");

    b.send(tungstenite::Message::Text("hi back".to_string().into()))
        .await
        .expect("send");
    assert_eq!(common::next_text(&mut a).await, "hi back");
    assert_eq!(common::next_text(&mut b).await, "hi back");
}

#[tokio::test]
async fn disconnect_marks_user_offline() {
    let (state, presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut ws = common::connect(addr, "U1", "alice").await;
    common::wait_for_connections(&state, 1).await;

    ws.close(None).await.expect("close");
    common::wait_for_connections(&state, 0).await;
    common::wait_until(|| presence.is_online("U1") == Some(false)).await;
}

#[tokio::test]
async fn reconnect_sets_existing_user_online() {
    let (state, presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut ws = common::connect(addr, "U1", "alice").await;
    common::wait_for_connections(&state, 1).await;
    ws.close(None).await.expect("close");
    common::wait_until(|| presence.is_online("U1") == Some(false)).await;
    common::wait_for_connections(&state, 0).await;

    let _ws = common::connect(addr, "U1", "alice").await;
    common::wait_for_connections(&state, 1).await;
    assert_eq!(presence.is_online("U1"), Some(true));
}

#[tokio::test]
async fn failed_registration_closes_socket() {
    let state = common::test_state_with(Arc::new(UnavailablePresence), Config::default());
    let addr = common::start_server(state.clone()).await;

    let mut ws = common::connect(addr, "U1", "alice").await;

    let code = common::expect_closed(&mut ws).await;
    assert!(matches!(code, Some(1000) | None));
    assert_eq!(state.hub.connected_count(), 0);
}

#[tokio::test]
async fn oversize_frame_closes_with_1009() {
    let config = Config {
        max_message_bytes: 8,
        ..Config::default()
    };
    let presence = Arc::new(chat_hub::gateway::presence::MemoryPresence::new());
    let state = common::test_state_with(presence, config);
    let addr = common::start_server(state.clone()).await;

    let mut ws = common::connect(addr, "U1", "alice").await;
    common::wait_for_connections(&state, 1).await;

    ws.send(tungstenite::Message::Text("far too long for the limit".to_string().into()))
        .await
        .expect("send");

    assert_eq!(common::expect_closed(&mut ws).await, Some(1009));
    common::wait_for_connections(&state, 0).await;
}

#[tokio::test]
async fn http_broadcast_reaches_websocket_clients() {
    let (state, _presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut ws = common::connect(addr, "U1", "alice").await;
    common::wait_for_connections(&state, 1).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/broadcast"))
        .body("ping")
        .send()
        .await
        .expect("broadcast request");
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

    assert_eq!(common::next_text(&mut ws).await, "ping");
}

#[tokio::test]
async fn upgrade_without_user_id_is_rejected() {
    let (state, _presence) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?username=alice")).await;
    let Err(err) = result else {
        panic!("upgrade should be refused");
    };
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 400),
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert_eq!(state.hub.connected_count(), 0);
}
