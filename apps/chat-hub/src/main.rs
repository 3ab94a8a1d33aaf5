use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_hub::config::Config;
use chat_hub::gateway::hub::{Hub, HubOptions};
use chat_hub::gateway::presence::{MemoryPresence, PgPresence, PresenceGateway};
use chat_hub::AppState;
use std::path::Path;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let presence: Arc<dyn PresenceGateway> = match &config.database_url {
        Some(url) => {
            let db = chat_hub::db::pool::connect(url).expect("failed to build connection pool");
            Arc::new(PgPresence::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, presence is kept in memory");
            Arc::new(MemoryPresence::new())
        }
    };

    let (hub, hub_handle) = Hub::new(
        presence,
        HubOptions {
            offline_on_evict: config.offline_on_evict,
        },
    );
    tokio::spawn(hub.run());

    tracing::info!(
        client_buffer = config.client_buffer,
        offline_on_evict = config.offline_on_evict,
        "chat-hub configured"
    );

    let state = AppState {
        hub: hub_handle,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_hub::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-hub listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
