pub mod broadcast;
pub mod health;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", broadcast::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        broadcast::broadcast,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::models::chat_user::ChatUser,
            health::HealthResponse,
            broadcast::BroadcastResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Broadcast", description = "Fan-out to connected clients"),
    )
)]
pub struct ApiDoc;
