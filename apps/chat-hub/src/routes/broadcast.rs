use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/broadcast", post(broadcast))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BroadcastResponse {
    pub status: String,
}

/// Queue the raw request body for delivery to every connected client.
///
/// Acceptance only means the hub took the request; clients that are too slow
/// are dropped and the caller is not told.
#[utoipa::path(
    post,
    path = "/api/v1/broadcast",
    tag = "Broadcast",
    request_body(content = String, description = "Opaque payload", content_type = "application/octet-stream"),
    responses(
        (status = 202, description = "Payload queued", body = BroadcastResponse),
        (status = 400, description = "Empty payload", body = ApiErrorBody),
        (status = 413, description = "Payload too large", body = ApiErrorBody),
        (status = 503, description = "Hub loop stopped", body = ApiErrorBody),
    ),
)]
pub async fn broadcast(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<BroadcastResponse>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Payload must not be empty"));
    }
    if body.len() > state.config.max_message_bytes {
        return Err(ApiError::payload_too_large(format!(
            "Payload exceeds {} bytes",
            state.config.max_message_bytes
        )));
    }

    state.hub.broadcast(body).await.map_err(|err| {
        tracing::error!(%err, "broadcast rejected");
        ApiError::unavailable("Hub is not running")
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BroadcastResponse {
            status: "queued".to_string(),
        }),
    ))
}
