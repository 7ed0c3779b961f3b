use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use parley_gateway::HubError;
use parley_types::api::{MessageContainer, SendMessageRequest};
use parley_types::models::Message;

use crate::auth::AppState;
use crate::middleware::Claims;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default)]
    pub container: MessageContainer,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `sent_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Send over the plain request/response surface. Funnels into the same hub
/// dispatch as the WebSocket path, so room read-marking, notifications and
/// the room broadcast all behave identically.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let message = state
        .hub
        .send_message(&claims.username, &req.recipient_username, &req.content)
        .await
        .map_err(hub_error_response)?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB work off the async runtime
    let db = state.db.clone();
    let username = claims.username.clone();
    let limit = query.limit.min(200);
    let container = query.container;
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || {
        db.messages_for_user(&username, container, limit, before.as_deref())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<Message> = rows.into_iter().map(|row| row.into_model()).collect();
    Ok(Json(messages))
}

/// Full thread with another user, oldest first. Reading the thread marks
/// any unread incoming messages read before the response is built, exactly
/// like the connect-time thread delivery.
pub async fn get_message_thread(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let current = claims.username.clone();
    let other = username.to_lowercase();
    let now = chrono::Utc::now().to_rfc3339();

    let rows = tokio::task::spawn_blocking(move || db.message_thread(&current, &other, &now))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<Message> = rows.into_iter().map(|row| row.into_model()).collect();
    Ok(Json(messages))
}

/// Soft delete for the requesting side only; the row is physically removed
/// once both sides have deleted. An id the caller is not a party to reads
/// the same as an unknown id.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let db = state.db.clone();
    let username = claims.username.clone();

    let outcome = tokio::task::spawn_blocking(move || db.delete_message(&id, &username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "operation failed".to_string(),
            )
        })?
        .map_err(|e| {
            error!("delete failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "operation failed".to_string(),
            )
        })?;

    match outcome {
        Some(removed) => Ok(Json(serde_json::json!({ "removed": removed }))),
        None => Err((StatusCode::NOT_FOUND, "message not found".to_string())),
    }
}

fn hub_error_response(err: HubError) -> (StatusCode, String) {
    match err {
        HubError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        HubError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        HubError::Storage(e) => {
            error!("storage failure: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "operation failed".to_string(),
            )
        }
    }
}
