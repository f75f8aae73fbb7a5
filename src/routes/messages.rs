use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{MessageType, MessageView};
use crate::services::message_service::{OutgoingMessage, UnreadCount};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(flatten)]
    pub payload: OutgoingMessage,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

/// POST /messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let view = state
        .messages
        .send_direct(user_id, body.receiver_id, body.message_type, body.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

/// PUT /messages/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let updated = state.messages.mark_read(user_id, &body.message_ids).await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    pub emoji: String,
}

/// POST /messages/{id}/reactions
pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<AddReactionRequest>,
) -> Result<StatusCode, AppError> {
    state.messages.react(user_id, message_id, &body.emoji).await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

/// PUT /messages/{id}
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> Result<StatusCode, AppError> {
    state.messages.edit(user_id, message_id, &body.content).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteMessageRequest {
    #[serde(default)]
    pub for_everyone: bool,
}

/// DELETE /messages/{id}
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
    body: Option<Json<DeleteMessageRequest>>,
) -> Result<StatusCode, AppError> {
    let for_everyone = body.map(|Json(b)| b.for_everyone).unwrap_or(false);
    state.messages.delete(user_id, message_id, for_everyone).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    pub limit: Option<i64>,
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub messages: Vec<MessageView>,
}

/// GET /messages/conversation/{user_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(peer_id): Path<Uuid>,
    Query(params): Query<ConversationParams>,
) -> Result<Json<ConversationResponse>, AppError> {
    let messages = state
        .messages
        .get_conversation(user_id, peer_id, params.limit, params.before)
        .await?;
    Ok(Json(ConversationResponse { messages }))
}

/// GET /messages/unread
pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<UnreadCount>>, AppError> {
    let counts = state.messages.unread_counts(user_id).await?;
    Ok(Json(counts))
}
