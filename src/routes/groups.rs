use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{MessageType, MessageView};
use crate::services::message_service::OutgoingMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendGroupMessageRequest {
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(flatten)]
    pub payload: OutgoingMessage,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

/// POST /groups/{id}/messages
pub async fn send_group_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(group_id): Path<Uuid>,
    Json(body): Json<SendGroupMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let view = state
        .messages
        .send_group(user_id, group_id, body.message_type, body.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}
