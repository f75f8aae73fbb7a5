use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AnnounceStatusResponse {
    pub notified: usize,
}

/// POST /statuses/{id}/announce
///
/// The status document itself is owned by the document store; this hook
/// only fans the `new_status` event out to the poster's accepted friends.
pub async fn announce_status(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(status_id): Path<Uuid>,
) -> Result<Json<AnnounceStatusResponse>, AppError> {
    let notified = state.messages.announce_status(user_id, status_id).await?;
    Ok(Json(AnnounceStatusResponse { notified }))
}
