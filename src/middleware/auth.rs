use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Resolves the caller's identity from the bearer token via the storage
/// collaborator and injects the user id into request extensions.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let user_id: Uuid = state
        .store
        .find_user_by_token(token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
