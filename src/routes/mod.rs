use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};

use crate::middleware::auth::require_user;
use crate::state::AppState;
use crate::{metrics, websocket};

pub mod groups;
pub mod messages;
pub mod statuses;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/read", put(messages::mark_read))
        .route("/messages/unread", get(messages::unread_counts))
        .route(
            "/messages/:id",
            put(messages::edit_message).delete(messages::delete_message),
        )
        .route("/messages/:id/reactions", post(messages::add_reaction))
        .route(
            "/messages/conversation/:user_id",
            get(messages::get_conversation),
        )
        .route("/groups/:id/messages", post(groups::send_group_message))
        .route("/statuses/:id/announce", post(statuses::announce_status))
        .route_layer(from_fn_with_state(state.clone(), require_user));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/ws", get(websocket::handlers::ws_handler))
        .merge(protected)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
