use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::state::AppState;
use crate::websocket::events::OutboundEvent;
use crate::websocket::message_types::InboundEvent;
use crate::websocket::ConnectionHandle;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Upgrade endpoint for the live connection. Identity is resolved from the
/// opaque token before the upgrade; an unknown token never gets a socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match state.store.find_user_by_token(&params.token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            error!(error = %e, "token lookup failed during ws upgrade");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

/// One task per connection: inbound events are handled one at a time in
/// arrival order, outbound events drain from the connection's queue. A
/// failure in one connection's handler never reaches another connection.
async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<Message>();

    let mut session = ConnectionSession::new(state, user_id, tx);
    metrics::WS_CONNECTED_CLIENTS.inc();
    debug!(user = %user_id, connection = %session.handle.id, "websocket connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the framework.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user = %user_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    session.teardown().await;
    metrics::WS_CONNECTED_CLIENTS.dec();
    debug!(user = %user_id, "websocket disconnected");
}

struct ConnectionSession {
    state: AppState,
    handle: ConnectionHandle,
    tx: UnboundedSender<Message>,
    registered: bool,
    joined_rooms: Vec<Uuid>,
}

impl ConnectionSession {
    fn new(state: AppState, user_id: Uuid, tx: UnboundedSender<Message>) -> Self {
        let handle = ConnectionHandle::new(user_id, tx.clone());
        Self {
            state,
            handle,
            tx,
            registered: false,
            joined_rooms: Vec::new(),
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let event = match serde_json::from_str::<InboundEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(user = %self.handle.user_id, error = %e, "ignoring malformed inbound event");
                return;
            }
        };

        let action = event.name();
        if let Err(e) = self.dispatch(event).await {
            warn!(user = %self.handle.user_id, action, error = %e, "inbound event failed");
            self.report_failure(action, &e);
        }
    }

    async fn dispatch(&mut self, event: InboundEvent) -> AppResult<()> {
        match event {
            InboundEvent::UserOnline => self.mark_online().await,
            InboundEvent::JoinGroup { group_id } => {
                self.state.registry.join_room(&self.handle, group_id);
                if !self.joined_rooms.contains(&group_id) {
                    self.joined_rooms.push(group_id);
                }
                Ok(())
            }
            InboundEvent::LeaveGroup { group_id } => {
                self.state.registry.leave_room(&self.handle, group_id);
                self.joined_rooms.retain(|room| *room != group_id);
                Ok(())
            }
            InboundEvent::Typing {
                receiver_id,
                is_typing,
            } => {
                self.state
                    .relay
                    .typing(self.handle.user_id, receiver_id, is_typing);
                Ok(())
            }
            InboundEvent::MarkRead { message_ids } => self
                .state
                .messages
                .mark_read(self.handle.user_id, &message_ids)
                .await
                .map(|_| ()),
            InboundEvent::CallRequest {
                receiver_id,
                call_type,
                signal_data,
            } => {
                self.state.relay.call_request(
                    self.handle.user_id,
                    receiver_id,
                    call_type,
                    signal_data,
                );
                Ok(())
            }
            InboundEvent::CallAccepted {
                caller_id,
                signal_data,
            } => {
                self.state
                    .relay
                    .call_accepted(self.handle.user_id, caller_id, signal_data);
                Ok(())
            }
            InboundEvent::CallRejected { caller_id } => {
                self.state.relay.call_rejected(self.handle.user_id, caller_id);
                Ok(())
            }
            InboundEvent::CallEnded { peer_id } => {
                self.state.relay.call_ended(self.handle.user_id, peer_id);
                Ok(())
            }
        }
    }

    /// Presence beacon. Registration reports the 0->1 edge; only that edge
    /// reaches the presence tracker.
    async fn mark_online(&mut self) -> AppResult<()> {
        if self.registered {
            return Ok(());
        }
        let first = self.state.registry.register(&self.handle);
        self.registered = true;
        if first {
            self.state
                .presence
                .on_user_connected(self.handle.user_id)
                .await?;
        }
        Ok(())
    }

    /// A failed inbound action is reported back on this connection, never
    /// silently dropped.
    fn report_failure(&self, action: &'static str, err: &AppError) {
        let event = OutboundEvent::ActionFailed {
            action: action.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        };
        if let Ok(payload) = event.to_payload() {
            let _ = self.tx.send(Message::Text(payload));
        }
    }

    async fn teardown(&mut self) {
        for room in self.joined_rooms.drain(..) {
            self.state.registry.leave_room(&self.handle, room);
        }
        if !self.registered {
            return;
        }
        let last = self.state.registry.unregister(&self.handle);
        if last {
            if let Err(e) = self
                .state
                .presence
                .on_user_disconnected(self.handle.user_id)
                .await
            {
                warn!(user = %self.handle.user_id, error = %e, "failed to persist offline presence");
            }
        }
    }
}
