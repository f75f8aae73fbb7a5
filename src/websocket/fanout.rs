use std::sync::Arc;

use axum::extract::ws::Message;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppResult;
use crate::metrics;
use crate::storage::ChatStore;

use super::events::OutboundEvent;
use super::ConnectionRegistry;

/// Resolves an event's audience and enqueues it on every matching live
/// connection. Fire-and-forget: an offline target is a silent no-op, a
/// closed queue is skipped, and the caller is never blocked on a slow peer.
#[derive(Clone)]
pub struct FanoutRouter {
    registry: ConnectionRegistry,
    store: Arc<dyn ChatStore>,
}

impl FanoutRouter {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn ChatStore>) -> Self {
        Self { registry, store }
    }

    /// Emits to every live connection of the user (multi-device). Returns
    /// how many connections the event was enqueued on.
    pub fn notify_user(&self, user_id: Uuid, event: &OutboundEvent) -> usize {
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(event = event.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };
        let reached = self.send_all(self.registry.lookup(user_id), payload);
        self.record(event, reached);
        reached
    }

    /// Emits to every connection joined to the group's room, minus the
    /// excluded sender.
    pub fn notify_group(
        &self,
        group_id: Uuid,
        event: &OutboundEvent,
        exclude_user: Option<Uuid>,
    ) -> usize {
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(event = event.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };
        let reached = self.send_all(self.registry.room_senders(group_id, exclude_user), payload);
        self.record(event, reached);
        reached
    }

    /// Emits to every live connection of the user's accepted friends.
    pub async fn notify_friends(&self, user_id: Uuid, event: &OutboundEvent) -> AppResult<usize> {
        let friends = self.store.get_friends(user_id).await?;
        let reached = friends
            .into_iter()
            .map(|friend| self.notify_user(friend, event))
            .sum();
        Ok(reached)
    }

    fn send_all(&self, senders: Vec<super::OutboundSender>, payload: String) -> usize {
        let mut reached = 0;
        for sender in senders {
            if sender.send(Message::Text(payload.clone())).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    fn record(&self, event: &OutboundEvent, reached: usize) {
        if reached > 0 {
            metrics::EVENTS_FANNED_OUT_TOTAL
                .with_label_values(&[event.event_type()])
                .inc_by(reached as u64);
        } else {
            debug!(event = event.event_type(), "no live connections for event");
        }
    }
}
