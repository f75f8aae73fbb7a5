use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::PresenceStatus;
use crate::storage::ChatStore;
use crate::websocket::events::OutboundEvent;
use crate::websocket::fanout::FanoutRouter;

/// Derives persisted presence from live-connection edges. Callers invoke
/// these hooks only on the 0->1 / 1->0 edges reported by the registry;
/// intermediate device connects and disconnects never reach this type.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn ChatStore>,
    fanout: FanoutRouter,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn ChatStore>, fanout: FanoutRouter) -> Self {
        Self { store, fanout }
    }

    /// First live connection: persist "online" and tell accepted friends.
    /// `last_seen` is left as-is until the matching disconnect.
    pub async fn on_user_connected(&self, user_id: Uuid) -> AppResult<()> {
        let mut user = self.store.get_user(user_id).await?;
        user.status = PresenceStatus::Online;
        self.store.save_user(&user).await?;

        let reached = self
            .fanout
            .notify_friends(user_id, &OutboundEvent::FriendOnline { user_id })
            .await?;
        debug!(user = %user_id, reached, "user online");
        Ok(())
    }

    /// Last live connection gone: persist "offline" with lastSeen = now and
    /// fan the timestamp out to accepted friends.
    pub async fn on_user_disconnected(&self, user_id: Uuid) -> AppResult<()> {
        let last_seen = Utc::now();
        let mut user = self.store.get_user(user_id).await?;
        user.status = PresenceStatus::Offline;
        user.last_seen = Some(last_seen);
        self.store.save_user(&user).await?;

        let reached = self
            .fanout
            .notify_friends(user_id, &OutboundEvent::FriendOffline { user_id, last_seen })
            .await?;
        debug!(user = %user_id, reached, "user offline");
        Ok(())
    }
}
