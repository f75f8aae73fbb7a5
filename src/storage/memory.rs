use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DeliveryStatus, Group, Message, Reaction, User};

use super::ChatStore;

/// In-memory store. Backs the integration tests and any deployment that
/// does not need durability; the realtime core does not care which
/// implementation sits behind the trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, Uuid>,
    friends: HashMap<Uuid, HashSet<Uuid>>,
    blocked: HashSet<(Uuid, Uuid)>,
    messages: HashMap<Uuid, Message>,
    groups: HashMap<Uuid, Group>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.inner.write().await.users.insert(user.id, user);
    }

    pub async fn insert_token(&self, token: &str, user_id: Uuid) {
        self.inner.write().await.tokens.insert(token.to_string(), user_id);
    }

    /// Records a mutual accepted friendship.
    pub async fn befriend(&self, a: Uuid, b: Uuid) {
        let mut inner = self.inner.write().await;
        inner.friends.entry(a).or_default().insert(b);
        inner.friends.entry(b).or_default().insert(a);
    }

    pub async fn block(&self, blocker: Uuid, target: Uuid) {
        self.inner.write().await.blocked.insert((blocker, target));
    }

    pub async fn insert_group(&self, group: Group) {
        self.inner.write().await.groups.insert(group.id, group);
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.inner
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("user".into()))
    }

    async fn save_user(&self, user: &User) -> AppResult<()> {
        self.inner.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_token(&self, token: &str) -> AppResult<Option<Uuid>> {
        Ok(self.inner.read().await.tokens.get(token).copied())
    }

    async fn get_friends(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .friends
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> AppResult<bool> {
        Ok(self.inner.read().await.blocked.contains(&(blocker, target)))
    }

    async fn create_message(&self, message: &Message) -> AppResult<()> {
        self.inner
            .write()
            .await
            .messages
            .insert(message.id, message.clone());
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        self.inner
            .read()
            .await
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("message".into()))
    }

    async fn mark_delivered(&self, ids: &[Uuid]) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        for id in ids {
            if let Some(msg) = inner.messages.get_mut(id) {
                if msg.status == DeliveryStatus::Sent {
                    msg.status = DeliveryStatus::Delivered;
                    msg.delivered_at = Some(now);
                }
            }
        }
        Ok(())
    }

    async fn mark_read(&self, ids: &[Uuid], reader: Uuid) -> AppResult<Vec<Message>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut updated = Vec::new();
        for id in ids {
            if let Some(msg) = inner.messages.get_mut(id) {
                if msg.receiver_id == Some(reader)
                    && msg.status != DeliveryStatus::Read
                    && !msg.deleted_for_everyone
                {
                    msg.status = DeliveryStatus::Read;
                    msg.read_at = Some(now);
                    updated.push(msg.clone());
                }
            }
        }
        Ok(updated)
    }

    async fn set_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let msg = inner
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message".into()))?;
        msg.reactions.retain(|r| r.user_id != user_id);
        msg.reactions.push(Reaction {
            user_id,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn update_content(
        &self,
        message_id: Uuid,
        ciphertext: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let msg = inner
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message".into()))?;
        msg.content = Some(ciphertext.to_string());
        msg.edited = true;
        msg.edited_at = Some(edited_at);
        Ok(())
    }

    async fn mark_deleted_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let msg = inner
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message".into()))?;
        if !msg.deleted_for.contains(&user_id) {
            msg.deleted_for.push(user_id);
        }
        Ok(())
    }

    async fn mark_deleted_for_everyone(
        &self,
        message_id: Uuid,
        tombstone: &str,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let msg = inner
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message".into()))?;
        msg.deleted_for_everyone = true;
        msg.deleted_at = Some(deleted_at);
        msg.content = Some(tombstone.to_string());
        Ok(())
    }

    async fn get_conversation(
        &self,
        viewer: Uuid,
        peer: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut page: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| {
                (m.sender_id == viewer && m.receiver_id == Some(peer))
                    || (m.sender_id == peer && m.receiver_id == Some(viewer))
            })
            .filter(|m| !m.deleted_for_everyone && !m.deleted_for.contains(&viewer))
            .filter(|m| before.map(|b| m.created_at < b).unwrap_or(true))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        page.truncate(limit.max(0) as usize);
        Ok(page)
    }

    async fn unread_counts(&self, receiver: Uuid) -> AppResult<Vec<(Uuid, i64)>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for msg in inner.messages.values() {
            if msg.receiver_id == Some(receiver)
                && msg.status != DeliveryStatus::Read
                && !msg.deleted_for_everyone
            {
                *counts.entry(msg.sender_id).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn increment_messages_sent(&self, user_id: Uuid) -> AppResult<()> {
        if let Some(user) = self.inner.write().await.users.get_mut(&user_id) {
            user.messages_sent += 1;
        }
        Ok(())
    }

    async fn get_group(&self, id: Uuid) -> AppResult<Group> {
        self.inner
            .read()
            .await
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("group".into()))
    }
}
