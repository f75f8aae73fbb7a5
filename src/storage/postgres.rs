use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    DeliveryStatus, Group, Message, MessageType, PresenceStatus, Reaction, User,
};

use super::ChatStore;

/// Postgres-backed store. Reactions live in their own table keyed by
/// (message_id, user_id) so the one-reaction-per-user invariant is a
/// primary-key upsert.
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn message_from_row(row: &PgRow) -> AppResult<Message> {
        let message_type: String = row.try_get("message_type")?;
        let status: String = row.try_get("status")?;
        let media: Option<serde_json::Value> = row.try_get("media")?;
        let location: Option<serde_json::Value> = row.try_get("location")?;
        let contact: Option<serde_json::Value> = row.try_get("contact")?;
        let gift: Option<serde_json::Value> = row.try_get("gift")?;

        Ok(Message {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            group_id: row.try_get("group_id")?,
            message_type: message_type
                .parse::<MessageType>()
                .map_err(AppError::Config)?,
            content: row.try_get("content")?,
            media: media.map(serde_json::from_value).transpose()?,
            location: location.map(serde_json::from_value).transpose()?,
            contact: contact.map(serde_json::from_value).transpose()?,
            gift: gift.map(serde_json::from_value).transpose()?,
            reply_to: row.try_get("reply_to")?,
            status: status.parse::<DeliveryStatus>().map_err(AppError::Config)?,
            created_at: row.try_get("created_at")?,
            delivered_at: row.try_get("delivered_at")?,
            read_at: row.try_get("read_at")?,
            edited: row.try_get("edited")?,
            edited_at: row.try_get("edited_at")?,
            deleted_for_everyone: row.try_get("deleted_for_everyone")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_for: row.try_get("deleted_for")?,
            reactions: Vec::new(),
        })
    }

    async fn attach_reactions(&self, messages: &mut [Message]) -> AppResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let rows = sqlx::query(
            "SELECT message_id, user_id, emoji, created_at \
             FROM message_reactions WHERE message_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for row in rows {
            let message_id: Uuid = row.try_get("message_id")?;
            by_message.entry(message_id).or_default().push(Reaction {
                user_id: row.try_get("user_id")?,
                emoji: row.try_get("emoji")?,
                created_at: row.try_get("created_at")?,
            });
        }
        for message in messages.iter_mut() {
            message.reactions = by_message.remove(&message.id).unwrap_or_default();
        }
        Ok(())
    }
}

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, group_id, message_type, content, \
     media, location, contact, gift, reply_to, status, created_at, delivered_at, read_at, \
     edited, edited_at, deleted_for_everyone, deleted_at, deleted_for";

#[async_trait]
impl ChatStore for PgStore {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        let row = sqlx::query(
            "SELECT id, username, full_name, avatar_url, status, last_seen, fcm_tokens, \
             push_enabled, messages_sent FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

        let status: String = row.try_get("status")?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            full_name: row.try_get("full_name")?,
            avatar_url: row.try_get("avatar_url")?,
            status: status.parse::<PresenceStatus>().map_err(AppError::Config)?,
            last_seen: row.try_get("last_seen")?,
            fcm_tokens: row.try_get("fcm_tokens")?,
            push_enabled: row.try_get("push_enabled")?,
            messages_sent: row.try_get("messages_sent")?,
        })
    }

    async fn save_user(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET username = $2, full_name = $3, avatar_url = $4, status = $5, \
             last_seen = $6, fcm_tokens = $7, push_enabled = $8, messages_sent = $9 \
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.avatar_url)
        .bind(user.status.as_str())
        .bind(user.last_seen)
        .bind(&user.fcm_tokens)
        .bind(user.push_enabled)
        .bind(user.messages_sent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_token(&self, token: &str) -> AppResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE api_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_friends(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT friend_id FROM friendships WHERE user_id = $1 AND status = 'accepted'",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM blocked_users WHERE blocker_id = $1 AND blocked_id = $2",
        )
        .bind(blocker)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        Ok(found > 0)
    }

    async fn create_message(&self, message: &Message) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, group_id, message_type, content, \
             media, location, contact, gift, reply_to, status, created_at, deleted_for) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.group_id)
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(message.media.as_ref().map(serde_json::to_value).transpose()?)
        .bind(
            message
                .location
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            message
                .contact
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(message.gift.as_ref().map(serde_json::to_value).transpose()?)
        .bind(message.reply_to)
        .bind(message.status.as_str())
        .bind(message.created_at)
        .bind(&message.deleted_for)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("message".into()))?;

        let mut messages = vec![Self::message_from_row(&row)?];
        self.attach_reactions(&mut messages).await?;
        Ok(messages.remove(0))
    }

    async fn mark_delivered(&self, ids: &[Uuid]) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET status = 'delivered', delivered_at = NOW() \
             WHERE id = ANY($1) AND status = 'sent'",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_read(&self, ids: &[Uuid], reader: Uuid) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "UPDATE messages SET status = 'read', read_at = NOW() \
             WHERE id = ANY($1) AND receiver_id = $2 AND status <> 'read' \
             AND deleted_for_everyone = FALSE \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(ids)
        .bind(reader)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::message_from_row).collect()
    }

    async fn set_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_reactions (message_id, user_id, emoji, created_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (message_id, user_id) \
             DO UPDATE SET emoji = EXCLUDED.emoji, created_at = EXCLUDED.created_at",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_content(
        &self,
        message_id: Uuid,
        ciphertext: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET content = $2, edited = TRUE, edited_at = $3 WHERE id = $1",
        )
        .bind(message_id)
        .bind(ciphertext)
        .bind(edited_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_deleted_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET deleted_for = array_append(deleted_for, $2) \
             WHERE id = $1 AND NOT deleted_for @> ARRAY[$2]::uuid[]",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_deleted_for_everyone(
        &self,
        message_id: Uuid,
        tombstone: &str,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET deleted_for_everyone = TRUE, deleted_at = $3, content = $2 \
             WHERE id = $1 AND deleted_for_everyone = FALSE",
        )
        .bind(message_id)
        .bind(tombstone)
        .bind(deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(
        &self,
        viewer: Uuid,
        peer: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE ((sender_id = $1 AND receiver_id = $2) \
                 OR (sender_id = $2 AND receiver_id = $1)) \
             AND deleted_for_everyone = FALSE \
             AND NOT deleted_for @> ARRAY[$1]::uuid[] \
             AND ($4::timestamptz IS NULL OR created_at < $4) \
             ORDER BY created_at DESC LIMIT $3"
        ))
        .bind(viewer)
        .bind(peer)
        .bind(limit)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<AppResult<_>>()?;
        self.attach_reactions(&mut messages).await?;
        Ok(messages)
    }

    async fn unread_counts(&self, receiver: Uuid) -> AppResult<Vec<(Uuid, i64)>> {
        let rows = sqlx::query(
            "SELECT sender_id, COUNT(*) AS unread FROM messages \
             WHERE receiver_id = $1 AND status <> 'read' AND deleted_for_everyone = FALSE \
             GROUP BY sender_id",
        )
        .bind(receiver)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("sender_id")?, row.try_get("unread")?)))
            .collect()
    }

    async fn increment_messages_sent(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET messages_sent = messages_sent + 1 WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_group(&self, id: Uuid) -> AppResult<Group> {
        let row = sqlx::query("SELECT id, name, only_admins_can_post FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("group".into()))?;

        let members = sqlx::query(
            "SELECT user_id, role FROM group_members WHERE group_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut member_ids = Vec::with_capacity(members.len());
        let mut admin_ids = Vec::new();
        for member in members {
            let user_id: Uuid = member.try_get("user_id")?;
            let role: String = member.try_get("role")?;
            member_ids.push(user_id);
            if role == "admin" {
                admin_ids.push(user_id);
            }
        }

        Ok(Group {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            members: member_ids,
            admins: admin_ids,
            only_admins_can_post: row.try_get("only_admins_can_post")?,
        })
    }
}
