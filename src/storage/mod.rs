use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Group, Message, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// The storage collaborator. Everything durable lives behind this trait;
/// the realtime core only mutates message lifecycle fields through it and
/// never holds an in-memory lock across these calls.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<User>;

    async fn save_user(&self, user: &User) -> AppResult<()>;

    /// Resolves an opaque bearer token to a user id.
    async fn find_user_by_token(&self, token: &str) -> AppResult<Option<Uuid>>;

    /// Accepted friends only.
    async fn get_friends(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Whether `blocker` has blocked `target`.
    async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> AppResult<bool>;

    async fn create_message(&self, message: &Message) -> AppResult<()>;

    async fn get_message(&self, id: Uuid) -> AppResult<Message>;

    /// Sent -> Delivered, timestamp written at most once. Ids in any other
    /// state are left untouched.
    async fn mark_delivered(&self, ids: &[Uuid]) -> AppResult<()>;

    /// Bulk Sent/Delivered -> Read for messages addressed to `reader`.
    /// First write wins; non-matching ids are skipped, not errors.
    /// Returns the messages that actually transitioned.
    async fn mark_read(&self, ids: &[Uuid], reader: Uuid) -> AppResult<Vec<Message>>;

    /// Upserts the user's reaction, replacing any previous one.
    async fn set_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> AppResult<()>;

    async fn update_content(
        &self,
        message_id: Uuid,
        ciphertext: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Idempotent per-user delete marker.
    async fn mark_deleted_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()>;

    /// Replaces content with the tombstone and flags the message. The
    /// flag never comes back off.
    async fn mark_deleted_for_everyone(
        &self,
        message_id: Uuid,
        tombstone: &str,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Messages between the pair as seen by `viewer`: excludes
    /// deleted-for-everyone and viewer-deleted ones, newest first.
    async fn get_conversation(
        &self,
        viewer: Uuid,
        peer: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>>;

    /// Unread (sent/delivered) message count per sender for `receiver`.
    async fn unread_counts(&self, receiver: Uuid) -> AppResult<Vec<(Uuid, i64)>>;

    async fn increment_messages_sent(&self, user_id: Uuid) -> AppResult<()>;

    async fn get_group(&self, id: Uuid) -> AppResult<Group>;
}
