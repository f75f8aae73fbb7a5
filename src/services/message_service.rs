use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    ContactInfo, DeliveryStatus, GiftInfo, LocationInfo, MediaInfo, Message, MessageType,
    MessageView, User,
};
use crate::storage::ChatStore;
use crate::websocket::events::OutboundEvent;
use crate::websocket::fanout::FanoutRouter;

use super::encryption::ContentCipher;
use super::push::PushProvider;

/// Irreversible placeholder written over deleted-for-everyone content.
pub const DELETED_TOMBSTONE: &str = "[This message was deleted]";
/// Shown when a stored ciphertext cannot be opened; the rest of the page
/// still renders.
pub const DECRYPT_PLACEHOLDER: &str = "[Unable to decrypt]";

const MAX_EMOJI_LEN: usize = 20;
const MAX_PAGE_SIZE: i64 = 200;
const DEFAULT_PAGE_SIZE: i64 = 50;

/// Payload of an outgoing message, as accepted from the transport layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub media: Option<MediaInfo>,
    pub location: Option<LocationInfo>,
    pub contact: Option<ContactInfo>,
    pub gift: Option<GiftInfo>,
    pub reply_to: Option<Uuid>,
}

impl OutgoingMessage {
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub sender_id: Uuid,
    pub count: i64,
}

/// Governs the message lifecycle (sent -> delivered -> read, edit, delete,
/// react) and produces the events the fanout router propagates. Storage is
/// the only place state is held; no in-memory lock is kept across a
/// storage call.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    cipher: ContentCipher,
    fanout: FanoutRouter,
    push: Option<Arc<dyn PushProvider>>,
    edit_window: Duration,
    edit_window_minutes: i64,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        cipher: ContentCipher,
        fanout: FanoutRouter,
        push: Option<Arc<dyn PushProvider>>,
        edit_window_minutes: i64,
    ) -> Self {
        Self {
            store,
            cipher,
            fanout,
            push,
            edit_window: Duration::minutes(edit_window_minutes),
            edit_window_minutes,
        }
    }

    /// Sends a direct message. The stored record keeps the ciphertext; the
    /// recipient-side event carries a transient plaintext view. Returns the
    /// sender's view of the stored message.
    pub async fn send_direct(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        message_type: MessageType,
        outgoing: OutgoingMessage,
    ) -> AppResult<MessageView> {
        if sender_id == receiver_id {
            return Err(AppError::BadRequest(
                "cannot send a message to yourself".into(),
            ));
        }

        let sender = self.store.get_user(sender_id).await?;
        let receiver = self.store.get_user(receiver_id).await?;
        if self.store.is_blocked(sender_id, receiver_id).await? {
            return Err(AppError::Forbidden("you have blocked this user".into()));
        }
        if self.store.is_blocked(receiver_id, sender_id).await? {
            return Err(AppError::Forbidden("you are blocked by this user".into()));
        }

        let (stored, plaintext) = self.prepare_content(message_type, &outgoing)?;
        let message = build_message(
            sender_id,
            Some(receiver_id),
            None,
            message_type,
            stored,
            &outgoing,
        );
        self.store.create_message(&message).await?;
        self.store.increment_messages_sent(sender_id).await?;
        metrics::MESSAGES_SENT_TOTAL
            .with_label_values(&["direct"])
            .inc();

        let mut view = message.view_with_content(plaintext.clone());
        let reached = self
            .fanout
            .notify_user(receiver_id, &OutboundEvent::NewMessage { message: view.clone() });
        if reached > 0 {
            self.store.mark_delivered(&[message.id]).await?;
            view.status = DeliveryStatus::Delivered;
        }

        self.push_new_message(&sender, &receiver, message_type, plaintext.as_deref(), message.id, reached)
            .await;

        Ok(view)
    }

    /// Sends a message to a group room. Block checks do not apply; posting
    /// rights do.
    pub async fn send_group(
        &self,
        sender_id: Uuid,
        group_id: Uuid,
        message_type: MessageType,
        outgoing: OutgoingMessage,
    ) -> AppResult<MessageView> {
        let group = self.store.get_group(group_id).await?;
        if !group.is_member(sender_id) {
            return Err(AppError::Forbidden("not a member of this group".into()));
        }
        if group.only_admins_can_post && !group.is_admin(sender_id) {
            return Err(AppError::Forbidden(
                "only admins can post in this group".into(),
            ));
        }

        let (stored, plaintext) = self.prepare_content(message_type, &outgoing)?;
        let message = build_message(sender_id, None, Some(group_id), message_type, stored, &outgoing);
        self.store.create_message(&message).await?;
        self.store.increment_messages_sent(sender_id).await?;
        metrics::MESSAGES_SENT_TOTAL
            .with_label_values(&["group"])
            .inc();

        let view = message.view_with_content(plaintext);
        self.fanout.notify_group(
            group_id,
            &OutboundEvent::GroupMessage {
                group_id,
                message: view.clone(),
            },
            Some(sender_id),
        );
        Ok(view)
    }

    /// Bulk read receipt. First write wins; ids that do not match (unknown,
    /// already read, not addressed to the reader) are skipped, not errors.
    /// One `messages_read` event goes to each distinct sender among the
    /// messages that actually transitioned.
    pub async fn mark_read(&self, reader_id: Uuid, message_ids: &[Uuid]) -> AppResult<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let updated = self.store.mark_read(message_ids, reader_id).await?;

        let mut by_sender: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut read_at = Utc::now();
        for message in &updated {
            by_sender
                .entry(message.sender_id)
                .or_default()
                .push(message.id);
            if let Some(at) = message.read_at {
                read_at = at;
            }
        }
        for (sender_id, ids) in by_sender {
            self.fanout.notify_user(
                sender_id,
                &OutboundEvent::MessagesRead {
                    message_ids: ids,
                    by: reader_id,
                    read_at,
                },
            );
        }
        Ok(updated.len())
    }

    /// Adds or replaces the user's reaction and tells the other side.
    pub async fn react(&self, user_id: Uuid, message_id: Uuid, emoji: &str) -> AppResult<()> {
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_LEN {
            return Err(AppError::BadRequest("invalid emoji".into()));
        }

        let message = self.store.get_message(message_id).await?;
        self.ensure_participant(&message, user_id).await?;
        if message.deleted_for_everyone {
            return Err(AppError::InvalidState("message was deleted".into()));
        }

        self.store.set_reaction(message_id, user_id, emoji).await?;

        let event = OutboundEvent::MessageReaction {
            message_id,
            user_id,
            emoji: emoji.to_string(),
        };
        self.notify_other_side(&message, user_id, &event);
        Ok(())
    }

    /// Edits a text message within the window. Content is re-encrypted;
    /// the edited flag never comes back off.
    pub async fn edit(&self, user_id: Uuid, message_id: Uuid, new_content: &str) -> AppResult<()> {
        if new_content.trim().is_empty() {
            return Err(AppError::BadRequest("message content is required".into()));
        }

        let message = self.store.get_message(message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::Forbidden("only the sender can edit a message".into()));
        }
        if message.message_type != MessageType::Text {
            return Err(AppError::InvalidState(
                "only text messages can be edited".into(),
            ));
        }
        if message.deleted_for_everyone {
            return Err(AppError::InvalidState("message was deleted".into()));
        }
        if Utc::now() - message.created_at > self.edit_window {
            return Err(AppError::Expired {
                window_minutes: self.edit_window_minutes,
            });
        }

        let ciphertext = self.cipher.encrypt(new_content)?;
        let edited_at = Utc::now();
        self.store
            .update_content(message_id, &ciphertext, edited_at)
            .await?;

        let event = OutboundEvent::MessageEdited {
            message_id,
            content: new_content.to_string(),
            edited_at,
        };
        self.notify_other_side(&message, user_id, &event);
        Ok(())
    }

    /// Deletes a message. `for_everyone = false` only marks the caller's
    /// view and emits nothing. `for_everyone = true` is sender-only, bound
    /// to the window, tombstones the content irreversibly, and is
    /// idempotent.
    pub async fn delete(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        for_everyone: bool,
    ) -> AppResult<()> {
        let message = self.store.get_message(message_id).await?;

        if !for_everyone {
            self.ensure_participant(&message, user_id).await?;
            self.store.mark_deleted_for(message_id, user_id).await?;
            return Ok(());
        }

        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "only the sender can delete for everyone".into(),
            ));
        }
        if message.deleted_for_everyone {
            return Ok(());
        }
        if Utc::now() - message.created_at > self.edit_window {
            return Err(AppError::Expired {
                window_minutes: self.edit_window_minutes,
            });
        }

        self.store
            .mark_deleted_for_everyone(message_id, DELETED_TOMBSTONE, Utc::now())
            .await?;

        let event = OutboundEvent::MessageDeleted {
            message_id,
            for_everyone: true,
        };
        self.notify_other_side(&message, user_id, &event);
        Ok(())
    }

    /// Messages between the pair as seen by `viewer`, chronological order.
    /// Text bodies are decrypted; a single unreadable ciphertext degrades
    /// to a placeholder instead of failing the page.
    pub async fn get_conversation(
        &self,
        viewer: Uuid,
        peer: Uuid,
        limit: Option<i64>,
        before: Option<chrono::DateTime<Utc>>,
    ) -> AppResult<Vec<MessageView>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut page = self.store.get_conversation(viewer, peer, limit, before).await?;
        page.reverse();

        Ok(page
            .iter()
            .map(|message| {
                let content = self.render_content(message);
                message.view_with_content(content)
            })
            .collect())
    }

    pub async fn unread_counts(&self, receiver: Uuid) -> AppResult<Vec<UnreadCount>> {
        let counts = self.store.unread_counts(receiver).await?;
        Ok(counts
            .into_iter()
            .map(|(sender_id, count)| UnreadCount { sender_id, count })
            .collect())
    }

    /// Fans a `new_status` event to the poster's accepted friends. Storage
    /// of the status itself belongs to the document store.
    pub async fn announce_status(&self, user_id: Uuid, status_id: Uuid) -> AppResult<usize> {
        self.fanout
            .notify_friends(user_id, &OutboundEvent::NewStatus { user_id, status_id })
            .await
    }

    /// Encrypts text bodies; every other type carries its reference as-is.
    /// Returns (stored content, plaintext for the outbound event).
    fn prepare_content(
        &self,
        message_type: MessageType,
        outgoing: &OutgoingMessage,
    ) -> AppResult<(Option<String>, Option<String>)> {
        match message_type {
            MessageType::Text => {
                let plaintext = outgoing
                    .content
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest("text messages require content".into())
                    })?;
                let ciphertext = self.cipher.encrypt(plaintext)?;
                Ok((Some(ciphertext), Some(plaintext.to_string())))
            }
            _ => Ok((outgoing.content.clone(), outgoing.content.clone())),
        }
    }

    fn render_content(&self, message: &Message) -> Option<String> {
        let content = message.content.as_deref()?;
        if message.message_type != MessageType::Text || message.deleted_for_everyone {
            return Some(content.to_string());
        }
        match self.cipher.decrypt(content) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to decrypt message content");
                Some(DECRYPT_PLACEHOLDER.to_string())
            }
        }
    }

    /// Sender or direct receiver; for group messages, any current member.
    async fn ensure_participant(&self, message: &Message, user_id: Uuid) -> AppResult<()> {
        if message.is_direct_participant(user_id) {
            return Ok(());
        }
        if let Some(group_id) = message.group_id {
            let group = self.store.get_group(group_id).await?;
            if group.is_member(user_id) {
                return Ok(());
            }
        }
        Err(AppError::Forbidden("not a participant of this message".into()))
    }

    /// Direct message: the counterpart's devices. Group message: the group
    /// room minus the actor.
    fn notify_other_side(&self, message: &Message, actor: Uuid, event: &OutboundEvent) {
        if let Some(peer) = message.counterpart(actor) {
            self.fanout.notify_user(peer, event);
        } else if let Some(group_id) = message.group_id {
            self.fanout.notify_group(group_id, event, Some(actor));
        }
    }

    /// Push path after a direct send: attempted when the receiver had no
    /// live connection or keeps push enabled. Failures are logged and
    /// swallowed, never surfaced to the sender.
    async fn push_new_message(
        &self,
        sender: &User,
        receiver: &User,
        message_type: MessageType,
        plaintext: Option<&str>,
        message_id: Uuid,
        reached: usize,
    ) {
        let Some(push) = self.push.as_ref() else {
            return;
        };
        if reached > 0 && !receiver.push_enabled {
            return;
        }
        if receiver.fcm_tokens.is_empty() {
            return;
        }

        let body = match (message_type, plaintext) {
            (MessageType::Text, Some(text)) => text.to_string(),
            _ => format!("Sent a {}", message_type.as_str()),
        };
        let data = serde_json::json!({
            "type": "new_message",
            "message_id": message_id,
            "sender_id": sender.id,
        });

        if let Err(e) = push
            .notify(&receiver.fcm_tokens, sender.display_name(), &body, &data)
            .await
        {
            debug!(receiver = %receiver.id, error = %e, "push attempt failed");
        }
    }
}

fn build_message(
    sender_id: Uuid,
    receiver_id: Option<Uuid>,
    group_id: Option<Uuid>,
    message_type: MessageType,
    content: Option<String>,
    outgoing: &OutgoingMessage,
) -> Message {
    Message {
        id: Uuid::new_v4(),
        sender_id,
        receiver_id,
        group_id,
        message_type,
        content,
        media: outgoing.media.clone(),
        location: outgoing.location.clone(),
        contact: outgoing.contact.clone(),
        gift: outgoing.gift.clone(),
        reply_to: outgoing.reply_to,
        status: DeliveryStatus::Sent,
        created_at: Utc::now(),
        delivered_at: None,
        read_at: None,
        edited: false,
        edited_at: None,
        deleted_for_everyone: false,
        deleted_at: None,
        deleted_for: Vec::new(),
        reactions: Vec::new(),
    }
}
