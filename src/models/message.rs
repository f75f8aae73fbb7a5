use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery lifecycle of a message. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }

    /// Position in the sent -> delivered -> read progression.
    pub fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::Sent => 0,
            DeliveryStatus::Delivered => 1,
            DeliveryStatus::Read => 2,
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    File,
    Location,
    Contact,
    Gift,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::File => "file",
            MessageType::Location => "location",
            MessageType::Contact => "contact",
            MessageType::Gift => "gift",
            MessageType::System => "system",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "video" => Ok(MessageType::Video),
            "audio" => Ok(MessageType::Audio),
            "file" => Ok(MessageType::File),
            "location" => Ok(MessageType::Location),
            "contact" => Ok(MessageType::Contact),
            "gift" => Ok(MessageType::Gift),
            "system" => Ok(MessageType::System),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// One reaction per user; a newer reaction replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Seconds, for audio/video payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftKind {
    Rose,
    Teddy,
    Diamond,
    Crown,
    Star,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftInfo {
    pub kind: GiftKind,
    pub stars_value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
}

/// A stored message. Text content is held as ciphertext; every other type
/// carries an unencrypted reference (URL, coordinates, contact card, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    /// Set for direct messages, mutually exclusive with `group_id`.
    pub receiver_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub media: Option<MediaInfo>,
    pub location: Option<LocationInfo>,
    pub contact: Option<ContactInfo>,
    pub gift: Option<GiftInfo>,
    pub reply_to: Option<Uuid>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_for_everyone: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Users who removed this message from their own view.
    pub deleted_for: Vec<Uuid>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn is_direct(&self) -> bool {
        self.receiver_id.is_some()
    }

    /// Sender or direct receiver. Group membership is a storage question
    /// and is checked by the caller.
    pub fn is_direct_participant(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == Some(user_id)
    }

    /// The other side of a direct conversation, from `user_id`'s view.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.sender_id == user_id {
            self.receiver_id
        } else if self.receiver_id == Some(user_id) {
            Some(self.sender_id)
        } else {
            None
        }
    }

    /// Builds the outbound view of this message with `content` already
    /// rendered (decrypted plaintext, placeholder, or raw reference).
    pub fn view_with_content(&self, content: Option<String>) -> MessageView {
        MessageView {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            group_id: self.group_id,
            message_type: self.message_type,
            content,
            media: self.media.clone(),
            location: self.location.clone(),
            contact: self.contact.clone(),
            gift: self.gift.clone(),
            reply_to: self.reply_to,
            status: self.status,
            created_at: self.created_at,
            edited: self.edited,
            edited_at: self.edited_at,
            deleted_for_everyone: self.deleted_for_everyone,
            reactions: self.reactions.clone(),
        }
    }
}

/// Plaintext-side projection of a message, used in event payloads and API
/// responses. Carries enough identity for a client to update local state
/// without a follow-up fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub sender_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift: Option<GiftInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_for_everyone: bool,
    pub reactions: Vec<Reaction>,
}
