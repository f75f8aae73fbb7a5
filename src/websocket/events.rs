//! Outbound event vocabulary for the live connection.
//!
//! Every event serializes to a flat JSON object:
//!
//! ```json
//! {
//!     "type": "new_message",
//!     "timestamp": "2026-08-07T10:30:00Z",
//!     ...event fields...
//! }
//! ```
//!
//! Payloads carry enough identity (sender/target ids, message id,
//! timestamps) for a client to update local state without a follow-up
//! fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::MessageView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Voice,
    Video,
}

/// Events emitted to live connections. The enum is exhaustive; the flat
/// payload shape is produced by `to_payload`, serialization happens
/// nowhere else.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    NewMessage {
        message: MessageView,
    },
    GroupMessage {
        group_id: Uuid,
        message: MessageView,
    },
    MessagesRead {
        message_ids: Vec<Uuid>,
        by: Uuid,
        read_at: DateTime<Utc>,
    },
    MessageReaction {
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },
    MessageEdited {
        message_id: Uuid,
        content: String,
        edited_at: DateTime<Utc>,
    },
    MessageDeleted {
        message_id: Uuid,
        for_everyone: bool,
    },
    FriendOnline {
        user_id: Uuid,
    },
    FriendOffline {
        user_id: Uuid,
        last_seen: DateTime<Utc>,
    },
    NewStatus {
        user_id: Uuid,
        status_id: Uuid,
    },
    Typing {
        user_id: Uuid,
        is_typing: bool,
    },
    IncomingCall {
        caller_id: Uuid,
        call_type: CallType,
        signal_data: Value,
    },
    CallAccepted {
        by: Uuid,
        signal_data: Value,
    },
    CallRejected {
        by: Uuid,
    },
    CallEnded {
        by: Uuid,
    },
    /// Reported back on the initiating connection when an inbound action
    /// fails; a failure is never silently dropped.
    ActionFailed {
        action: String,
        kind: String,
        message: String,
    },
}

impl OutboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::GroupMessage { .. } => "group_message",
            Self::MessagesRead { .. } => "messages_read",
            Self::MessageReaction { .. } => "message_reaction",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::FriendOnline { .. } => "friend_online",
            Self::FriendOffline { .. } => "friend_offline",
            Self::NewStatus { .. } => "new_status",
            Self::Typing { .. } => "typing",
            Self::IncomingCall { .. } => "incoming_call",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::CallEnded { .. } => "call_ended",
            Self::ActionFailed { .. } => "error",
        }
    }

    /// Serializes to the flat wire payload. Event fields land next to
    /// `type` and `timestamp`, never nested under a data key.
    pub fn to_payload(&self) -> AppResult<String> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Value::Object(fields) = serde_json::to_value(self)? {
            for (key, value) in fields {
                payload[key] = value;
            }
        }
        Ok(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_wire_names() {
        let event = OutboundEvent::FriendOnline {
            user_id: Uuid::new_v4(),
        };
        assert_eq!(event.event_type(), "friend_online");

        let event = OutboundEvent::MessagesRead {
            message_ids: vec![Uuid::new_v4()],
            by: Uuid::new_v4(),
            read_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "messages_read");
    }

    #[test]
    fn payload_is_flat() {
        let user_id = Uuid::new_v4();
        let event = OutboundEvent::Typing {
            user_id,
            is_typing: true,
        };

        let payload = event.to_payload().unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(parsed["type"], "typing");
        assert_eq!(parsed["user_id"], user_id.to_string());
        assert_eq!(parsed["is_typing"], true);
        assert!(parsed["timestamp"].is_string());
        assert!(parsed.get("data").is_none());
    }

    #[test]
    fn all_event_types_are_unique() {
        let user = Uuid::new_v4();
        let types = [
            OutboundEvent::FriendOnline { user_id: user }.event_type(),
            OutboundEvent::FriendOffline {
                user_id: user,
                last_seen: Utc::now(),
            }
            .event_type(),
            OutboundEvent::Typing {
                user_id: user,
                is_typing: false,
            }
            .event_type(),
            OutboundEvent::CallRejected { by: user }.event_type(),
            OutboundEvent::CallEnded { by: user }.event_type(),
            OutboundEvent::MessageDeleted {
                message_id: user,
                for_everyone: true,
            }
            .event_type(),
            OutboundEvent::NewStatus {
                user_id: user,
                status_id: user,
            }
            .event_type(),
        ];
        let unique: std::collections::HashSet<_> = types.iter().collect();
        assert_eq!(types.len(), unique.len(), "duplicate event type detected");
    }
}
