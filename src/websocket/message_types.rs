use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::events::CallType;

/// Events a client may send over its live connection. Identity comes from
/// the authenticated connection, never from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Presence beacon: binds this connection to the user's live set.
    UserOnline,
    JoinGroup {
        group_id: Uuid,
    },
    LeaveGroup {
        group_id: Uuid,
    },
    Typing {
        receiver_id: Uuid,
        is_typing: bool,
    },
    MarkRead {
        message_ids: Vec<Uuid>,
    },
    CallRequest {
        receiver_id: Uuid,
        call_type: CallType,
        signal_data: Value,
    },
    CallAccepted {
        caller_id: Uuid,
        signal_data: Value,
    },
    CallRejected {
        caller_id: Uuid,
    },
    CallEnded {
        peer_id: Uuid,
    },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline => "user_online",
            Self::JoinGroup { .. } => "join_group",
            Self::LeaveGroup { .. } => "leave_group",
            Self::Typing { .. } => "typing",
            Self::MarkRead { .. } => "mark_read",
            Self::CallRequest { .. } => "call_request",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::CallEnded { .. } => "call_ended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_events() {
        let group_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"join_group","group_id":"{group_id}"}}"#);
        match serde_json::from_str::<InboundEvent>(&raw).unwrap() {
            InboundEvent::JoinGroup { group_id: parsed } => assert_eq!(parsed, group_id),
            other => panic!("unexpected event: {other:?}"),
        }

        let raw = r#"{"type":"user_online"}"#;
        assert!(matches!(
            serde_json::from_str::<InboundEvent>(raw).unwrap(),
            InboundEvent::UserOnline
        ));
    }

    #[test]
    fn rejects_unknown_event_type() {
        let raw = r#"{"type":"self_destruct"}"#;
        assert!(serde_json::from_str::<InboundEvent>(raw).is_err());
    }
}
