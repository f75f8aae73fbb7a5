use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::events::{CallType, OutboundEvent};
use super::fanout::FanoutRouter;

/// Stateless pass-through for call signaling and typing indicators between
/// two connected peers. Payloads are forwarded verbatim with the origin
/// attached; nothing is persisted or retried. When the peer has no live
/// connection the signal is dropped.
#[derive(Clone)]
pub struct SignalRelay {
    fanout: FanoutRouter,
}

impl SignalRelay {
    pub fn new(fanout: FanoutRouter) -> Self {
        Self { fanout }
    }

    pub fn typing(&self, from: Uuid, to: Uuid, is_typing: bool) -> usize {
        self.relay(
            to,
            OutboundEvent::Typing {
                user_id: from,
                is_typing,
            },
        )
    }

    pub fn call_request(&self, from: Uuid, to: Uuid, call_type: CallType, signal_data: Value) -> usize {
        self.relay(
            to,
            OutboundEvent::IncomingCall {
                caller_id: from,
                call_type,
                signal_data,
            },
        )
    }

    pub fn call_accepted(&self, from: Uuid, to: Uuid, signal_data: Value) -> usize {
        self.relay(to, OutboundEvent::CallAccepted { by: from, signal_data })
    }

    pub fn call_rejected(&self, from: Uuid, to: Uuid) -> usize {
        self.relay(to, OutboundEvent::CallRejected { by: from })
    }

    pub fn call_ended(&self, from: Uuid, to: Uuid) -> usize {
        self.relay(to, OutboundEvent::CallEnded { by: from })
    }

    fn relay(&self, to: Uuid, event: OutboundEvent) -> usize {
        let reached = self.fanout.notify_user(to, &event);
        if reached == 0 {
            debug!(target_user = %to, event = event.event_type(), "peer offline, signal dropped");
        }
        reached
    }
}
