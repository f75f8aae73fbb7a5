use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub mod events;
pub mod fanout;
pub mod handlers;
pub mod message_types;
pub mod signaling;

pub type ConnectionId = Uuid;
pub type OutboundSender = UnboundedSender<Message>;

/// One live transport session for one user/device. The sender side is the
/// connection's outbound queue: fanout enqueues, the connection task drains.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: Uuid,
    sender: OutboundSender,
}

impl ConnectionHandle {
    pub fn new(user_id: Uuid, sender: OutboundSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
        }
    }
}

struct RoomMember {
    user_id: Uuid,
    sender: OutboundSender,
}

/// Maps users to their live connections and group rooms to their joined
/// connections. A user may hold any number of concurrent handles
/// (multi-device); presence transitions fire only on the 0->1 and 1->0
/// edges, which `register`/`unregister` report from the same map mutation.
///
/// All operations are short map updates, safe under concurrent invocation
/// from independent connection tasks. No state survives a process restart.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    users: Arc<DashMap<Uuid, HashMap<ConnectionId, OutboundSender>>>,
    rooms: Arc<DashMap<Uuid, HashMap<ConnectionId, RoomMember>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the handle to the user's live set. Returns true when this was
    /// the user's first live connection.
    pub fn register(&self, handle: &ConnectionHandle) -> bool {
        let mut entry = self.users.entry(handle.user_id).or_default();
        entry.insert(handle.id, handle.sender.clone());
        entry.len() == 1
    }

    /// Removes exactly this handle. Returns true when it was the user's
    /// last live connection.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let last = {
            match self.users.get_mut(&handle.user_id) {
                Some(mut entry) => entry.remove(&handle.id).is_some() && entry.is_empty(),
                None => false,
            }
        };
        if last {
            self.users.remove_if(&handle.user_id, |_, set| set.is_empty());
        }
        last
    }

    /// All live outbound queues for a user; empty when offline.
    pub fn lookup(&self, user_id: Uuid) -> Vec<OutboundSender> {
        self.users
            .get(&user_id)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users
            .get(&user_id)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    pub fn live_connections(&self, user_id: Uuid) -> usize {
        self.users.get(&user_id).map(|entry| entry.len()).unwrap_or(0)
    }

    pub fn join_room(&self, handle: &ConnectionHandle, room_id: Uuid) {
        self.rooms.entry(room_id).or_default().insert(
            handle.id,
            RoomMember {
                user_id: handle.user_id,
                sender: handle.sender.clone(),
            },
        );
    }

    pub fn leave_room(&self, handle: &ConnectionHandle, room_id: Uuid) {
        let emptied = {
            match self.rooms.get_mut(&room_id) {
                Some(mut members) => {
                    members.remove(&handle.id);
                    members.is_empty()
                }
                None => false,
            }
        };
        if emptied {
            self.rooms.remove_if(&room_id, |_, members| members.is_empty());
        }
    }

    /// Outbound queues of every connection joined to the room, minus the
    /// excluded user's connections (a sender does not get its own echo).
    pub fn room_senders(&self, room_id: Uuid, exclude_user: Option<Uuid>) -> Vec<OutboundSender> {
        self.rooms
            .get(&room_id)
            .map(|members| {
                members
                    .values()
                    .filter(|m| exclude_user != Some(m.user_id))
                    .map(|m| m.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
