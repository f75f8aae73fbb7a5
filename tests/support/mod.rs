use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::ws::Message as WsFrame;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

use chat_service::error::AppResult;
use chat_service::models::{
    DeliveryStatus, Group, Message, MessageType, PresenceStatus, User,
};
use chat_service::services::encryption::ContentCipher;
use chat_service::services::message_service::MessageService;
use chat_service::services::presence_service::PresenceTracker;
use chat_service::services::push::PushProvider;
use chat_service::storage::{ChatStore, MemoryStore};
use chat_service::websocket::fanout::FanoutRouter;
use chat_service::websocket::signaling::SignalRelay;
use chat_service::websocket::{ConnectionHandle, ConnectionRegistry};

pub const TEST_MASTER_KEY: [u8; 32] = [9u8; 32];

/// A full wiring of the realtime core over the in-memory store, fresh per
/// test.
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub registry: ConnectionRegistry,
    pub fanout: FanoutRouter,
    pub presence: PresenceTracker,
    pub relay: SignalRelay,
    pub messages: MessageService,
    pub push: Arc<RecordingPush>,
    pub cipher: ContentCipher,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ChatStore> = store.clone();
        let registry = ConnectionRegistry::new();
        let fanout = FanoutRouter::new(registry.clone(), dyn_store.clone());
        let presence = PresenceTracker::new(dyn_store.clone(), fanout.clone());
        let relay = SignalRelay::new(fanout.clone());
        let push = Arc::new(RecordingPush::default());
        let cipher = ContentCipher::new(&TEST_MASTER_KEY);
        let messages = MessageService::new(
            dyn_store,
            cipher.clone(),
            fanout.clone(),
            Some(push.clone() as Arc<dyn PushProvider>),
            15,
        );

        Self {
            store,
            registry,
            fanout,
            presence,
            relay,
            messages,
            push,
            cipher,
        }
    }

    pub async fn add_user(&self, username: &str) -> Uuid {
        self.add_user_with_tokens(username, &[]).await
    }

    pub async fn add_user_with_tokens(&self, username: &str, tokens: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_user(User {
                id,
                username: username.to_string(),
                full_name: None,
                avatar_url: None,
                status: PresenceStatus::Offline,
                last_seen: None,
                fcm_tokens: tokens.iter().map(|t| t.to_string()).collect(),
                push_enabled: true,
                messages_sent: 0,
            })
            .await;
        id
    }

    pub async fn add_group(&self, members: &[Uuid], admins: &[Uuid], only_admins: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_group(Group {
                id,
                name: "test group".to_string(),
                members: members.to_vec(),
                admins: admins.to_vec(),
                only_admins_can_post: only_admins,
            })
            .await;
        id
    }

    /// Opens a live connection for the user and runs the presence edge the
    /// way the websocket session does on `user_online`.
    pub async fn connect(&self, user_id: Uuid) -> TestClient {
        let (tx, rx) = unbounded_channel();
        let handle = ConnectionHandle::new(user_id, tx);
        if self.registry.register(&handle) {
            self.presence
                .on_user_connected(user_id)
                .await
                .expect("presence online edge");
        }
        TestClient { handle, rx }
    }

    pub async fn disconnect(&self, client: &TestClient) {
        if self.registry.unregister(&client.handle) {
            self.presence
                .on_user_disconnected(client.handle.user_id)
                .await
                .expect("presence offline edge");
        }
    }

    /// Persists a text message directly, bypassing the service. Used to
    /// control `created_at` for window-expiry tests.
    pub async fn seed_text_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id: Some(receiver_id),
            group_id: None,
            message_type: MessageType::Text,
            content: Some(self.cipher.encrypt(text).expect("encrypt seed message")),
            media: None,
            location: None,
            contact: None,
            gift: None,
            reply_to: None,
            status: DeliveryStatus::Sent,
            created_at,
            delivered_at: None,
            read_at: None,
            edited: false,
            edited_at: None,
            deleted_for_everyone: false,
            deleted_at: None,
            deleted_for: Vec::new(),
            reactions: Vec::new(),
        };
        let id = message.id;
        self.store
            .create_message(&message)
            .await
            .expect("seed message");
        id
    }
}

/// The receiving end of one live connection.
pub struct TestClient {
    pub handle: ConnectionHandle,
    pub rx: UnboundedReceiver<WsFrame>,
}

impl TestClient {
    /// Drains everything currently queued, parsed as JSON payloads.
    pub fn events(&mut self) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let WsFrame::Text(text) = frame {
                out.push(serde_json::from_str(&text).expect("event payload is JSON"));
            }
        }
        out
    }

    pub fn next_event(&mut self) -> serde_json::Value {
        let mut events = self.events();
        assert!(!events.is_empty(), "expected an event, queue was empty");
        events.remove(0)
    }

    pub fn assert_no_events(&mut self) {
        let events = self.events();
        assert!(events.is_empty(), "expected no events, got {events:?}");
    }

    pub fn drain(&mut self) {
        let _ = self.events();
    }
}

#[derive(Debug, Clone)]
pub struct PushRecord {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Push provider that records instead of sending.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<PushRecord>>,
}

impl RecordingPush {
    pub fn records(&self) -> Vec<PushRecord> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushProvider for RecordingPush {
    async fn notify(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> AppResult<()> {
        self.sent.lock().unwrap().push(PushRecord {
            tokens: tokens.to_vec(),
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}
