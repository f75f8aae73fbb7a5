use std::sync::Arc;

use crate::config::Config;
use crate::services::encryption::ContentCipher;
use crate::services::message_service::MessageService;
use crate::services::presence_service::PresenceTracker;
use crate::services::push::PushProvider;
use crate::storage::ChatStore;
use crate::websocket::fanout::FanoutRouter;
use crate::websocket::signaling::SignalRelay;
use crate::websocket::ConnectionRegistry;

/// Shared state. The registry is an explicit component constructed once at
/// process start and handed to everything that needs it; nothing reaches
/// for ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub registry: ConnectionRegistry,
    pub fanout: FanoutRouter,
    pub presence: PresenceTracker,
    pub relay: SignalRelay,
    pub messages: MessageService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatStore>,
        push: Option<Arc<dyn PushProvider>>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let fanout = FanoutRouter::new(registry.clone(), store.clone());
        let presence = PresenceTracker::new(store.clone(), fanout.clone());
        let relay = SignalRelay::new(fanout.clone());
        let cipher = ContentCipher::new(&config.encryption_master_key);
        let messages = MessageService::new(
            store.clone(),
            cipher,
            fanout.clone(),
            push,
            config.edit_window_minutes,
        );

        Self {
            config,
            store,
            registry,
            fanout,
            presence,
            relay,
            messages,
        }
    }
}
