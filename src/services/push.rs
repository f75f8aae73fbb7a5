use std::sync::Arc;

use async_trait::async_trait;
use fcm::{Client, MessageBuilder, NotificationBuilder};
use tracing::{debug, warn};

use crate::config::FcmConfig;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Push notification provider. Called opportunistically after direct
/// message, gift, and friend-request events; call sites log and swallow
/// failures, a push must never block or fail the triggering action.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn notify(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> AppResult<()>;
}

/// FCM (Firebase Cloud Messaging) provider.
#[derive(Clone)]
pub struct FcmPush {
    client: Arc<Client>,
    api_key: String,
}

impl FcmPush {
    pub fn new(cfg: &FcmConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl PushProvider for FcmPush {
    async fn notify(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> AppResult<()> {
        let mut delivered = 0usize;
        let mut failed = 0usize;

        for token in tokens {
            let mut notification_builder = NotificationBuilder::new();
            notification_builder.title(title).body(body).sound("default");
            let notification = notification_builder.finalize();

            let mut message_builder = MessageBuilder::new(&self.api_key, token);
            message_builder.notification(notification);
            message_builder
                .data(data)
                .map_err(|e| AppError::Config(format!("push data payload: {e}")))?;

            // Log only a token prefix.
            let prefix = &token[..token.len().min(8)];
            match self.client.send(message_builder.finalize()).await {
                Ok(response) => {
                    delivered += 1;
                    metrics::PUSH_ATTEMPTS_TOTAL
                        .with_label_values(&["delivered"])
                        .inc();
                    debug!(token = prefix, message_id = ?response.message_id, "push delivered");
                }
                Err(e) => {
                    failed += 1;
                    metrics::PUSH_ATTEMPTS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(token = prefix, error = %e, "push delivery failed");
                }
            }
        }

        if delivered == 0 && failed > 0 {
            return Err(AppError::Transient(format!(
                "all {failed} push deliveries failed"
            )));
        }
        Ok(())
    }
}
