use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Process-wide secret for message content encryption. Injected into
    /// the cipher at construction, never read from the environment per call.
    pub encryption_master_key: [u8; 32],
    pub edit_window_minutes: i64,
    pub fcm: Option<FcmConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let master_key_b64 = env::var("CHAT_ENCRYPTION_MASTER_KEY")
            .map_err(|_| AppError::Config("CHAT_ENCRYPTION_MASTER_KEY missing".into()))?;
        let master_key_bytes = STANDARD
            .decode(master_key_b64.trim())
            .map_err(|_| AppError::Config("CHAT_ENCRYPTION_MASTER_KEY invalid base64".into()))?;
        if master_key_bytes.len() != 32 {
            return Err(AppError::Config(
                "CHAT_ENCRYPTION_MASTER_KEY must decode to 32 bytes".into(),
            ));
        }
        let mut encryption_master_key = [0u8; 32];
        encryption_master_key.copy_from_slice(&master_key_bytes);

        let edit_window_minutes = env::var("CHAT_EDIT_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let fcm = match env::var("FCM_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => Some(FcmConfig { api_key }),
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            encryption_master_key,
            edit_window_minutes,
            fcm,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            port: 3000,
            database_url: "postgres://localhost/test".into(),
            encryption_master_key: [0u8; 32],
            edit_window_minutes: 15,
            fcm: None,
        }
    }
}
