//! Symmetric content encryption for text message bodies.
//!
//! Ciphertext layout: `nonce (12 bytes) || AES-256-GCM ciphertext + tag`,
//! base64-encoded for storage. The nonce is random per call, so encrypting
//! the same plaintext twice yields different ciphertexts. The AEAD key is
//! derived once from the process-wide master secret.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct ContentCipher {
    cipher: Aes256Gcm,
}

impl ContentCipher {
    pub fn new(master_key: &[u8; 32]) -> Self {
        let hk = Hkdf::<Sha256>::new(None, master_key);
        let mut key = [0u8; 32];
        hk.expand(b"chat-service content key v1", &mut key)
            .expect("HKDF expand must succeed for 32 byte output");
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        Self { cipher }
    }

    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Fails with `Decryption` on key mismatch or corruption. Callers
    /// render a placeholder instead of propagating the failure to the
    /// transport.
    pub fn decrypt(&self, encoded: &str) -> AppResult<String> {
        let combined = STANDARD
            .decode(encoded)
            .map_err(|_| AppError::Decryption("invalid base64".into()))?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(AppError::Decryption("ciphertext too short".into()));
        }

        let nonce = Nonce::from_slice(&combined[..NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &combined[NONCE_LEN..])
            .map_err(|_| AppError::Decryption("ciphertext rejected".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::Decryption("plaintext is not valid utf-8".into()))
    }
}
