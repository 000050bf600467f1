// generic-array 0.14 (pulled in by aes-gcm 0.10) deprecates the slice
// conversions used below
#![allow(deprecated)]

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption error: {0}")]
    EncryptionError(String),
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    #[error("Invalid data format")]
    InvalidFormat,
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// AES-256-GCM encryption of secrets at rest (provider API keys).
///
/// Ciphertexts are base64 of `nonce || ciphertext`, so the same plaintext
/// encrypts differently every time.
pub struct EncryptionService {
    key: Arc<[u8; KEY_LENGTH]>,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("key", &"<hidden>")
            .finish()
    }
}

impl EncryptionService {
    /// Key given as 64 hex characters
    pub fn new(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid hex key: {}", e)))?;

        if bytes.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKey(format!(
                "Key must be {} bytes ({} hex characters), got {} bytes",
                KEY_LENGTH,
                KEY_LENGTH * 2,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&bytes);
        Ok(Self { key: Arc::new(key) })
    }

    /// Key derived from an arbitrary passphrase with SHA-256
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&digest);
        Self { key: Arc::new(key) }
    }

    /// Hex keys are used as-is, anything else is treated as a passphrase
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("encryption key is empty".to_string()));
        }
        if secret.len() == KEY_LENGTH * 2 && secret.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::new(secret)
        } else {
            Ok(Self::from_passphrase(secret))
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(self.key.as_slice().into())
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, data)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        let mut combined = nonce.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let data = BASE64
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidFormat)?;

        if data.len() < NONCE_LENGTH {
            return Err(CryptoError::InvalidFormat);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LENGTH);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))
    }

    pub fn encrypt_string(&self, data: &str) -> Result<String, CryptoError> {
        self.encrypt(data.as_bytes())
    }

    pub fn decrypt_string(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = self.decrypt(encoded)?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionError(format!("UTF-8 decode failed: {}", e)))
    }

    /// Random key in the hex form accepted by [`new`](Self::new)
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        hex::encode(key)
    }
}
