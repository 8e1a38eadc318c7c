use crate::constants::buffers::{CRYPTO_IV_SIZE, CRYPTO_KEY_SIZE, CRYPTO_TAG_SIZE};
use crate::errors::ToolError;
use crate::utils::fs_atomic::atomic_write_text_file;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use rand::RngCore;
use std::fs;
use std::path::Path;

fn decode_key(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.len() == CRYPTO_KEY_SIZE * 2 {
        return hex::decode(trimmed).ok();
    }
    if trimmed.len() == CRYPTO_KEY_SIZE {
        return Some(trimmed.as_bytes().to_vec());
    }
    if trimmed.len() > CRYPTO_KEY_SIZE {
        let engine = base64::engine::general_purpose::STANDARD;
        return engine
            .decode(trimmed.as_bytes())
            .ok()
            .filter(|key| key.len() == CRYPTO_KEY_SIZE);
    }
    None
}

/// AES-256-GCM sealing for instance secrets kept at rest.
#[derive(Clone)]
pub struct Security {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Security(..)")
    }
}

impl Security {
    /// Key from `ENCRYPTION_KEY`, else the key file (created with mode 0600).
    pub fn load(key_path: &Path) -> Result<Self, ToolError> {
        let secret = Self::load_or_create_secret(key_path)?;
        Self::from_key(&secret)
    }

    pub fn from_key(key: &[u8]) -> Result<Self, ToolError> {
        if key.len() != CRYPTO_KEY_SIZE {
            return Err(ToolError::invalid_params(format!(
                "Encryption key must be {} bytes",
                CRYPTO_KEY_SIZE
            )));
        }
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    fn load_or_create_secret(path: &Path) -> Result<Vec<u8>, ToolError> {
        if let Ok(raw) = std::env::var("ENCRYPTION_KEY") {
            return decode_key(&raw).ok_or_else(|| {
                ToolError::invalid_params("ENCRYPTION_KEY is not a valid 32-byte key")
                    .with_hint("Use 64 hex characters, 32 raw characters, or base64.")
            });
        }

        if path.exists() {
            let stored = fs::read_to_string(path)?;
            return decode_key(&stored).ok_or_else(|| {
                ToolError::internal(format!("Key file {} is corrupted", path.display()))
            });
        }

        let mut generated = vec![0u8; CRYPTO_KEY_SIZE];
        OsRng.fill_bytes(&mut generated);
        atomic_write_text_file(path, &hex::encode(&generated), 0o600)?;
        Ok(generated)
    }

    pub fn encrypt(&self, text: &str) -> Result<String, ToolError> {
        let mut iv = [0u8; CRYPTO_IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let mut ciphertext = self
            .cipher
            .encrypt(nonce, text.as_bytes())
            .map_err(|_| ToolError::internal("Failed to encrypt instance secret"))?;
        if ciphertext.len() < CRYPTO_TAG_SIZE {
            return Err(ToolError::internal("Failed to encrypt instance secret"));
        }
        let tag = ciphertext.split_off(ciphertext.len() - CRYPTO_TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, payload: &str) -> Result<String, ToolError> {
        let invalid = || {
            ToolError::invalid_params("Invalid encrypted payload format")
                .with_hint("Expected format: \"<iv_hex>:<tag_hex>:<data_hex>\".")
        };
        let parts: Vec<&str> = payload.split(':').collect();
        let [iv, tag, data] = parts.as_slice() else {
            return Err(invalid());
        };
        let iv = hex::decode(iv).map_err(|_| invalid())?;
        let tag = hex::decode(tag).map_err(|_| invalid())?;
        let data = hex::decode(data).map_err(|_| invalid())?;
        if iv.len() != CRYPTO_IV_SIZE || tag.len() != CRYPTO_TAG_SIZE {
            return Err(invalid());
        }
        let mut combined = Vec::with_capacity(data.len() + tag.len());
        combined.extend_from_slice(&data);
        combined.extend_from_slice(&tag);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let decrypted = self
            .cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| {
                ToolError::internal("Failed to decrypt instance secret").with_hint(
                    "ENCRYPTION_KEY (or the key file) must match the one used when the instance was saved.",
                )
            })?;
        String::from_utf8(decrypted)
            .map_err(|_| ToolError::internal("Decrypted instance secret is not UTF-8"))
    }
}
