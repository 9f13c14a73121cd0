//! Encryption-at-rest for per-endpoint shared secrets.
//!
//! AES-256-GCM with a random 96-bit nonce; stored blob format is
//! base64(nonce || ciphertext || tag). The master key is supplied per
//! installation through `RELAY_MASTER_KEY` and is distinct from the
//! individual endpoint secrets it protects.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;
/// Randomness per generated secret and path token.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("RELAY_MASTER_KEY is not set")]
    MissingKey,
    #[error("master key must be base64 for 32 bytes: {0}")]
    InvalidKey(String),
    #[error("stored secret is corrupt: {0}")]
    CorruptSecret(String),
    #[error("failed to encrypt secret: {0}")]
    EncryptFailed(String),
}

/// Generate a URL-safe token with `TOKEN_BYTES` bytes of entropy. Used for
/// both endpoint secrets and path tokens; neither is ever reused.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct SecretVault {
    key: [u8; 32],
}

impl SecretVault {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn from_env() -> Result<Self, VaultError> {
        let raw = std::env::var("RELAY_MASTER_KEY").map_err(|_| VaultError::MissingKey)?;
        let decoded = BASE64
            .decode(raw.trim())
            .map_err(|err| VaultError::InvalidKey(err.to_string()))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|bytes: Vec<u8>| VaultError::InvalidKey(format!("got {} bytes", bytes.len())))?;
        Ok(Self::new(key))
    }

    pub fn generate_secret(&self) -> String {
        generate_token()
    }

    /// Encrypt a plaintext secret to a base64 blob for storage.
    pub fn encrypt(&self, secret: &str) -> Result<String, VaultError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|err| VaultError::EncryptFailed(err.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, secret.as_bytes())
            .map_err(|err| VaultError::EncryptFailed(err.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&blob))
    }

    /// Decrypt a stored blob back to the plaintext secret. A malformed blob
    /// or wrong master key is a `CorruptSecret` error; callers must treat it
    /// as fatal for the endpoint, never substitute a default.
    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let encrypted = BASE64
            .decode(blob)
            .map_err(|err| VaultError::CorruptSecret(format!("base64 decode failed: {err}")))?;

        if encrypted.len() < NONCE_SIZE + 1 {
            return Err(VaultError::CorruptSecret("blob too short".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|err| VaultError::CorruptSecret(err.to_string()))?;

        let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
        let ciphertext = &encrypted[NONCE_SIZE..];

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::CorruptSecret("authentication failed".to_string()))?;

        String::from_utf8(plaintext).map_err(|err| VaultError::CorruptSecret(err.to_string()))
    }

    /// Display form: `****` plus the last four characters.
    pub fn mask(secret: &str) -> String {
        let start = secret.len().saturating_sub(4);
        match secret.get(start..) {
            Some(tail) => format!("****{tail}"),
            None => "****".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    fn vault() -> SecretVault {
        SecretVault::new([0x42u8; 32])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let v = vault();
        let secret = v.generate_secret();
        let blob = v.encrypt(&secret).expect("encrypt");
        assert_ne!(blob, secret);
        assert_eq!(v.decrypt(&blob).expect("decrypt"), secret);
    }

    #[test]
    fn nonce_makes_blobs_differ() {
        let v = vault();
        let a = v.encrypt("same-secret").unwrap();
        let b = v.encrypt("same-secret").unwrap();
        assert_ne!(a, b);
        assert_eq!(v.decrypt(&a).unwrap(), v.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_is_corrupt() {
        let blob = vault().encrypt("secret").unwrap();
        let other = SecretVault::new([0x43u8; 32]);
        assert!(matches!(
            other.decrypt(&blob),
            Err(VaultError::CorruptSecret(_))
        ));
    }

    #[test]
    fn malformed_blob_is_corrupt() {
        let v = vault();
        assert!(matches!(
            v.decrypt("not-valid-base64!!!"),
            Err(VaultError::CorruptSecret(_))
        ));
        let short = BASE64.encode([0u8; 5]);
        assert!(matches!(
            v.decrypt(&short),
            Err(VaultError::CorruptSecret(_))
        ));
    }

    #[test]
    fn generated_tokens_are_url_safe_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64 chars, no padding
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn mask_keeps_last_four() {
        assert_eq!(SecretVault::mask("abcdef"), "****cdef");
        assert_eq!(SecretVault::mask("ab"), "****ab");
    }
}
