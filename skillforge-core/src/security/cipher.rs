//! Symmetric encryption of stored API keys.
//!
//! Uses AES-256-GCM with a fresh 96-bit nonce per value. Ciphertexts are
//! URL-safe base64 (no padding) of `version || nonce || ciphertext+tag`.
//! The empty string is the "no secret" sentinel and passes through both
//! directions untouched.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use super::{ConfigError, Secret};

/// Key length in bytes (256 bits for AES-256)
pub const KEY_LENGTH: usize = 32;

/// Nonce length in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// GCM authentication tag length in bytes
const TAG_LENGTH: usize = 16;

/// Current ciphertext format version
const FORMAT_VERSION: u8 = 1;

/// Error type for cipher operations.
///
/// Messages never include key material or partial plaintext.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The ciphertext is malformed or was produced under a different key.
    #[error("decryption failed: invalid key or corrupted data")]
    Decryption,

    /// The AEAD backend refused to encrypt.
    #[error("encryption failed")]
    Encryption,
}

/// Encrypts and decrypts opaque secret strings under one process-wide key.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Create a cipher from raw key bytes.
    pub fn new(key: &[u8; KEY_LENGTH]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Create a cipher from a hex or base64 encoded key.
    pub fn from_encoded_key(encoded: &Secret) -> Result<Self, ConfigError> {
        let key = parse_key(encoded.expose())?;
        Ok(Self::new(&key))
    }

    /// Create a cipher with a freshly generated key.
    ///
    /// Values encrypted with an ephemeral key cannot be decrypted by any
    /// other process, including this one after a restart.
    pub fn ephemeral() -> Self {
        tracing::warn!(
            "No encryption key configured; generated an ephemeral key. \
             Stored API keys will be unreadable after a restart."
        );
        let key = generate_key();
        Self::new(&key)
    }

    /// Encrypt a plaintext value.
    ///
    /// Returns the empty string unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        let mut combined = Vec::with_capacity(1 + NONCE_LENGTH + ciphertext.len());
        combined.push(FORMAT_VERSION);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    ///
    /// Returns the empty string unchanged. Every kind of failure (bad
    /// encoding, unknown version, truncation, wrong key, tampering) maps to
    /// [`CipherError::Decryption`].
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let combined = URL_SAFE_NO_PAD
            .decode(ciphertext.trim())
            .map_err(|_| CipherError::Decryption)?;

        if combined.len() < 1 + NONCE_LENGTH + TAG_LENGTH || combined[0] != FORMAT_VERSION {
            return Err(CipherError::Decryption);
        }

        let (nonce_bytes, sealed) = combined[1..].split_at(NONCE_LENGTH);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(nonce_bytes), sealed)
                .map_err(|_| CipherError::Decryption)?,
        );

        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::Decryption)
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 32-byte key.
pub fn generate_key() -> Zeroizing<[u8; KEY_LENGTH]> {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    rand::thread_rng().fill_bytes(&mut *key);
    key
}

/// Generate a random key encoded as standard base64, suitable for
/// `security.encryption_key`.
pub fn generate_encoded_key() -> Secret {
    let key = generate_key();
    Secret::new(BASE64.encode(key.as_slice()))
}

/// Parse a key from hex or base64 format.
fn parse_key(key_str: &str) -> Result<Zeroizing<[u8; KEY_LENGTH]>, ConfigError> {
    let trimmed = key_str.trim();
    let invalid = |message: String| ConfigError::Invalid {
        name: "security.encryption_key".to_string(),
        message,
    };

    // Hex first (64 characters = 32 bytes)
    let bytes = if trimmed.len() == KEY_LENGTH * 2
        && trimmed.chars().all(|c| c.is_ascii_hexdigit())
    {
        hex::decode(trimmed).map_err(|_| invalid("invalid hex".to_string()))?
    } else {
        BASE64
            .decode(trimmed)
            .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
            .map_err(|_| invalid("key is neither valid hex nor base64".to_string()))?
    };
    let bytes = Zeroizing::new(bytes);

    if bytes.len() != KEY_LENGTH {
        return Err(invalid(format!(
            "key must be {} bytes, got {} bytes",
            KEY_LENGTH,
            bytes.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    key.copy_from_slice(&bytes);
    Ok(key)
}
