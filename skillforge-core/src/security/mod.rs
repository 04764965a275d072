//! Credential security primitives.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialCipher`] - Symmetric encryption of stored API keys
//! - [`PasswordHasher`] - Salted, adaptive one-way password hashing
//! - [`TokenIssuer`] - Signed, time-bounded identity tokens
//! - [`SecretKeyManager`] - API key generation and redaction for display
//! - [`SecurityManager`] - All of the above built from one [`SecuritySettings`]
//!
//! Every component is an explicitly constructed value holding immutable key
//! material. They are `Send + Sync` and need no locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use skillforge_core::security::{SecurityManager, SecuritySettings, Secret};
//!
//! let settings = SecuritySettings::new(Secret::new("signing-secret"));
//! let security = SecurityManager::from_settings(&settings)?;
//!
//! let stored = security.cipher.encrypt("sk-live-123")?;
//! assert_eq!(security.cipher.decrypt(&stored)?, "sk-live-123");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

mod api_key;
mod cipher;
mod password;
mod token;

pub use api_key::SecretKeyManager;
pub use cipher::{CipherError, CredentialCipher, generate_encoded_key, generate_key};
pub use password::{PasswordError, PasswordHasher};
pub use token::{Claims, IssuedToken, TokenError, TokenIssuer};

/// Default lifetime of issued access tokens: eight days.
pub const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 8;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Missing or malformed key material.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting has no value and no safe default exists.
    #[error("missing configuration: {name}")]
    Missing { name: String },

    /// A setting is present but unusable.
    #[error("invalid configuration for {name}: {message}")]
    Invalid { name: String, message: String },
}

/// Key material injected into the security components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Base64 or hex encoded 32-byte key for [`CredentialCipher`].
    ///
    /// When absent an ephemeral key is generated, and anything encrypted
    /// with it becomes unreadable after a restart.
    #[serde(default)]
    pub encryption_key: Option<Secret>,

    /// HMAC secret used by [`TokenIssuer`]. Required.
    #[serde(default)]
    pub secret_key: Option<Secret>,

    /// Lifetime of issued access tokens in minutes.
    #[serde(default = "default_access_token_ttl_minutes")]
    pub access_token_ttl_minutes: i64,
}

fn default_access_token_ttl_minutes() -> i64 {
    DEFAULT_ACCESS_TOKEN_TTL_MINUTES
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            encryption_key: None,
            secret_key: None,
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
        }
    }
}

impl SecuritySettings {
    /// Settings with a signing secret and an ephemeral encryption key.
    pub fn new(secret_key: impl Into<Secret>) -> Self {
        Self {
            encryption_key: None,
            secret_key: Some(secret_key.into()),
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
        }
    }

    /// Set the encryption key.
    pub fn with_encryption_key(mut self, key: impl Into<Secret>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Token lifetime as a duration.
    pub fn access_token_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        ttl_from_minutes(self.access_token_ttl_minutes).ok_or_else(|| ConfigError::Invalid {
            name: "security.access_token_ttl_minutes".to_string(),
            message: format!(
                "{} is not a positive minute count in range",
                self.access_token_ttl_minutes
            ),
        })
    }

    /// Check settings that do not need key material to be parsed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.access_token_ttl().map(|_| ())
    }

    /// The configured cipher, or `None` when no encryption key is set.
    pub fn configured_cipher(&self) -> Result<Option<CredentialCipher>, ConfigError> {
        match self.encryption_key.as_ref() {
            Some(key) if !key.is_empty() => Ok(Some(CredentialCipher::from_encoded_key(key)?)),
            _ => Ok(None),
        }
    }

    /// The configured cipher, falling back to an ephemeral key.
    pub fn cipher(&self) -> Result<CredentialCipher, ConfigError> {
        Ok(self
            .configured_cipher()?
            .unwrap_or_else(CredentialCipher::ephemeral))
    }

    /// A token issuer for the signing secret.
    pub fn token_issuer(&self) -> Result<TokenIssuer, ConfigError> {
        let secret_key = self.secret_key.as_ref().ok_or_else(|| ConfigError::Missing {
            name: "security.secret_key".to_string(),
        })?;
        TokenIssuer::new(secret_key)
    }
}

/// A positive minute count as a duration; `None` when out of range.
pub fn ttl_from_minutes(minutes: i64) -> Option<chrono::Duration> {
    if minutes <= 0 {
        return None;
    }
    chrono::Duration::try_minutes(minutes)
}

/// All security components, built once and passed by reference.
#[derive(Debug)]
pub struct SecurityManager {
    pub cipher: CredentialCipher,
    pub passwords: PasswordHasher,
    pub tokens: TokenIssuer,
    pub api_keys: SecretKeyManager,
}

impl SecurityManager {
    /// Build every component from the given settings.
    ///
    /// Fails when the signing secret is absent or any configured key is
    /// malformed.
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, ConfigError> {
        // The ephemeral cipher warns on creation, so fail on the rest first.
        settings.validate()?;
        let tokens = settings.token_issuer()?;
        let cipher = settings.cipher()?;

        Ok(Self {
            cipher,
            passwords: PasswordHasher::new(),
            tokens,
            api_keys: SecretKeyManager::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_secret_into_inner() {
        let secret = Secret::new("value");
        assert_eq!(secret.into_inner(), "value");
    }

    #[test]
    fn test_settings_debug_hides_keys() {
        let settings = SecuritySettings::new("signing").with_encryption_key("abc");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("signing"));
        assert!(!debug.contains("abc"));
    }

    #[test]
    fn test_manager_requires_secret_key() {
        let settings = SecuritySettings::default();
        let result = SecurityManager::from_settings(&settings);
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_manager_rejects_malformed_encryption_key() {
        let settings = SecuritySettings::new("signing").with_encryption_key("not-a-key");
        let result = SecurityManager::from_settings(&settings);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_manager_with_ephemeral_key() {
        let settings = SecuritySettings::new("signing");
        let manager = SecurityManager::from_settings(&settings).unwrap();
        let encrypted = manager.cipher.encrypt("sk-123").unwrap();
        assert_eq!(manager.cipher.decrypt(&encrypted).unwrap(), "sk-123");
    }

    #[test]
    fn test_default_ttl_is_eight_days() {
        let settings = SecuritySettings::new("signing");
        assert_eq!(settings.access_token_ttl().unwrap(), chrono::Duration::days(8));
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        for minutes in [0, -5] {
            let mut settings = SecuritySettings::new("signing");
            settings.access_token_ttl_minutes = minutes;
            assert!(matches!(
                settings.validate(),
                Err(ConfigError::Invalid { .. })
            ));
            assert!(SecurityManager::from_settings(&settings).is_err());
        }
    }

    #[test]
    fn test_out_of_range_ttl_rejected() {
        let mut settings = SecuritySettings::new("signing");
        settings.access_token_ttl_minutes = i64::MAX / 2;
        assert!(matches!(
            settings.access_token_ttl(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_secret_checked_before_malformed_encryption_key() {
        let settings = SecuritySettings {
            secret_key: None,
            ..SecuritySettings::default()
        }
        .with_encryption_key("not-a-key");
        let result = SecurityManager::from_settings(&settings);
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_configured_cipher_absent_without_key() {
        let settings = SecuritySettings::new("signing");
        assert!(settings.configured_cipher().unwrap().is_none());

        let settings = settings.with_encryption_key(generate_encoded_key());
        assert!(settings.configured_cipher().unwrap().is_some());
    }
}
