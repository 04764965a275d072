//! API key generation and display redaction.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Random bytes per generated key (256 bits).
const KEY_BYTES: usize = 32;

/// Characters kept at each end of a redacted key.
const VISIBLE_CHARS: usize = 4;

/// Keys shorter than this are fully masked.
const MIN_REDACTABLE_LEN: usize = 20;

/// Generates bearer API keys and their display forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretKeyManager;

impl SecretKeyManager {
    pub fn new() -> Self {
        Self
    }

    /// Generate a URL-safe key from 32 random bytes (43 characters).
    pub fn generate(&self) -> String {
        let mut bytes = zeroize::Zeroizing::new([0u8; KEY_BYTES]);
        rand::rngs::OsRng.fill_bytes(&mut *bytes);
        URL_SAFE_NO_PAD.encode(bytes.as_slice())
    }

    /// Short display form: `abcd...wxyz`.
    ///
    /// Keys too short to elide safely render as `****`.
    pub fn redact(&self, key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        if chars.len() < MIN_REDACTABLE_LEN {
            return "****".to_string();
        }

        let prefix: String = chars[..VISIBLE_CHARS].iter().collect();
        let suffix: String = chars[chars.len() - VISIBLE_CHARS..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length_and_alphabet() {
        let key = SecretKeyManager::new().generate();
        assert_eq!(key.len(), 43);
        assert!(
            key.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_unique() {
        let manager = SecretKeyManager::new();
        let keys: std::collections::HashSet<String> = (0..100).map(|_| manager.generate()).collect();
        assert_eq!(keys.len(), 100);
    }

    #[test]
    fn test_redact() {
        let manager = SecretKeyManager::new();
        let key = "sk-abcdefghijklmnopqrstuvwxyz";
        let display = manager.redact(key);
        assert_eq!(display, "sk-a...wxyz");
        assert!(!display.contains("efghijklmnop"));
    }

    #[test]
    fn test_redact_generated_key() {
        let manager = SecretKeyManager::new();
        let key = manager.generate();
        let display = manager.redact(&key);
        assert_eq!(display.len(), 11);
        assert!(display.starts_with(&key[..4]));
        assert!(display.ends_with(&key[key.len() - 4..]));
    }

    #[test]
    fn test_redact_short_keys_fully_masked() {
        let manager = SecretKeyManager::new();
        assert_eq!(manager.redact(""), "****");
        assert_eq!(manager.redact("abcdefgh"), "****");
        assert_eq!(manager.redact("abcdefghijkl"), "****");
        assert_eq!(manager.redact("sk-0123456789abcdef"), "****");
        assert_eq!(manager.redact("sk-0123456789abcdefg"), "sk-0...defg");
    }

    #[test]
    fn test_redact_multibyte() {
        let manager = SecretKeyManager::new();
        assert_eq!(manager.redact("ключключключключключ"), "ключ...ключ");
    }
}
