//! Password hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use thiserror::Error;

/// Error type for password hashing.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// The hashing backend failed.
    #[error("password hashing failed: {message}")]
    Hashing { message: String },
}

/// Argon2id password hashing with a random salt per password.
///
/// Digests are PHC strings (`$argon2id$v=19$...`) carrying their own salt
/// and cost parameters, so raising the cost later keeps old digests valid.
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create a hasher with the default Argon2id parameters.
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Hash a password.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hashing {
                message: e.to_string(),
            })
    }

    /// Check a password against a digest produced by [`hash`](Self::hash).
    ///
    /// Returns `false` on mismatch and for digests that cannot be parsed.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Rejecting unparseable password digest: {}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
