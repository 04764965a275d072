//! Top-level error types for Skillforge.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::reconcile::ReconcileError;
use crate::security::{CipherError, ConfigError, PasswordError, TokenError};
use crate::store::PersistenceError;

/// Top-level error type encompassing all Skillforge errors.
#[derive(Debug, Error)]
pub enum SkillforgeError {
    /// Error from the persistence gateway.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Error loading or validating a catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Error from a reconciliation pass.
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Error encrypting or decrypting a stored credential.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Error hashing a password.
    #[error("password error: {0}")]
    Password(#[from] PasswordError),

    /// Error issuing or verifying a token.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Missing or malformed security configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias using [`SkillforgeError`].
pub type Result<T, E = SkillforgeError> = std::result::Result<T, E>;
