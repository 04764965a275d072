//! Signed, self-contained identity tokens.
//!
//! Tokens are HS256 JWTs carrying the subject, issue time, absolute expiry
//! and a random token id. Nothing is persisted; a token is valid exactly
//! when its signature checks out and its expiry lies in the future.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ConfigError, Secret};

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The signature is valid but the expiry has passed.
    #[error("token expired")]
    Expired,

    /// The token is malformed, tampered with, or signed with another secret.
    #[error("invalid token: {message}")]
    Invalid { message: String },

    /// The token could not be signed.
    #[error("token encoding failed: {message}")]
    Encoding { message: String },
}

/// Claims embedded in every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject the token was issued for.
    pub sub: String,

    /// Issued-at unix seconds.
    pub iat: i64,

    /// Expiration unix seconds.
    pub exp: i64,

    /// Unique token id.
    pub jti: String,
}

impl Claims {
    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// A freshly issued token with its decoded expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies signed tokens with a server-side secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    /// Create an issuer from the signing secret.
    ///
    /// An empty secret is rejected; there is no safe default.
    pub fn new(secret: &Secret) -> Result<Self, ConfigError> {
        if secret.expose().trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "security.secret_key".to_string(),
            });
        }

        let bytes = secret.expose().as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }

    /// Issue a token for `subject` valid for `ttl` from now.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encoding {
                message: format!("token lifetime of {} seconds is out of range", ttl.num_seconds()),
            })?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding {
                message: e.to_string(),
            })?;

        Ok(IssuedToken {
            token,
            subject: claims.sub,
            expires_at,
        })
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid {
                    message: e.to_string(),
                },
            })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
