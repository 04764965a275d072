//! # Skillforge Core
//!
//! Core library for Skillforge: credential security and managed catalog
//! reconciliation.
//!
//! This crate provides:
//! - Credential security: symmetric encryption of stored API keys, password
//!   hashing, signed access tokens and API key generation
//! - A catalog of managed skills and model providers
//! - A transactional persistence gateway with in-memory and JSON file backends
//! - A reconciler that converges stored state on the catalog while
//!   preserving operator-entered secrets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skillforge_core::{
//!     CredentialCipher, JsonFileGateway, PasswordHasher, Reconciler, StaticCatalog,
//!     SuperuserSettings,
//! };
//!
//! let catalog = StaticCatalog::load("catalog.toml".as_ref())?;
//! let gateway = Arc::new(JsonFileGateway::open(JsonFileGateway::default_path()?)?);
//! let reconciler = Reconciler::new(gateway, Arc::new(CredentialCipher::ephemeral()));
//!
//! let superuser = SuperuserSettings::new("admin@example.com", "changethis");
//! let report = reconciler
//!     .bootstrap(&catalog, &superuser, &PasswordHasher::new())
//!     .await?;
//! ```

pub mod bootstrap;
pub mod catalog;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod security;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{
    CredentialField,
    Credentials,
    InputParameter,
    ModelMeta,
    ModelRecord,
    ProviderRecord,
    RecordId,
    SkillRecord,
    UserRecord,
};

pub use security::{
    CipherError,
    Claims,
    ConfigError,
    CredentialCipher,
    PasswordError,
    PasswordHasher,
    Secret,
    SecretKeyManager,
    SecurityManager,
    SecuritySettings,
    TokenError,
    TokenIssuer,
};

pub use catalog::{
    CatalogError,
    CatalogSource,
    ManagedSkillDefinition,
    ModelDefinition,
    ModelProviderDefinition,
    StaticCatalog,
};

pub use store::{
    JsonFileGateway,
    MemoryGateway,
    PersistenceError,
    PersistenceGateway,
    Transaction,
};

pub use reconcile::{
    BootstrapReport,
    ProviderSyncReport,
    ReconcileError,
    Reconciler,
    SkillSyncReport,
};

pub use bootstrap::{SuperuserSettings, ensure_superuser};

pub use error::SkillforgeError;
