//! Persistence gateway abstraction.
//!
//! This module provides:
//! - [`PersistenceGateway`] - Trait for storage backends that hand out transactions
//! - [`Transaction`] - One unit of work: reads, staged writes, then commit or rollback
//! - [`MemoryGateway`] - In-memory implementation for testing
//! - [`JsonFileGateway`] - JSON file implementation for single-node deployments
//!
//! # Transaction Contract
//!
//! Writes made through a [`Transaction`] are visible to later reads on the
//! same transaction and to nobody else until [`Transaction::commit`]
//! succeeds. Dropping a transaction without committing discards its writes.
//! Inserts assign identity immediately; [`Transaction::flush`] exists for
//! backends that defer it.
//!
//! # Example
//!
//! ```rust,ignore
//! use skillforge_core::store::{MemoryGateway, PersistenceGateway};
//!
//! let gateway = MemoryGateway::new();
//! let mut tx = gateway.begin().await?;
//! let skills = tx.list_skills().await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    ModelRecord, NewModel, NewProvider, NewSkill, NewUser, ProviderRecord, RecordId, SkillRecord,
    UserRecord,
};

mod file;
mod memory;
mod snapshot;

pub use file::JsonFileGateway;
pub use memory::{MemoryGateway, Operation};

/// Error type for persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The record to update or delete does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// An insert or update would violate a unique key.
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: String, key: String },

    /// Another transaction committed since this one began.
    #[error("transaction conflict: {message}")]
    Conflict { message: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A storage backend that hands out transactions.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Begin a new unit of work.
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, PersistenceError>;
}

/// One unit of work against the store.
#[async_trait]
pub trait Transaction: Send {
    /// Find a user by email.
    async fn find_user_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<UserRecord>, PersistenceError>;

    /// Insert a user; email must be unique.
    async fn insert_user(&mut self, user: NewUser) -> Result<UserRecord, PersistenceError>;

    /// All skills, ordered by id.
    async fn list_skills(&mut self) -> Result<Vec<SkillRecord>, PersistenceError>;

    /// Insert a skill; name must be unique.
    async fn insert_skill(&mut self, skill: NewSkill) -> Result<SkillRecord, PersistenceError>;

    /// Replace a stored skill by id.
    async fn update_skill(&mut self, skill: &SkillRecord) -> Result<(), PersistenceError>;

    /// Delete a skill by id.
    async fn delete_skill(&mut self, id: RecordId) -> Result<(), PersistenceError>;

    /// All providers, ordered by id.
    async fn list_providers(&mut self) -> Result<Vec<ProviderRecord>, PersistenceError>;

    /// Find a provider by its unique name.
    async fn find_provider_by_name(
        &mut self,
        provider_name: &str,
    ) -> Result<Option<ProviderRecord>, PersistenceError>;

    /// Insert a provider; provider name must be unique.
    async fn insert_provider(
        &mut self,
        provider: NewProvider,
    ) -> Result<ProviderRecord, PersistenceError>;

    /// Replace a stored provider by id.
    async fn update_provider(&mut self, provider: &ProviderRecord)
    -> Result<(), PersistenceError>;

    /// Models of one provider, ordered by id.
    async fn list_models(
        &mut self,
        provider_id: RecordId,
    ) -> Result<Vec<ModelRecord>, PersistenceError>;

    /// Insert a model; (provider, name) must be unique.
    async fn insert_model(&mut self, model: NewModel) -> Result<ModelRecord, PersistenceError>;

    /// Replace a stored model by id.
    async fn update_model(&mut self, model: &ModelRecord) -> Result<(), PersistenceError>;

    /// Delete a model by id.
    async fn delete_model(&mut self, id: RecordId) -> Result<(), PersistenceError>;

    /// Make pending inserts visible with their identities assigned.
    async fn flush(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }

    /// Publish every write made in this transaction atomically.
    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;

    /// Discard every write made in this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError>;
}
