//! In-memory persistence gateway.

use async_trait::async_trait;

use super::snapshot::{Snapshot, SnapshotCell};
use super::{PersistenceGateway, PersistenceError, Transaction};
use crate::model::{ModelRecord, ProviderRecord, SkillRecord, UserRecord};

pub use super::snapshot::Operation;

/// In-memory gateway for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// Committed state sits behind a `parking_lot::RwLock`; each transaction
/// works on its own copy, so the gateway is safe to share across threads.
pub struct MemoryGateway {
    cell: SnapshotCell,
}

impl MemoryGateway {
    /// Create a new empty gateway.
    pub fn new() -> Self {
        Self {
            cell: SnapshotCell::new(Snapshot::default(), None),
        }
    }

    /// Make the next occurrence of `operation` fail with a backend error.
    pub fn fail_on(&self, operation: Operation) {
        self.cell.fail_on(operation);
    }

    /// Total writes published by committed transactions.
    pub fn committed_mutations(&self) -> u64 {
        self.cell.committed_mutations()
    }

    /// Committed users.
    pub fn users(&self) -> Vec<UserRecord> {
        self.cell.committed().users
    }

    /// Committed skills.
    pub fn skills(&self) -> Vec<SkillRecord> {
        self.cell.committed().skills
    }

    /// Committed providers.
    pub fn providers(&self) -> Vec<ProviderRecord> {
        self.cell.committed().providers
    }

    /// Committed models.
    pub fn models(&self) -> Vec<ModelRecord> {
        self.cell.committed().models
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.cell.committed();
        f.debug_struct("MemoryGateway")
            .field("skills", &snapshot.skills.len())
            .field("providers", &snapshot.providers.len())
            .field("models", &snapshot.models.len())
            .finish()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, PersistenceError> {
        Ok(Box::new(self.cell.begin()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewModel, NewProvider, NewSkill, NewUser, RecordId};

    fn new_skill(name: &str) -> NewSkill {
        NewSkill {
            name: name.to_string(),
            description: String::new(),
            display_name: None,
            managed: true,
            owner_id: RecordId::new(1),
            input_parameters: Vec::new(),
            credentials: None,
        }
    }

    fn new_provider(name: &str) -> NewProvider {
        NewProvider {
            provider_name: name.to_string(),
            base_url: "http://localhost".to_string(),
            icon: None,
            description: String::new(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let gateway = MemoryGateway::new();

        let mut tx = gateway.begin().await.unwrap();
        let skill = tx.insert_skill(new_skill("web_search")).await.unwrap();
        assert_eq!(tx.list_skills().await.unwrap().len(), 1);
        assert!(gateway.skills().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(gateway.skills(), vec![skill]);
        assert_eq!(gateway.committed_mutations(), 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let gateway = MemoryGateway::new();

        let mut tx = gateway.begin().await.unwrap();
        tx.insert_skill(new_skill("a")).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = gateway.begin().await.unwrap();
            tx.insert_skill(new_skill("b")).await.unwrap();
        }

        assert!(gateway.skills().is_empty());
        assert_eq!(gateway.committed_mutations(), 0);
    }

    #[tokio::test]
    async fn test_ids_are_assigned_on_insert() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();

        let provider = tx.insert_provider(new_provider("openai")).await.unwrap();
        tx.flush().await.unwrap();
        let model = tx
            .insert_model(NewModel {
                provider_id: provider.id,
                ai_model_name: "gpt-4o".to_string(),
                categories: Default::default(),
                capabilities: Default::default(),
                meta: Default::default(),
            })
            .await
            .unwrap();

        assert_ne!(provider.id, model.id);
        assert_eq!(tx.list_models(provider.id).await.unwrap(), vec![model]);
    }

    #[tokio::test]
    async fn test_unique_keys_enforced() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();

        tx.insert_skill(new_skill("a")).await.unwrap();
        let result = tx.insert_skill(new_skill("a")).await;
        assert!(matches!(result, Err(PersistenceError::Duplicate { .. })));

        tx.insert_provider(new_provider("p")).await.unwrap();
        let result = tx.insert_provider(new_provider("p")).await;
        assert!(matches!(result, Err(PersistenceError::Duplicate { .. })));

        let user = NewUser {
            email: "admin@example.com".to_string(),
            hashed_password: "x".to_string(),
            is_superuser: true,
        };
        tx.insert_user(user.clone()).await.unwrap();
        let result = tx.insert_user(user).await;
        assert!(matches!(result, Err(PersistenceError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_model_requires_provider() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();
        let result = tx
            .insert_model(NewModel {
                provider_id: RecordId::new(99),
                ai_model_name: "orphan".to_string(),
                categories: Default::default(),
                capabilities: Default::default(),
                meta: Default::default(),
            })
            .await;
        assert!(matches!(result, Err(PersistenceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();
        let result = tx.delete_skill(RecordId::new(5)).await;
        assert!(matches!(result, Err(PersistenceError::NotFound { .. })));
        let result = tx.delete_model(RecordId::new(5)).await;
        assert!(matches!(result, Err(PersistenceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflicts() {
        let gateway = MemoryGateway::new();

        let mut first = gateway.begin().await.unwrap();
        let mut second = gateway.begin().await.unwrap();
        first.insert_skill(new_skill("a")).await.unwrap();
        second.insert_skill(new_skill("b")).await.unwrap();

        first.commit().await.unwrap();
        let result = second.commit().await;
        assert!(matches!(result, Err(PersistenceError::Conflict { .. })));
        assert_eq!(gateway.skills().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_commit_does_not_conflict() {
        let gateway = MemoryGateway::new();

        let mut reader = gateway.begin().await.unwrap();
        let mut writer = gateway.begin().await.unwrap();
        reader.list_skills().await.unwrap();
        writer.insert_skill(new_skill("a")).await.unwrap();

        writer.commit().await.unwrap();
        reader.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let gateway = MemoryGateway::new();
        gateway.fail_on(Operation::InsertSkill);

        let mut tx = gateway.begin().await.unwrap();
        let result = tx.insert_skill(new_skill("a")).await;
        assert!(matches!(result, Err(PersistenceError::Backend { .. })));
        tx.insert_skill(new_skill("a")).await.unwrap();
    }
}
