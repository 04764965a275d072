//! Catalog reconciliation.
//!
//! A [`Reconciler`] brings persisted skills, providers and models in line
//! with a [`CatalogSource`]. Every pass:
//!
//! 1. reads the catalog,
//! 2. opens one transaction and reads the stored state,
//! 3. computes a plan with the pure `plan_*` functions,
//! 4. stages the plan and commits once.
//!
//! Any failure rolls the transaction back, so a pass is all or nothing.
//! Passes on one reconciler are serialized; a second concurrent pass waits
//! for the first to finish.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skillforge_core::{CredentialCipher, MemoryGateway, Reconciler, RecordId, StaticCatalog};
//!
//! let reconciler = Reconciler::new(
//!     Arc::new(MemoryGateway::new()),
//!     Arc::new(CredentialCipher::ephemeral()),
//! );
//! let report = reconciler.sync_skills(&catalog, RecordId::new(1)).await?;
//! println!("created {:?}", report.created);
//! ```

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::bootstrap::{SuperuserSettings, ensure_superuser};
use crate::catalog::{CatalogError, CatalogSource};
use crate::model::{RecordId, UserRecord};
use crate::security::{CipherError, ConfigError, CredentialCipher, PasswordError, PasswordHasher};
use crate::store::{PersistenceError, PersistenceGateway, Transaction};

mod credentials;
mod providers;
mod skills;

pub use credentials::{merge_credential_field, merge_credentials};
pub use providers::{
    ModelDraft, ProviderAction, ProviderChange, ProviderPlan, ProviderSyncReport, StoredProvider,
    StoredProviders, apply_provider_plan, load_stored_providers, plan_providers,
};
pub use skills::{SkillPlan, SkillSyncReport, apply_skill_plan, plan_skills};

/// Error type for reconciliation passes.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("password error: {0}")]
    Password(#[from] PasswordError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a full bootstrap.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    /// The superuser that owns managed skills.
    pub superuser: UserRecord,

    /// Whether the superuser was created by this bootstrap.
    pub superuser_created: bool,

    pub skills: SkillSyncReport,
    pub providers: ProviderSyncReport,
}

impl BootstrapReport {
    /// Number of writes the bootstrap committed.
    pub fn mutation_count(&self) -> usize {
        usize::from(self.superuser_created)
            + self.skills.mutation_count()
            + self.providers.mutation_count()
    }
}

/// Reconciles persisted state against a catalog.
pub struct Reconciler<G> {
    gateway: Arc<G>,
    cipher: Arc<CredentialCipher>,
    pass_lock: Mutex<()>,
}

impl<G: PersistenceGateway> Reconciler<G> {
    /// Create a reconciler over a gateway.
    ///
    /// The cipher encrypts provider API keys before they are stored.
    pub fn new(gateway: Arc<G>, cipher: Arc<CredentialCipher>) -> Self {
        Self {
            gateway,
            cipher,
            pass_lock: Mutex::new(()),
        }
    }

    /// The gateway passes run against.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Synchronize managed skills with the catalog.
    ///
    /// New skills are created managed and owned by `owner_id`.
    pub async fn sync_skills(
        &self,
        catalog: &dyn CatalogSource,
        owner_id: RecordId,
    ) -> Result<SkillSyncReport, ReconcileError> {
        let _pass = self.pass_lock.lock().await;
        self.skill_pass(catalog, owner_id).await
    }

    /// Synchronize providers and their models with the catalog.
    pub async fn sync_providers(
        &self,
        catalog: &dyn CatalogSource,
    ) -> Result<ProviderSyncReport, ReconcileError> {
        let _pass = self.pass_lock.lock().await;
        self.provider_pass(catalog).await
    }

    /// Ensure the superuser exists, then run the skill and provider passes.
    ///
    /// Each step commits on its own; a failed step leaves earlier steps
    /// committed and can be retried by bootstrapping again.
    pub async fn bootstrap(
        &self,
        catalog: &dyn CatalogSource,
        superuser: &SuperuserSettings,
        passwords: &PasswordHasher,
    ) -> Result<BootstrapReport, ReconcileError> {
        let _pass = self.pass_lock.lock().await;

        let (user, created) = ensure_superuser(self.gateway.as_ref(), passwords, superuser).await?;
        let skills = self.skill_pass(catalog, user.id).await?;
        let providers = self.provider_pass(catalog).await?;

        let report = BootstrapReport {
            superuser: user,
            superuser_created: created,
            skills,
            providers,
        };
        tracing::info!("Bootstrap complete: {} writes", report.mutation_count());
        Ok(report)
    }

    async fn skill_pass(
        &self,
        catalog: &dyn CatalogSource,
        owner_id: RecordId,
    ) -> Result<SkillSyncReport, ReconcileError> {
        let desired = catalog.skills()?;
        let mut tx = self.gateway.begin().await?;

        let staged = async {
            let stored = tx.list_skills().await?;
            let plan = plan_skills(&desired, &stored, owner_id);
            Ok::<_, ReconcileError>(apply_skill_plan(tx.as_mut(), plan).await?)
        }
        .await;

        let report = finish(tx, staged).await?;
        tracing::info!(
            "Skill sync: {} created, {} updated, {} deleted",
            report.created.len(),
            report.updated.len(),
            report.deleted.len()
        );
        Ok(report)
    }

    async fn provider_pass(
        &self,
        catalog: &dyn CatalogSource,
    ) -> Result<ProviderSyncReport, ReconcileError> {
        let desired = catalog.providers()?;
        let mut tx = self.gateway.begin().await?;

        let staged = async {
            let stored = load_stored_providers(tx.as_mut(), &desired).await?;
            let plan = plan_providers(&desired, &stored, &self.cipher)?;
            Ok::<_, ReconcileError>(apply_provider_plan(tx.as_mut(), plan).await?)
        }
        .await;

        let report = finish(tx, staged).await?;
        tracing::info!(
            "Provider sync: {} providers created, {} updated; {} models created, {} updated, {} deleted",
            report.providers_created.len(),
            report.providers_updated.len(),
            report.models_created.len(),
            report.models_updated.len(),
            report.models_deleted.len()
        );
        Ok(report)
    }
}

impl<G> std::fmt::Debug for Reconciler<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

/// Commit a transaction if staging succeeded, roll it back otherwise.
async fn finish<T>(
    tx: Box<dyn Transaction + '_>,
    staged: Result<T, ReconcileError>,
) -> Result<T, ReconcileError> {
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tracing::warn!("Reconciliation pass failed, rolling back: {}", e);
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ManagedSkillDefinition, StaticCatalog};
    use crate::store::{MemoryGateway, Operation};

    fn reconciler() -> Reconciler<MemoryGateway> {
        Reconciler::new(
            Arc::new(MemoryGateway::new()),
            Arc::new(CredentialCipher::ephemeral()),
        )
    }

    #[tokio::test]
    async fn test_catalog_error_aborts_before_writes() {
        struct Broken;
        impl CatalogSource for Broken {
            fn skills(&self) -> Result<crate::catalog::SkillCatalog, CatalogError> {
                Err(CatalogError::Invalid {
                    message: "unreadable".to_string(),
                })
            }
            fn providers(&self) -> Result<crate::catalog::ProviderCatalog, CatalogError> {
                Ok(Default::default())
            }
        }

        let reconciler = reconciler();
        let result = reconciler.sync_skills(&Broken, RecordId::new(1)).await;
        assert!(matches!(result, Err(ReconcileError::Catalog(_))));
        assert_eq!(reconciler.gateway().committed_mutations(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_whole_pass() {
        let reconciler = reconciler();
        let catalog = StaticCatalog::new()
            .with_skill(ManagedSkillDefinition::new("a", ""))
            .unwrap()
            .with_skill(ManagedSkillDefinition::new("b", ""))
            .unwrap();

        reconciler.gateway().fail_on(Operation::InsertSkill);
        let result = reconciler.sync_skills(&catalog, RecordId::new(1)).await;
        assert!(matches!(result, Err(ReconcileError::Persistence(_))));
        assert!(reconciler.gateway().skills().is_empty());

        let report = reconciler
            .sync_skills(&catalog, RecordId::new(1))
            .await
            .unwrap();
        assert_eq!(report.created, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_passes_serialize() {
        let reconciler = Arc::new(reconciler());
        let catalog = Arc::new(
            StaticCatalog::new()
                .with_skill(ManagedSkillDefinition::new("web_search", ""))
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..4 {
            let reconciler = Arc::clone(&reconciler);
            let catalog = Arc::clone(&catalog);
            handles.push(tokio::spawn(async move {
                reconciler
                    .sync_skills(catalog.as_ref(), RecordId::new(1))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            created += handle.await.unwrap().unwrap().created.len();
        }
        assert_eq!(created, 1);
        assert_eq!(reconciler.gateway().skills().len(), 1);
    }
}
