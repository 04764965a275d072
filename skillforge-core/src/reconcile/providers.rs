//! Model provider and model reconciliation.
//!
//! Providers are matched by name and never deleted. A provider's API key
//! is encrypted before it is stored and is written only while no key is
//! stored; after that the stored key belongs to the operator. Models are
//! matched by name within their provider and mirror the catalog exactly.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::catalog::{ModelDefinition, ModelProviderDefinition, ProviderCatalog};
use crate::model::{ModelMeta, ModelRecord, NewModel, NewProvider, ProviderRecord, RecordId};
use crate::security::{CipherError, CredentialCipher, Secret};
use crate::store::{PersistenceError, Transaction};

/// A stored provider together with its models.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProvider {
    pub record: ProviderRecord,
    pub models: Vec<ModelRecord>,
}

/// Stored providers keyed by provider name.
pub type StoredProviders = BTreeMap<String, StoredProvider>;

/// What happens to the provider row itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderAction {
    /// Insert a new provider; its models attach to the assigned id.
    Create(NewProvider),

    /// Replace the stored provider with the merged record.
    Update(ProviderRecord),

    /// Leave the provider as stored.
    Unchanged(RecordId),
}

/// A model to insert once its provider id is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDraft {
    pub ai_model_name: String,
    pub categories: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub meta: ModelMeta,
}

impl ModelDraft {
    fn from_definition(definition: &ModelDefinition) -> Self {
        Self {
            ai_model_name: definition.name.clone(),
            categories: definition.categories.clone(),
            capabilities: definition.capabilities.clone(),
            meta: definition.meta(),
        }
    }

    fn into_new_model(self, provider_id: RecordId) -> NewModel {
        NewModel {
            provider_id,
            ai_model_name: self.ai_model_name,
            categories: self.categories,
            capabilities: self.capabilities,
            meta: self.meta,
        }
    }
}

/// Writes for one catalog provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderChange {
    pub provider_name: String,
    pub action: ProviderAction,
    pub model_creates: Vec<ModelDraft>,
    pub model_updates: Vec<ModelRecord>,
    pub model_deletes: Vec<ModelRecord>,
}

impl ProviderChange {
    fn is_empty(&self) -> bool {
        matches!(self.action, ProviderAction::Unchanged(_))
            && self.model_creates.is_empty()
            && self.model_updates.is_empty()
            && self.model_deletes.is_empty()
    }
}

/// Writes needed to bring stored providers in line with the catalog,
/// ordered by provider name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPlan {
    pub changes: Vec<ProviderChange>,
}

impl ProviderPlan {
    /// Check whether the plan writes nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Outcome of a provider pass.
///
/// Providers are listed by name, models as `provider/model`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderSyncReport {
    pub providers_created: Vec<String>,
    pub providers_updated: Vec<String>,
    pub models_created: Vec<String>,
    pub models_updated: Vec<String>,
    pub models_deleted: Vec<String>,
}

impl ProviderSyncReport {
    /// Number of writes the pass committed.
    pub fn mutation_count(&self) -> usize {
        self.providers_created.len()
            + self.providers_updated.len()
            + self.models_created.len()
            + self.models_updated.len()
            + self.models_deleted.len()
    }

    /// Check whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.mutation_count() == 0
    }
}

/// Read the stored state of every catalog provider.
pub async fn load_stored_providers(
    tx: &mut (dyn Transaction + '_),
    catalog: &ProviderCatalog,
) -> Result<StoredProviders, PersistenceError> {
    let mut stored = StoredProviders::new();
    for name in catalog.keys() {
        if let Some(record) = tx.find_provider_by_name(name).await? {
            let models = tx.list_models(record.id).await?;
            stored.insert(name.clone(), StoredProvider { record, models });
        }
    }
    Ok(stored)
}

/// Compute the writes for one provider pass.
///
/// Only the icon and description of a stored provider follow the catalog;
/// its base URL is left alone. Providers with nothing to write are left out
/// of the plan.
pub fn plan_providers(
    catalog: &ProviderCatalog,
    stored: &StoredProviders,
    cipher: &CredentialCipher,
) -> Result<ProviderPlan, CipherError> {
    let mut plan = ProviderPlan::default();

    for definition in catalog.values() {
        let change = match stored.get(&definition.provider_name) {
            Some(existing) => plan_existing_provider(definition, existing, cipher)?,
            None => ProviderChange {
                provider_name: definition.provider_name.clone(),
                action: ProviderAction::Create(new_provider(definition, cipher)?),
                model_creates: definition.models.iter().map(ModelDraft::from_definition).collect(),
                model_updates: Vec::new(),
                model_deletes: Vec::new(),
            },
        };
        if !change.is_empty() {
            plan.changes.push(change);
        }
    }

    Ok(plan)
}

/// Stage a provider plan on an open transaction.
///
/// New providers are flushed before their models are inserted so the
/// models can reference the assigned id.
pub async fn apply_provider_plan(
    tx: &mut (dyn Transaction + '_),
    plan: ProviderPlan,
) -> Result<ProviderSyncReport, PersistenceError> {
    let mut report = ProviderSyncReport::default();

    for change in plan.changes {
        let name = change.provider_name;
        let provider_id = match change.action {
            ProviderAction::Create(provider) => {
                let record = tx.insert_provider(provider).await?;
                tx.flush().await?;
                tracing::debug!("Created provider {}", name);
                report.providers_created.push(name.clone());
                record.id
            }
            ProviderAction::Update(record) => {
                tx.update_provider(&record).await?;
                tracing::debug!("Updated provider {}", name);
                report.providers_updated.push(name.clone());
                record.id
            }
            ProviderAction::Unchanged(id) => id,
        };

        for draft in change.model_creates {
            let model = tx.insert_model(draft.into_new_model(provider_id)).await?;
            report
                .models_created
                .push(format!("{}/{}", name, model.ai_model_name));
        }
        for model in change.model_updates {
            tx.update_model(&model).await?;
            report
                .models_updated
                .push(format!("{}/{}", name, model.ai_model_name));
        }
        for model in change.model_deletes {
            tx.delete_model(model.id).await?;
            report
                .models_deleted
                .push(format!("{}/{}", name, model.ai_model_name));
        }
    }

    Ok(report)
}

fn new_provider(
    definition: &ModelProviderDefinition,
    cipher: &CredentialCipher,
) -> Result<NewProvider, CipherError> {
    Ok(NewProvider {
        provider_name: definition.provider_name.clone(),
        base_url: definition.base_url.clone(),
        icon: definition.icon.clone(),
        description: definition.description.clone(),
        api_key: encrypt_api_key(definition.api_key.as_ref(), cipher)?,
    })
}

fn plan_existing_provider(
    definition: &ModelProviderDefinition,
    existing: &StoredProvider,
    cipher: &CredentialCipher,
) -> Result<ProviderChange, CipherError> {
    let mut merged = ProviderRecord {
        icon: definition.icon.clone(),
        description: definition.description.clone(),
        ..existing.record.clone()
    };
    if !merged.has_api_key() {
        if let Some(encrypted) = encrypt_api_key(definition.api_key.as_ref(), cipher)? {
            merged.api_key = Some(encrypted);
        }
    }

    let action = if merged == existing.record {
        ProviderAction::Unchanged(existing.record.id)
    } else {
        ProviderAction::Update(merged)
    };

    let mut change = ProviderChange {
        provider_name: definition.provider_name.clone(),
        action,
        model_creates: Vec::new(),
        model_updates: Vec::new(),
        model_deletes: Vec::new(),
    };

    let stored_models: BTreeMap<&str, &ModelRecord> = existing
        .models
        .iter()
        .map(|model| (model.ai_model_name.as_str(), model))
        .collect();

    for model in &definition.models {
        match stored_models.get(model.name.as_str()) {
            Some(stored) => {
                let updated = ModelRecord {
                    categories: model.categories.clone(),
                    capabilities: model.capabilities.clone(),
                    meta: model.meta(),
                    ..(*stored).clone()
                };
                if updated != **stored {
                    change.model_updates.push(updated);
                }
            }
            None => change.model_creates.push(ModelDraft::from_definition(model)),
        }
    }

    let wanted: BTreeSet<&str> = definition.models.iter().map(|m| m.name.as_str()).collect();
    change.model_deletes = existing
        .models
        .iter()
        .filter(|model| !wanted.contains(model.ai_model_name.as_str()))
        .cloned()
        .collect();

    Ok(change)
}

/// Encrypt a catalog API key; empty or absent keys store nothing.
fn encrypt_api_key(
    api_key: Option<&Secret>,
    cipher: &CredentialCipher,
) -> Result<Option<String>, CipherError> {
    match api_key {
        Some(key) if !key.is_empty() => Ok(Some(cipher.encrypt(key.expose())?)),
        _ => Ok(None),
    }
}
