//! Snapshot-isolated transactions shared by the memory and file gateways.

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::{PersistenceError, Transaction};
use crate::model::{
    ModelRecord, NewModel, NewProvider, NewSkill, NewUser, ProviderRecord, RecordId, SkillRecord,
    UserRecord,
};

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Transaction operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    InsertUser,
    InsertSkill,
    UpdateSkill,
    DeleteSkill,
    InsertProvider,
    UpdateProvider,
    InsertModel,
    UpdateModel,
    DeleteModel,
    Commit,
}

/// Every stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    /// Version of the store format (for future migrations).
    pub(crate) version: u32,
    /// Number of commits published so far. Files written before this
    /// field existed read as generation 0.
    #[serde(default)]
    pub(crate) generation: u64,
    pub(crate) next_id: i64,
    pub(crate) users: Vec<UserRecord>,
    pub(crate) skills: Vec<SkillRecord>,
    pub(crate) providers: Vec<ProviderRecord>,
    pub(crate) models: Vec<ModelRecord>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            generation: 0,
            next_id: 1,
            users: Vec::new(),
            skills: Vec::new(),
            providers: Vec::new(),
            models: Vec::new(),
        }
    }
}

impl Snapshot {
    fn allocate_id(&mut self) -> RecordId {
        let id = RecordId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Read a snapshot file, or an empty snapshot if the file is missing.
    pub(crate) fn load(path: &Path) -> Result<Self, PersistenceError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        if snapshot.version > FORMAT_VERSION {
            return Err(PersistenceError::Backend {
                message: format!(
                    "unsupported store format version {} (expected <= {})",
                    snapshot.version, FORMAT_VERSION
                ),
            });
        }
        Ok(snapshot)
    }

    /// Write the snapshot next to `path`, then rename over it.
    fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let contents = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// Exclusive advisory lock on the `.lock` sibling of a store file.
///
/// Serializes commits from every process sharing the file. Released on
/// drop.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, PersistenceError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path.with_extension("json.lock"))?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock store: {}", e);
        }
    }
}

struct Committed {
    snapshot: Snapshot,
    mutations: u64,
}

/// The committed state of a gateway plus its optional backing file.
pub(crate) struct SnapshotCell {
    state: RwLock<Committed>,
    path: Option<PathBuf>,
    fail_on: Mutex<Option<Operation>>,
}

impl SnapshotCell {
    pub(crate) fn new(snapshot: Snapshot, path: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(Committed {
                snapshot,
                mutations: 0,
            }),
            path,
            fail_on: Mutex::new(None),
        }
    }

    /// Start a transaction on the latest committed state.
    ///
    /// File-backed cells first pick up commits published by other
    /// gateways on the same file.
    pub(crate) fn begin(&self) -> Result<SnapshotTransaction<'_>, PersistenceError> {
        if let Some(path) = self.path() {
            self.refresh(path)?;
        }

        let state = self.state.read();
        Ok(SnapshotTransaction {
            cell: self,
            base_generation: state.snapshot.generation,
            working: state.snapshot.clone(),
            mutations: 0,
        })
    }

    fn refresh(&self, path: &Path) -> Result<(), PersistenceError> {
        let on_disk = Snapshot::load(path)?;
        let mut state = self.state.write();
        if on_disk.generation != state.snapshot.generation {
            tracing::debug!(
                "Store at {:?} moved from generation {} to {}",
                path,
                state.snapshot.generation,
                on_disk.generation
            );
            state.snapshot = on_disk;
        }
        Ok(())
    }

    /// Make the next occurrence of `operation` fail with a backend error.
    pub(crate) fn fail_on(&self, operation: Operation) {
        *self.fail_on.lock() = Some(operation);
    }

    /// Total writes published by committed transactions.
    pub(crate) fn committed_mutations(&self) -> u64 {
        self.state.read().mutations
    }

    /// A copy of the committed state.
    pub(crate) fn committed(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn check(&self, operation: Operation) -> Result<(), PersistenceError> {
        let mut fail_on = self.fail_on.lock();
        if *fail_on == Some(operation) {
            *fail_on = None;
            return Err(PersistenceError::Backend {
                message: format!("injected failure on {:?}", operation),
            });
        }
        Ok(())
    }
}

/// A private working copy of the committed snapshot.
pub(crate) struct SnapshotTransaction<'a> {
    cell: &'a SnapshotCell,
    working: Snapshot,
    base_generation: u64,
    mutations: u64,
}

impl SnapshotTransaction<'_> {
    fn write(&mut self, operation: Operation) -> Result<(), PersistenceError> {
        self.cell.check(operation)?;
        self.mutations += 1;
        Ok(())
    }
}

fn not_found(entity: &str, id: RecordId) -> PersistenceError {
    PersistenceError::NotFound {
        entity: entity.to_string(),
        key: id.to_string(),
    }
}

fn duplicate(entity: &str, key: impl Into<String>) -> PersistenceError {
    PersistenceError::Duplicate {
        entity: entity.to_string(),
        key: key.into(),
    }
}

#[async_trait]
impl Transaction for SnapshotTransaction<'_> {
    async fn find_user_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<UserRecord>, PersistenceError> {
        Ok(self.working.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<UserRecord, PersistenceError> {
        if self.working.users.iter().any(|u| u.email == user.email) {
            return Err(duplicate("user", user.email));
        }
        self.write(Operation::InsertUser)?;

        let record = UserRecord {
            id: self.working.allocate_id(),
            email: user.email,
            hashed_password: user.hashed_password,
            is_superuser: user.is_superuser,
            created_at: Utc::now(),
        };
        self.working.users.push(record.clone());
        Ok(record)
    }

    async fn list_skills(&mut self) -> Result<Vec<SkillRecord>, PersistenceError> {
        Ok(self.working.skills.clone())
    }

    async fn insert_skill(&mut self, skill: NewSkill) -> Result<SkillRecord, PersistenceError> {
        if self.working.skills.iter().any(|s| s.name == skill.name) {
            return Err(duplicate("skill", skill.name));
        }
        self.write(Operation::InsertSkill)?;

        let record = SkillRecord {
            id: self.working.allocate_id(),
            name: skill.name,
            description: skill.description,
            display_name: skill.display_name,
            managed: skill.managed,
            owner_id: skill.owner_id,
            input_parameters: skill.input_parameters,
            credentials: skill.credentials,
        };
        self.working.skills.push(record.clone());
        Ok(record)
    }

    async fn update_skill(&mut self, skill: &SkillRecord) -> Result<(), PersistenceError> {
        if self
            .working
            .skills
            .iter()
            .any(|s| s.id != skill.id && s.name == skill.name)
        {
            return Err(duplicate("skill", skill.name.clone()));
        }
        let position = self
            .working
            .skills
            .iter()
            .position(|s| s.id == skill.id)
            .ok_or_else(|| not_found("skill", skill.id))?;
        self.write(Operation::UpdateSkill)?;

        self.working.skills[position] = skill.clone();
        Ok(())
    }

    async fn delete_skill(&mut self, id: RecordId) -> Result<(), PersistenceError> {
        let position = self
            .working
            .skills
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| not_found("skill", id))?;
        self.write(Operation::DeleteSkill)?;

        self.working.skills.remove(position);
        Ok(())
    }

    async fn list_providers(&mut self) -> Result<Vec<ProviderRecord>, PersistenceError> {
        Ok(self.working.providers.clone())
    }

    async fn find_provider_by_name(
        &mut self,
        provider_name: &str,
    ) -> Result<Option<ProviderRecord>, PersistenceError> {
        Ok(self
            .working
            .providers
            .iter()
            .find(|p| p.provider_name == provider_name)
            .cloned())
    }

    async fn insert_provider(
        &mut self,
        provider: NewProvider,
    ) -> Result<ProviderRecord, PersistenceError> {
        if self
            .working
            .providers
            .iter()
            .any(|p| p.provider_name == provider.provider_name)
        {
            return Err(duplicate("provider", provider.provider_name));
        }
        self.write(Operation::InsertProvider)?;

        let record = ProviderRecord {
            id: self.working.allocate_id(),
            provider_name: provider.provider_name,
            base_url: provider.base_url,
            icon: provider.icon,
            description: provider.description,
            api_key: provider.api_key,
        };
        self.working.providers.push(record.clone());
        Ok(record)
    }

    async fn update_provider(
        &mut self,
        provider: &ProviderRecord,
    ) -> Result<(), PersistenceError> {
        if self
            .working
            .providers
            .iter()
            .any(|p| p.id != provider.id && p.provider_name == provider.provider_name)
        {
            return Err(duplicate("provider", provider.provider_name.clone()));
        }
        let position = self
            .working
            .providers
            .iter()
            .position(|p| p.id == provider.id)
            .ok_or_else(|| not_found("provider", provider.id))?;
        self.write(Operation::UpdateProvider)?;

        self.working.providers[position] = provider.clone();
        Ok(())
    }

    async fn list_models(
        &mut self,
        provider_id: RecordId,
    ) -> Result<Vec<ModelRecord>, PersistenceError> {
        Ok(self
            .working
            .models
            .iter()
            .filter(|m| m.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn insert_model(&mut self, model: NewModel) -> Result<ModelRecord, PersistenceError> {
        if !self.working.providers.iter().any(|p| p.id == model.provider_id) {
            return Err(not_found("provider", model.provider_id));
        }
        if self
            .working
            .models
            .iter()
            .any(|m| m.provider_id == model.provider_id && m.ai_model_name == model.ai_model_name)
        {
            return Err(duplicate(
                "model",
                format!("{}/{}", model.provider_id, model.ai_model_name),
            ));
        }
        self.write(Operation::InsertModel)?;

        let record = ModelRecord {
            id: self.working.allocate_id(),
            provider_id: model.provider_id,
            ai_model_name: model.ai_model_name,
            categories: model.categories,
            capabilities: model.capabilities,
            meta: model.meta,
        };
        self.working.models.push(record.clone());
        Ok(record)
    }

    async fn update_model(&mut self, model: &ModelRecord) -> Result<(), PersistenceError> {
        if self.working.models.iter().any(|m| {
            m.id != model.id
                && m.provider_id == model.provider_id
                && m.ai_model_name == model.ai_model_name
        }) {
            return Err(duplicate(
                "model",
                format!("{}/{}", model.provider_id, model.ai_model_name),
            ));
        }
        let position = self
            .working
            .models
            .iter()
            .position(|m| m.id == model.id)
            .ok_or_else(|| not_found("model", model.id))?;
        self.write(Operation::UpdateModel)?;

        self.working.models[position] = model.clone();
        Ok(())
    }

    async fn delete_model(&mut self, id: RecordId) -> Result<(), PersistenceError> {
        let position = self
            .working
            .models
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| not_found("model", id))?;
        self.write(Operation::DeleteModel)?;

        self.working.models.remove(position);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let SnapshotTransaction {
            cell,
            mut working,
            base_generation,
            mutations,
        } = *self;
        cell.check(Operation::Commit)?;

        // Read-only transactions publish nothing.
        if mutations == 0 {
            return Ok(());
        }

        let mut state = cell.state.write();

        // Other processes may have committed to the same file.
        let _lock = cell.path().map(FileLock::acquire).transpose()?;
        let current = match cell.path() {
            Some(path) => Snapshot::load(path)?.generation,
            None => state.snapshot.generation,
        };
        if current != base_generation {
            return Err(PersistenceError::Conflict {
                message: format!(
                    "store changed since transaction began (generation {} -> {})",
                    base_generation, current
                ),
            });
        }

        working.generation = base_generation + 1;
        if let Some(path) = cell.path() {
            working.save(path)?;
        }

        state.snapshot = working;
        state.mutations += mutations;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        tracing::debug!("Rolling back transaction with {} staged writes", self.mutations);
        Ok(())
    }
}
