//! JSON file persistence gateway.
//!
//! Committed state is written to a single JSON file in the platform data
//! directory (`~/.local/share/skillforge/store.json` on Linux). Each
//! commit writes a temporary sibling file and renames it over the old one.
//!
//! Several gateways, in one process or many, may share a file. Commits
//! take an exclusive lock on `store.json.lock` and compare the generation
//! stored in the file with the one the transaction started from; a
//! mismatch fails with [`PersistenceError::Conflict`]. `begin` reloads the
//! file when another gateway has committed since.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

use super::snapshot::{Snapshot, SnapshotCell};
use super::{PersistenceError, PersistenceGateway, Transaction};

/// Gateway backed by a JSON file.
pub struct JsonFileGateway {
    cell: SnapshotCell,
}

impl JsonFileGateway {
    /// Get the default store path.
    pub fn default_path() -> Result<PathBuf, PersistenceError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "skillforge").ok_or_else(
            || PersistenceError::Backend {
                message: "data directory not available".to_string(),
            },
        )?;
        Ok(dirs.data_dir().join("store.json"))
    }

    /// Open the store at a specific path.
    ///
    /// Creates parent directories if they don't exist. A missing file is
    /// an empty store; it is created on the first commit.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let snapshot = Snapshot::load(&path)?;
        tracing::debug!(
            "Opened store at {:?}: {} skills, {} providers",
            path,
            snapshot.skills.len(),
            snapshot.providers.len()
        );

        Ok(Self {
            cell: SnapshotCell::new(snapshot, Some(path)),
        })
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &Path {
        // Always set for file gateways.
        self.cell.path().unwrap_or_else(|| Path::new(""))
    }
}

impl std::fmt::Debug for JsonFileGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileGateway")
            .field("path", &self.path())
            .finish()
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileGateway {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, PersistenceError> {
        Ok(Box::new(self.cell.begin()?))
    }
}
