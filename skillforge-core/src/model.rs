//! Persisted record types for Skillforge.
//!
//! This module defines the records the persistence gateway stores:
//! - [`RecordId`] - Identity assigned by the gateway on insert
//! - [`UserRecord`] - A user (the bootstrap superuser owns managed skills)
//! - [`SkillRecord`] - A skill with its credential fields
//! - [`CredentialField`] - One credential field descriptor and its stored value
//! - [`ProviderRecord`] - A model provider with its encrypted API key
//! - [`ModelRecord`] - One model offered by a provider
//!
//! The `New*` types carry the same fields minus the identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of a persisted record.
///
/// # Examples
///
/// ```
/// use skillforge_core::RecordId;
///
/// let id = RecordId::new(7);
/// assert_eq!(id.to_string(), "7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: RecordId,
    pub email: String,
    pub hashed_password: String,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

/// A user to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: String,
    pub is_superuser: bool,
}

/// One named input parameter of a skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    pub name: String,

    /// Type descriptor, e.g. `"str"` or `"int"`.
    #[serde(rename = "type")]
    pub param_type: String,
}

impl InputParameter {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
        }
    }
}

/// A credential field: descriptor metadata plus an optional stored value.
///
/// Unknown descriptor keys are kept in `extra` so catalog metadata survives
/// a round trip through storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CredentialField {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CredentialField {
    /// Create a field descriptor with a type and no value.
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: Some(field_type.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The stored value, if it is present and non-empty.
    pub fn stored_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}

/// Credential fields keyed by field name.
pub type Credentials = BTreeMap<String, CredentialField>;

/// A stored skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: RecordId,
    pub name: String,
    pub description: String,
    pub display_name: Option<String>,

    /// `true` when the catalog owns this skill; user-created skills are `false`.
    pub managed: bool,
    pub owner_id: RecordId,
    pub input_parameters: Vec<InputParameter>,
    pub credentials: Option<Credentials>,
}

/// A skill to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSkill {
    pub name: String,
    pub description: String,
    pub display_name: Option<String>,
    pub managed: bool,
    pub owner_id: RecordId,
    pub input_parameters: Vec<InputParameter>,
    pub credentials: Option<Credentials>,
}

/// A stored model provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: RecordId,
    pub provider_name: String,
    pub base_url: String,
    pub icon: Option<String>,
    pub description: String,

    /// API key encrypted by the credential cipher.
    pub api_key: Option<String>,
}

impl ProviderRecord {
    /// Whether an API key is stored.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A provider to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProvider {
    pub provider_name: String,
    pub base_url: String,
    pub icon: Option<String>,
    pub description: String,
    pub api_key: Option<String>,
}

/// Free-form model metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Embedding dimension, for embedding models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
}

/// A stored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: RecordId,
    pub provider_id: RecordId,
    pub ai_model_name: String,
    pub categories: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub meta: ModelMeta,
}

/// A model to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewModel {
    pub provider_id: RecordId,
    pub ai_model_name: String,
    pub categories: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub meta: ModelMeta,
}
