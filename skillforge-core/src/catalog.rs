//! Managed skill and model provider catalogs.
//!
//! This module provides:
//! - [`ManagedSkillDefinition`] - A catalog-defined skill
//! - [`ModelProviderDefinition`] / [`ModelDefinition`] - A catalog-defined provider and its models
//! - [`CatalogSource`] - Trait for read-only catalog backends, pulled fresh each pass
//! - [`StaticCatalog`] - In-memory catalog, optionally loaded from a TOML or JSON file
//!
//! # File Format
//!
//! ```toml
//! [[skills]]
//! name = "web_search"
//! description = "Search the web"
//! display_name = "Web Search"
//! input_parameters = [{ name = "query", type = "str" }]
//!
//! [skills.credentials.api_key]
//! type = "string"
//! description = "Search API key"
//!
//! [[providers]]
//! provider_name = "openai"
//! base_url = "https://api.openai.com/v1"
//! api_key = ""
//!
//! [[providers.models]]
//! name = "gpt-4o"
//! categories = ["llm", "chat"]
//! capabilities = ["vision"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::model::{Credentials, InputParameter, ModelMeta};
use crate::security::Secret;

/// Error type for catalog loading.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Two entries share a unique name.
    #[error("duplicate {kind} in catalog: {name}")]
    Duplicate { kind: String, name: String },

    /// An entry is structurally unusable.
    #[error("invalid catalog entry: {message}")]
    Invalid { message: String },

    /// The catalog file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog file could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// A skill as defined by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedSkillDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub input_parameters: Vec<InputParameter>,

    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl ManagedSkillDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            display_name: None,
            input_parameters: Vec::new(),
            credentials: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_input_parameter(mut self, parameter: InputParameter) -> Self {
        self.input_parameters.push(parameter);
        self
    }

    pub fn with_credential(
        mut self,
        name: impl Into<String>,
        field: crate::model::CredentialField,
    ) -> Self {
        self.credentials
            .get_or_insert_with(Credentials::new)
            .insert(name.into(), field);
        self
    }
}

/// A model as defined by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,

    #[serde(default)]
    pub categories: BTreeSet<String>,

    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    #[serde(default)]
    pub dimension: Option<u32>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categories: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            dimension: None,
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dimension(mut self, dimension: u32) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Metadata stored alongside the model record.
    pub fn meta(&self) -> ModelMeta {
        ModelMeta {
            dimension: self.dimension,
        }
    }
}

/// A model provider as defined by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProviderDefinition {
    pub provider_name: String,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Plaintext key from the catalog; encrypted before storage.
    #[serde(default)]
    pub api_key: Option<Secret>,

    /// Supported models, in catalog order.
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
}

impl ModelProviderDefinition {
    pub fn new(provider_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            base_url: base_url.into(),
            icon: None,
            description: String::new(),
            api_key: None,
            models: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<Secret>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: ModelDefinition) -> Self {
        self.models.push(model);
        self
    }
}

/// Skill definitions keyed (and ordered) by name.
pub type SkillCatalog = BTreeMap<String, ManagedSkillDefinition>;

/// Provider definitions keyed (and ordered) by provider name.
pub type ProviderCatalog = BTreeMap<String, ModelProviderDefinition>;

/// Read-only source of desired skills and providers.
///
/// Implementations are queried once per reconciliation pass.
pub trait CatalogSource: Send + Sync {
    /// All managed skills.
    fn skills(&self) -> Result<SkillCatalog, CatalogError>;

    /// All model providers with their supported models.
    fn providers(&self) -> Result<ProviderCatalog, CatalogError>;
}

/// On-disk catalog layout.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    skills: Vec<ManagedSkillDefinition>,

    #[serde(default)]
    providers: Vec<ModelProviderDefinition>,
}

/// Catalog held in memory.
///
/// # Example
///
/// ```
/// use skillforge_core::catalog::{
///     CatalogSource, ManagedSkillDefinition, ModelDefinition, ModelProviderDefinition,
///     StaticCatalog,
/// };
///
/// let catalog = StaticCatalog::new()
///     .with_skill(ManagedSkillDefinition::new("web_search", "Search the web"))
///     .unwrap()
///     .with_provider(
///         ModelProviderDefinition::new("openai", "https://api.openai.com/v1")
///             .with_model(ModelDefinition::new("gpt-4o")),
///     )
///     .unwrap();
///
/// assert_eq!(catalog.skills().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    skills: SkillCatalog,
    providers: ProviderCatalog,
}

impl StaticCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a skill, rejecting duplicate names.
    pub fn with_skill(mut self, skill: ManagedSkillDefinition) -> Result<Self, CatalogError> {
        self.add_skill(skill)?;
        Ok(self)
    }

    /// Add a provider, rejecting duplicate provider or model names.
    pub fn with_provider(
        mut self,
        provider: ModelProviderDefinition,
    ) -> Result<Self, CatalogError> {
        self.add_provider(provider)?;
        Ok(self)
    }

    fn add_skill(&mut self, skill: ManagedSkillDefinition) -> Result<(), CatalogError> {
        if skill.name.trim().is_empty() {
            return Err(CatalogError::Invalid {
                message: "skill with empty name".to_string(),
            });
        }
        if self.skills.contains_key(&skill.name) {
            return Err(CatalogError::Duplicate {
                kind: "skill".to_string(),
                name: skill.name,
            });
        }
        self.skills.insert(skill.name.clone(), skill);
        Ok(())
    }

    fn add_provider(&mut self, provider: ModelProviderDefinition) -> Result<(), CatalogError> {
        if provider.provider_name.trim().is_empty() {
            return Err(CatalogError::Invalid {
                message: "provider with empty name".to_string(),
            });
        }
        if self.providers.contains_key(&provider.provider_name) {
            return Err(CatalogError::Duplicate {
                kind: "provider".to_string(),
                name: provider.provider_name,
            });
        }

        let mut seen = BTreeSet::new();
        for model in &provider.models {
            if !seen.insert(model.name.as_str()) {
                return Err(CatalogError::Duplicate {
                    kind: "model".to_string(),
                    name: format!("{}/{}", provider.provider_name, model.name),
                });
            }
        }

        self.providers
            .insert(provider.provider_name.clone(), provider);
        Ok(())
    }

    /// Parse a catalog from TOML.
    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(contents).map_err(|e| CatalogError::Parse {
            message: e.to_string(),
        })?;
        Self::from_file(file)
    }

    /// Parse a catalog from JSON.
    pub fn from_json_str(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(contents).map_err(|e| CatalogError::Parse {
                message: e.to_string(),
            })?;
        Self::from_file(file)
    }

    /// Load a catalog file, choosing the format by extension (`.json` or TOML).
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let catalog = if is_json {
            Self::from_json_str(&contents)?
        } else {
            Self::from_toml_str(&contents)?
        };

        tracing::debug!(
            "Loaded catalog from {:?}: {} skills, {} providers",
            path,
            catalog.skills.len(),
            catalog.providers.len()
        );
        Ok(catalog)
    }

    fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for skill in file.skills {
            catalog.add_skill(skill)?;
        }
        for provider in file.providers {
            catalog.add_provider(provider)?;
        }
        Ok(catalog)
    }
}

impl CatalogSource for StaticCatalog {
    fn skills(&self) -> Result<SkillCatalog, CatalogError> {
        Ok(self.skills.clone())
    }

    fn providers(&self) -> Result<ProviderCatalog, CatalogError> {
        Ok(self.providers.clone())
    }
}
