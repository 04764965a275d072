//! CLI configuration handling.
//!
//! Settings come from `skillforge.toml` in the platform config directory
//! (or the file given with `--config`), then environment variables override
//! the secrets:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `SKILLFORGE_ENCRYPTION_KEY` | `security.encryption_key` |
//! | `SKILLFORGE_SECRET_KEY` | `security.secret_key` |
//! | `SKILLFORGE_FIRST_SUPERUSER` | `superuser.email` |
//! | `SKILLFORGE_FIRST_SUPERUSER_PASSWORD` | `superuser.password` |

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::Deserialize;
use skillforge_core::{Secret, SecuritySettings, SuperuserSettings};
use std::path::{Path, PathBuf};

pub const ENCRYPTION_KEY_VAR: &str = "SKILLFORGE_ENCRYPTION_KEY";
pub const SECRET_KEY_VAR: &str = "SKILLFORGE_SECRET_KEY";
pub const SUPERUSER_VAR: &str = "SKILLFORGE_FIRST_SUPERUSER";
pub const SUPERUSER_PASSWORD_VAR: &str = "SKILLFORGE_FIRST_SUPERUSER_PASSWORD";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory holding the store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Catalog of managed skills and providers.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub security: SecuritySettings,

    /// First superuser, owner of managed skills.
    #[serde(default)]
    pub superuser: Option<SuperuserSettings>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".skillforge"))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            data_dir: default_data_dir(),
            catalog_path: None,
            log_level: default_log_level(),
            security: SecuritySettings::default(),
            superuser: None,
        }
    }
}

impl AppConfig {
    /// Path of the JSON store inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Empty values are ignored. Either superuser variable alone creates
    /// the superuser section; a half-filled section is rejected when the
    /// superuser is provisioned.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(key) = get(ENCRYPTION_KEY_VAR) {
            self.security.encryption_key = Some(Secret::new(key));
        }
        if let Some(key) = get(SECRET_KEY_VAR) {
            self.security.secret_key = Some(Secret::new(key));
        }

        let email = get(SUPERUSER_VAR);
        let password = get(SUPERUSER_PASSWORD_VAR);
        if email.is_some() || password.is_some() {
            let superuser = self
                .superuser
                .get_or_insert_with(|| SuperuserSettings::new("", ""));
            if let Some(email) = email {
                superuser.email = email;
            }
            if let Some(password) = password {
                superuser.password = Secret::new(password);
            }
        }
    }
}

/// Load configuration from `path`, or the default location when `None`.
///
/// A missing default file yields defaults; a missing explicit file is an
/// error. Environment overrides are applied, the security settings are
/// validated and the data directory is created.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {:?} does not exist", path);
            }
            path.to_path_buf()
        }
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        AppConfig::default()
    };

    config.config_path = config_path;
    config.apply_overrides(|name| std::env::var(name).ok());
    config
        .security
        .validate()
        .with_context(|| format!("Invalid security settings in {:?}", config.config_path))?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

    Ok(config)
}

fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(toml::from_str(contents)?)
}

fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("skillforge.toml"))
        .unwrap_or_else(|| PathBuf::from("skillforge.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "skillforge")
}
