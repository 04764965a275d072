//! Skillforge CLI
//!
//! Command-line interface for catalog reconciliation and credential
//! utilities.
//!
//! # Usage
//!
//! ```bash
//! # Create the superuser and sync managed skills and providers
//! skillforge sync --catalog catalog.toml
//!
//! # Show stored skills and providers with redacted keys
//! skillforge status
//!
//! # Generate key material for skillforge.toml
//! skillforge gen-encryption-key
//! skillforge gen-api-key
//!
//! # Issue and check an access token
//! skillforge issue-token admin@example.com --ttl-minutes 60
//! skillforge verify-token eyJ0eXAi...
//!
//! # Hash a password read from stdin
//! echo -n hunter2 | skillforge hash-password
//! ```

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use skillforge_core::security::{generate_encoded_key, ttl_from_minutes};
use skillforge_core::{
    ConfigError, JsonFileGateway, PasswordHasher, PersistenceGateway, Reconciler,
    SecretKeyManager, SecuritySettings, StaticCatalog,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "skillforge")]
#[command(about = "Managed skill and model provider sync for the raibid-labs ecosystem")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the superuser exists and sync skills and providers
    Sync {
        /// Catalog file (TOML or JSON); overrides `catalog_path`
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show stored skills, providers and models
    Status,

    /// Generate a random API key
    GenApiKey,

    /// Generate a random encryption key for `security.encryption_key`
    GenEncryptionKey,

    /// Issue a signed access token
    IssueToken {
        /// Token subject (e.g., a user email)
        subject: String,

        /// Token lifetime; defaults to `security.access_token_ttl_minutes`
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },

    /// Verify an access token and print its claims
    VerifyToken {
        /// Token to verify
        token: String,
    },

    /// Hash a password read from stdin
    HashPassword,

    /// Check a password read from stdin against a stored digest
    VerifyPassword {
        /// Digest produced by hash-password
        digest: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.log_level);
    info!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::Sync { catalog, format } => sync(&config, catalog.as_deref(), &format).await,
        Commands::Status => status(&config).await,
        Commands::GenApiKey => {
            let keys = SecretKeyManager::new();
            let key = keys.generate();
            println!("{}", key);
            println!("Redacted: {}", keys.redact(&key));
            Ok(())
        }
        Commands::GenEncryptionKey => {
            println!("{}", generate_encoded_key().expose());
            Ok(())
        }
        Commands::IssueToken {
            subject,
            ttl_minutes,
        } => issue_token(&config.security, &subject, ttl_minutes),
        Commands::VerifyToken { token } => verify_token(&config.security, &token),
        Commands::HashPassword => hash_password(),
        Commands::VerifyPassword { digest } => verify_password(&digest),
    }
}

fn init_logging(verbose: bool, level: &str) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &AppConfig) -> Result<Arc<JsonFileGateway>> {
    let path = config.store_path();
    let gateway = JsonFileGateway::open(&path)
        .with_context(|| format!("Failed to open store at {:?}", path))?;
    Ok(Arc::new(gateway))
}

async fn sync(config: &AppConfig, catalog_override: Option<&Path>, format: &str) -> Result<()> {
    let catalog_path = catalog_override
        .or(config.catalog_path.as_deref())
        .ok_or_else(|| anyhow!("No catalog given; pass --catalog or set catalog_path"))?;
    let catalog = StaticCatalog::load(catalog_path)
        .with_context(|| format!("Failed to load catalog from {:?}", catalog_path))?;

    let superuser = config.superuser.as_ref().ok_or_else(|| ConfigError::Missing {
        name: "superuser".to_string(),
    })?;

    let reconciler = Reconciler::new(open_store(config)?, Arc::new(config.security.cipher()?));
    let report = reconciler
        .bootstrap(&catalog, superuser, &PasswordHasher::new())
        .await?;

    match format {
        "json" => {
            let output = serde_json::json!({
                "superuser": report.superuser.email,
                "superuser_created": report.superuser_created,
                "skills": report.skills,
                "providers": report.providers,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            if report.superuser_created {
                println!("Created superuser {}", report.superuser.email);
            }
            print_changes("Skills created", &report.skills.created);
            print_changes("Skills updated", &report.skills.updated);
            print_changes("Skills deleted", &report.skills.deleted);
            print_changes("Providers created", &report.providers.providers_created);
            print_changes("Providers updated", &report.providers.providers_updated);
            print_changes("Models created", &report.providers.models_created);
            print_changes("Models updated", &report.providers.models_updated);
            print_changes("Models deleted", &report.providers.models_deleted);
            if report.mutation_count() == 0 {
                println!("Already in sync");
            }
        }
    }
    Ok(())
}

fn print_changes(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("{}: {}", label, names.join(", "));
    }
}

async fn status(config: &AppConfig) -> Result<()> {
    let gateway = open_store(config)?;
    let cipher = config.security.configured_cipher()?;
    let keys = SecretKeyManager::new();

    let mut tx = gateway.begin().await?;

    let skills = tx.list_skills().await?;
    println!("Skills ({}):", skills.len());
    for skill in &skills {
        let (filled, total) = skill.credentials.as_ref().map_or((0, 0), |creds| {
            let filled = creds.values().filter(|f| f.stored_value().is_some()).count();
            (filled, creds.len())
        });
        println!(
            "  [{}] {}{}",
            skill.id,
            skill.name,
            if skill.managed { " [managed]" } else { "" }
        );
        if let Some(display_name) = &skill.display_name {
            println!("      Display name: {}", display_name);
        }
        if !skill.description.is_empty() {
            println!("      Description: {}", skill.description);
        }
        println!("      Credentials: {}/{} set", filled, total);
    }

    let providers = tx.list_providers().await?;
    println!("Providers ({}):", providers.len());
    for provider in &providers {
        let key = match (provider.api_key.as_deref(), cipher.as_ref()) {
            (None | Some(""), _) => "none".to_string(),
            (Some(_), None) => "<no encryption key configured>".to_string(),
            (Some(encrypted), Some(cipher)) => match cipher.decrypt(encrypted) {
                Ok(plain) => keys.redact(&plain),
                Err(_) => "<undecryptable>".to_string(),
            },
        };
        println!("  [{}] {} ({})", provider.id, provider.provider_name, provider.base_url);
        println!("      Key: {}", key);

        for model in tx.list_models(provider.id).await? {
            let mut details = Vec::new();
            if !model.categories.is_empty() {
                details.push(format!("categories: {}", join(&model.categories)));
            }
            if !model.capabilities.is_empty() {
                details.push(format!("capabilities: {}", join(&model.capabilities)));
            }
            if let Some(dimension) = model.meta.dimension {
                details.push(format!("dimension: {}", dimension));
            }
            if details.is_empty() {
                println!("      - {}", model.ai_model_name);
            } else {
                println!("      - {} ({})", model.ai_model_name, details.join("; "));
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

fn join(values: &std::collections::BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn issue_token(settings: &SecuritySettings, subject: &str, ttl_minutes: Option<i64>) -> Result<()> {
    let issuer = settings.token_issuer()?;
    let ttl = match ttl_minutes {
        Some(minutes) => ttl_from_minutes(minutes)
            .ok_or_else(|| anyhow!("--ttl-minutes must be a positive minute count in range"))?,
        None => settings.access_token_ttl()?,
    };

    let issued = issuer.issue(subject, ttl)?;
    println!("{}", issued.token);
    info!("Token for {} expires at {}", issued.subject, issued.expires_at);
    Ok(())
}

fn verify_token(settings: &SecuritySettings, token: &str) -> Result<()> {
    let issuer = settings.token_issuer()?;
    let claims = issuer.verify(token)?;

    println!("Subject: {}", claims.sub);
    if let Some(expires_at) = claims.expires_at() {
        println!("Expires: {}", expires_at);
    }
    println!("Token ID: {}", claims.jti);
    Ok(())
}

fn read_password() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Empty password");
    }
    Ok(password)
}

fn hash_password() -> Result<()> {
    let password = read_password()?;
    println!("{}", PasswordHasher::new().hash(&password)?);
    Ok(())
}

fn verify_password(digest: &str) -> Result<()> {
    let password = read_password()?;
    if PasswordHasher::new().verify(&password, digest) {
        println!("Password matches");
        Ok(())
    } else {
        bail!("Password does not match")
    }
}
