//! End-to-end tests for the skillforge binary.
//!
//! Each test writes a config and catalog into a temporary directory and
//! runs the built binary against them.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const ENCRYPTION_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

const CATALOG: &str = r#"
[[skills]]
name = "web_search"
description = "Search the web"

[skills.credentials.api_key]
type = "string"

[[providers]]
provider_name = "openai"
base_url = "https://api.openai.com/v1"
description = "OpenAI"
api_key = "sk-from-catalog-1234"

[[providers.models]]
name = "gpt-4o"
categories = ["llm"]
"#;

/// Helper to lay out a config, catalog and data directory.
fn test_env() -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let catalog_path = temp_dir.path().join("catalog.toml");
    std::fs::write(&catalog_path, CATALOG).unwrap();

    let config_path = temp_dir.path().join("skillforge.toml");
    let config = format!(
        "data_dir = {:?}\ncatalog_path = {:?}\n\n[security]\nencryption_key = {:?}\nsecret_key = \"cli-signing-secret\"\n\n[superuser]\nemail = \"admin@example.com\"\npassword = \"changethis\"\n",
        temp_dir.path().join("data"),
        catalog_path,
        ENCRYPTION_KEY,
    );
    std::fs::write(&config_path, config).unwrap();
    (config_path, temp_dir)
}

fn skillforge(config: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_skillforge"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("SKILLFORGE_ENCRYPTION_KEY")
        .env_remove("SKILLFORGE_SECRET_KEY")
        .env_remove("SKILLFORGE_FIRST_SUPERUSER")
        .env_remove("SKILLFORGE_FIRST_SUPERUSER_PASSWORD")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    if let Some(input) = stdin {
        child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_sync_then_status() {
    let (config, _temp) = test_env();

    let output = skillforge(&config, &["sync"], None);
    assert!(output.status.success(), "{:?}", output);
    let text = stdout(&output);
    assert!(text.contains("Created superuser admin@example.com"));
    assert!(text.contains("Skills created: web_search"));
    assert!(text.contains("Models created: openai/gpt-4o"));

    let output = skillforge(&config, &["sync"], None);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Already in sync"));

    let output = skillforge(&config, &["status"], None);
    assert!(output.status.success(), "{:?}", output);
    let text = stdout(&output);
    assert!(text.contains("web_search [managed]"));
    assert!(text.contains("Key: sk-f...1234"));
    assert!(text.contains("gpt-4o (categories: llm)"));
    assert!(!text.contains("sk-from-catalog-1234"));
}

#[test]
fn test_sync_json_output() {
    let (config, _temp) = test_env();

    let output = skillforge(&config, &["sync", "--format", "json"], None);
    assert!(output.status.success(), "{:?}", output);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["superuser"], "admin@example.com");
    assert_eq!(report["skills"]["created"][0], "web_search");
    assert_eq!(report["providers"]["providers_created"][0], "openai");
}

#[test]
fn test_token_round_trip() {
    let (config, _temp) = test_env();

    let output = skillforge(&config, &["issue-token", "admin@example.com"], None);
    assert!(output.status.success(), "{:?}", output);
    let token = stdout(&output).trim().to_string();

    let output = skillforge(&config, &["verify-token", &token], None);
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("Subject: admin@example.com"));

    let output = skillforge(&config, &["verify-token", "not-a-token"], None);
    assert!(!output.status.success());
}

#[test]
fn test_password_round_trip() {
    let (config, _temp) = test_env();

    let output = skillforge(&config, &["hash-password"], Some("hunter2\n"));
    assert!(output.status.success(), "{:?}", output);
    let digest = stdout(&output).trim().to_string();
    assert!(digest.starts_with("$argon2id$"));

    let output = skillforge(&config, &["verify-password", &digest], Some("hunter2\n"));
    assert!(output.status.success());

    let output = skillforge(&config, &["verify-password", &digest], Some("hunter3\n"));
    assert!(!output.status.success());
}

#[test]
fn test_generated_keys() {
    let (config, _temp) = test_env();

    let output = skillforge(&config, &["gen-api-key"], None);
    assert!(output.status.success());
    let text = stdout(&output);
    let mut lines = text.lines();
    let key = lines.next().unwrap();
    assert_eq!(key.len(), 43);
    assert_eq!(
        lines.next().unwrap(),
        format!("Redacted: {}...{}", &key[..4], &key[39..])
    );

    let output = skillforge(&config, &["gen-encryption-key"], None);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim().len(), 44);
}
