//! Default and load behavior tests for sellout-config.
// crates/sellout-config/tests/config_defaults.rs
// =============================================================================
// Module: Config Default Tests
// Description: Validate defaults, full-file parsing, and loading from disk.
// Purpose: Ensure an empty file yields a safe loopback server.
// =============================================================================

use std::fs;

use sellout_config::ConfigError;
use sellout_config::SelloutConfig;
use sellout_config::StoreType;
use sellout_core::UnclassifiedPolicy;
use sellout_store_sqlite::SqliteStoreMode;
use sellout_store_sqlite::SqliteSyncMode;
use tempfile::TempDir;

mod common;

use common::TestResult;

const FULL_CONFIG: &str = r#"
[server]
bind = "127.0.0.1:9090"
max_body_bytes = 1048576
max_decompressed_bytes = 8388608
identity_header = "x-saml-user"
default_actor = "svc-extractor"

[server.audit]
enabled = true
path = "ingest-audit.jsonl"

[store]
type = "sqlite"
path = "data/sellout.db"
busy_timeout_ms = 2500
journal_mode = "delete"
sync_mode = "normal"

[ingest]
chunk_size = 250
unclassified = "record"
"#;

#[test]
fn empty_config_uses_safe_defaults() -> TestResult {
    let config = SelloutConfig::from_toml("").map_err(|err| err.to_string())?;
    if config.server.bind != "127.0.0.1:8080" {
        return Err(format!("unexpected bind {}", config.server.bind));
    }
    if config.server.identity_header != "x-authenticated-user" {
        return Err("unexpected identity header".to_string());
    }
    if config.server.default_actor.is_some() {
        return Err("default actor must be unset".to_string());
    }
    if !config.server.audit.enabled {
        return Err("audit must default to enabled".to_string());
    }
    if config.store.store_type != StoreType::Memory {
        return Err("store must default to memory".to_string());
    }
    if config.ingest.chunk_size != 1000 || config.ingest.unclassified != UnclassifiedPolicy::Reject
    {
        return Err("unexpected ingest defaults".to_string());
    }
    Ok(())
}

#[test]
fn full_config_parses_every_section() -> TestResult {
    let config = SelloutConfig::from_toml(FULL_CONFIG).map_err(|err| err.to_string())?;
    let addr = config.server.bind_addr().map_err(|err| err.to_string())?;
    if addr.port() != 9090 {
        return Err("bind port not parsed".to_string());
    }
    if config.server.max_decompressed_bytes != 8_388_608 {
        return Err("max_decompressed_bytes not parsed".to_string());
    }
    if config.server.default_actor.as_deref() != Some("svc-extractor") {
        return Err("default actor not parsed".to_string());
    }
    if config.store.store_type != StoreType::Sqlite
        || config.store.journal_mode != SqliteStoreMode::Delete
        || config.store.sync_mode != SqliteSyncMode::Normal
        || config.store.busy_timeout_ms != 2_500
    {
        return Err("store section not parsed".to_string());
    }
    let settings = config.ingest.settings();
    if settings.chunk_size != 250 || settings.unclassified != UnclassifiedPolicy::Record {
        return Err("ingest settings not parsed".to_string());
    }
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    match SelloutConfig::from_toml("[ingest]\nchunk = 5\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {}", describe(&other))),
    }
}

#[test]
fn unknown_unclassified_policy_is_rejected() -> TestResult {
    match SelloutConfig::from_toml("[ingest]\nunclassified = \"ignore\"\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {}", describe(&other))),
    }
}

#[test]
fn load_reads_file_and_records_modification_time() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let path = temp.path().join("sellout-ingest.toml");
    fs::write(&path, FULL_CONFIG).map_err(|err| err.to_string())?;
    let config = SelloutConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.source_modified_at.is_none() {
        return Err("modification time not recorded".to_string());
    }
    Ok(())
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    match SelloutConfig::load(Some(&temp.path().join("absent.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {}", describe(&other))),
    }
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let path = temp.path().join("big.toml");
    let padding = format!("# {}\n", "x".repeat(1024 * 1024));
    fs::write(&path, padding).map_err(|err| err.to_string())?;
    common::assert_invalid(SelloutConfig::load(Some(&path)).map(|_| ()), "size limit")
}

fn describe(result: &Result<SelloutConfig, ConfigError>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(err) => err.to_string(),
    }
}
