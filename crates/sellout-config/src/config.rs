// crates/sellout-config/src/config.rs
// ============================================================================
// Module: Sellout Configuration
// Description: Configuration loading and validation for the ingestion service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: sellout-core, sellout-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has serde defaults, so an empty file yields a loopback
//! server over an in-memory store. Invalid values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use sellout_core::IngestSettings;
use sellout_core::UnclassifiedPolicy;
use sellout_core::runtime::DEFAULT_CHUNK_SIZE;
use sellout_core::runtime::MAX_CHUNK_SIZE;
use sellout_core::runtime::gateway::DEFAULT_MAX_DECOMPRESSED_BYTES;
use sellout_store_sqlite::SqliteStoreMode;
use sellout_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "sellout-ingest.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SELLOUT_INGEST_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for `server.max_body_bytes`.
pub const MAX_BODY_BYTES_LIMIT: usize = 256 * 1024 * 1024;
/// Upper bound for `server.max_decompressed_bytes`.
pub const MAX_DECOMPRESSED_BYTES_LIMIT: usize = 1024 * 1024 * 1024;
/// Maximum length of the identity header name.
const MAX_HEADER_NAME_LENGTH: usize = 128;
/// Maximum length of the default actor identity.
const MAX_ACTOR_LENGTH: usize = 256;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Sellout ingestion service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelloutConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Ingestion store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Ingestion tuning.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl SelloutConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// explicit path, then [`CONFIG_ENV_VAR`], then `sellout-ingest.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.ingest.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes, before decompression.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Maximum size a gzip body may expand to.
    #[serde(default = "default_max_decompressed_bytes")]
    pub max_decompressed_bytes: usize,
    /// Header carrying the authenticated caller identity.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    /// Identity used when the header is absent (loopback only).
    #[serde(default)]
    pub default_actor: Option<String>,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            max_decompressed_bytes: default_max_decompressed_bytes(),
            identity_header: default_identity_header(),
            default_actor: None,
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if self.max_decompressed_bytes == 0
            || self.max_decompressed_bytes > MAX_DECOMPRESSED_BYTES_LIMIT
        {
            return Err(ConfigError::Invalid(format!(
                "server.max_decompressed_bytes must be between 1 and \
                 {MAX_DECOMPRESSED_BYTES_LIMIT}"
            )));
        }
        validate_header_name(&self.identity_header)?;
        if let Some(actor) = &self.default_actor {
            let trimmed = actor.trim();
            if trimmed.is_empty() || trimmed.len() > MAX_ACTOR_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "server.default_actor must be 1..={MAX_ACTOR_LENGTH} characters"
                )));
            }
            if !addr.ip().is_loopback() {
                return Err(ConfigError::Invalid(
                    "server.default_actor requires a loopback bind address".to_string(),
                ));
            }
        }
        self.audit.validate()
    }
}

/// Audit logging configuration for ingestion requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines). Stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Ingestion store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Ingestion store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_store_path(path)
            }
        }
    }
}

// ============================================================================
// SECTION: Ingest
// ============================================================================

/// Ingestion tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Distinct records reconciled per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Handling of payloads with no known block.
    #[serde(default)]
    pub unclassified: UnclassifiedPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            unclassified: UnclassifiedPolicy::default(),
        }
    }
}

impl IngestConfig {
    /// Returns the runtime settings for the ingestion service.
    #[must_use]
    pub const fn settings(&self) -> IngestSettings {
        IngestSettings {
            chunk_size: self.chunk_size,
            unclassified: self.unclassified,
        }
    }

    /// Validates ingestion tuning.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "ingest.chunk_size must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates the store path against length constraints.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates an HTTP header name: lowercase token characters only.
fn validate_header_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_HEADER_NAME_LENGTH
        && name.bytes().all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "server.identity_header must be a lowercase header name: {name}"
        )))
    }
}

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Default maximum request body size.
pub(crate) const fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

/// Default maximum decompressed size.
pub(crate) const fn default_max_decompressed_bytes() -> usize {
    DEFAULT_MAX_DECOMPRESSED_BYTES
}

/// Default identity header populated by the authenticating proxy.
fn default_identity_header() -> String {
    "x-authenticated-user".to_string()
}

/// Audit logging is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}

/// Default busy timeout for `SQLite` connections.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default chunk size.
const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

// ============================================================================
// SECTION: Tests
// ============================================================================
