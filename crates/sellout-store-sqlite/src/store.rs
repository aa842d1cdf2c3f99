// crates/sellout-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Ingest Store
// Description: Durable ingestion store backed by SQLite WAL.
// Purpose: Persist entity documents, extraction runs, and collaborator records.
// Dependencies: sellout-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the ingestion storage traits using `SQLite`. Entity
//! documents are stored as JSON blobs keyed by `(domain, natural_key)`. Each
//! bulk update or insert runs in one transaction, so a failed chunk leaves no
//! partial rows while earlier chunks stay committed. Extraction runs are
//! append-only. Database contents are untrusted: oversized or malformed
//! documents fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::params_from_iter;
use sellout_core::BlockName;
use sellout_core::CalculateDate;
use sellout_core::DataSource;
use sellout_core::DataSourceCatalog;
use sellout_core::DataSourceId;
use sellout_core::EntityRow;
use sellout_core::EntityStore;
use sellout_core::ExternalIdentity;
use sellout_core::ExtractionLog;
use sellout_core::ExtractionLogId;
use sellout_core::ExtractionLogStore;
use sellout_core::ExtractionRun;
use sellout_core::ExtractionRunId;
use sellout_core::ExtractionRunStore;
use sellout_core::ExtractionStatus;
use sellout_core::LogCounts;
use sellout_core::MAX_DOCUMENT_BYTES;
use sellout_core::NewExtractionRun;
use sellout_core::ProcessingDetails;
use sellout_core::StoreError;
use sellout_core::User;
use sellout_core::UserDirectory;
use sellout_core::UserId;
use sellout_core::core::time::now_rfc3339;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Keys bound per `IN (...)` lookup statement.
const LOOKUP_BATCH: usize = 500;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` ingest store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default tuning for `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data is corrupted.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or arguments.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Entity document exceeded the size limit.
    #[error("sqlite store document too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual document size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "document exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error.
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err function pointer.")]
fn db(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed ingestion store with WAL support.
#[derive(Clone)]
pub struct SqliteIngestStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteIngestStore {
    /// Opens an `SQLite`-backed ingestion store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Registers a user, or updates the display name and active flag of an
    /// existing external identity.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn upsert_user(
        &self,
        external_id: &ExternalIdentity,
        display_name: &str,
        active: bool,
    ) -> Result<User, SqliteStoreError> {
        if external_id.is_empty() {
            return Err(SqliteStoreError::Invalid("external id must not be empty".to_string()));
        }
        let guard = self.lock()?;
        let id: i64 = guard
            .query_row(
                "INSERT INTO users (external_id, display_name, active) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(external_id) DO UPDATE SET display_name = excluded.display_name, \
                 active = excluded.active RETURNING id",
                params![external_id.as_str(), display_name, active],
                |row| row.get(0),
            )
            .map_err(db)?;
        drop(guard);
        Ok(User {
            id: UserId::new(id),
            external_id: external_id.clone(),
            display_name: display_name.to_string(),
            active,
        })
    }

    /// Registers a data source.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn add_data_source(&self, name: &str, active: bool) -> Result<DataSource, SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .execute("INSERT INTO data_sources (name, active) VALUES (?1, ?2)", params![name, active])
            .map_err(db)?;
        let id = guard.last_insert_rowid();
        drop(guard);
        Ok(DataSource {
            id: DataSourceId::new(id),
            name: name.to_string(),
            active,
        })
    }

    /// Opens an in-progress extraction log the way the scheduler does.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn open_extraction_log(
        &self,
        data_source_id: DataSourceId,
    ) -> Result<ExtractionLog, SqliteStoreError> {
        let start_time = now_rfc3339();
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO extraction_logs (data_source_id, start_time, status) VALUES (?1, ?2, \
                 ?3)",
                params![data_source_id.get(), start_time, ExtractionStatus::InProgress.as_str()],
            )
            .map_err(db)?;
        let id = guard.last_insert_rowid();
        drop(guard);
        Ok(ExtractionLog {
            id: ExtractionLogId::new(id),
            data_source_id,
            start_time,
            end_time: None,
            status: ExtractionStatus::InProgress,
            extracted_count: 0,
            processed_count: 0,
            failed_count: 0,
            execution_detail: None,
        })
    }

    /// Loads an extraction log by id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is corrupt.
    pub fn extraction_log(
        &self,
        id: ExtractionLogId,
    ) -> Result<Option<ExtractionLog>, SqliteStoreError> {
        let guard = self.lock()?;
        let raw = guard
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM extraction_logs WHERE id = ?1"),
                params![id.get()],
                RawLog::from_row,
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        raw.map(RawLog::into_log).transpose()
    }

    // ------------------------------------------------------------------------
    // Entity documents
    // ------------------------------------------------------------------------

    /// Loads entity rows for the provided keys.
    fn load_rows(&self, block: BlockName, keys: &[String]) -> Result<Vec<EntityRow>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut rows = Vec::with_capacity(keys.len());
        for batch in keys.chunks(LOOKUP_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT natural_key, document FROM entities WHERE domain = ? AND natural_key IN \
                 ({placeholders})"
            );
            let mut statement = guard.prepare(&sql).map_err(db)?;
            let bindings = std::iter::once(block.as_str()).chain(batch.iter().map(String::as_str));
            let found = statement
                .query_map(params_from_iter(bindings), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(db)?;
            for entry in found {
                let (natural_key, bytes) = entry.map_err(db)?;
                rows.push(EntityRow::new(natural_key, decode_document(&bytes)?));
            }
        }
        drop(guard);
        Ok(rows)
    }

    /// Replaces documents of existing rows in one transaction.
    fn write_updates(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), SqliteStoreError> {
        let encoded = encode_rows(rows)?;
        let updated_at = now_rfc3339();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        {
            let mut statement = tx
                .prepare_cached(
                    "UPDATE entities SET document = ?1, updated_at = ?2 WHERE domain = ?3 AND \
                     natural_key = ?4",
                )
                .map_err(db)?;
            for (natural_key, document) in &encoded {
                let changed = statement
                    .execute(params![document, updated_at, block.as_str(), natural_key])
                    .map_err(db)?;
                if changed == 0 {
                    return Err(SqliteStoreError::Invalid(format!(
                        "{block} row '{natural_key}' does not exist"
                    )));
                }
            }
        }
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(())
    }

    /// Inserts new rows in one transaction. A key written by a concurrent run
    /// since the lookup is overwritten; the later write wins.
    fn write_inserts(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), SqliteStoreError> {
        let encoded = encode_rows(rows)?;
        let updated_at = now_rfc3339();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        {
            let mut statement = tx
                .prepare_cached(
                    "INSERT INTO entities (domain, natural_key, document, updated_at) VALUES (?1, \
                     ?2, ?3, ?4) ON CONFLICT(domain, natural_key) DO UPDATE SET document = \
                     excluded.document, updated_at = excluded.updated_at",
                )
                .map_err(db)?;
            for (natural_key, document) in &encoded {
                statement
                    .execute(params![block.as_str(), natural_key, document, updated_at])
                    .map_err(db)?;
            }
        }
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(())
    }

    /// Counts the rows of one domain.
    fn count_domain(&self, block: BlockName) -> Result<u64, SqliteStoreError> {
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE domain = ?1",
                params![block.as_str()],
                |row| row.get(0),
            )
            .map_err(db)?;
        drop(guard);
        to_count(count, "entity count")
    }

    // ------------------------------------------------------------------------
    // Extraction runs
    // ------------------------------------------------------------------------

    /// Appends an extraction run.
    fn append_run(&self, run: NewExtractionRun) -> Result<ExtractionRun, SqliteStoreError> {
        let details = run
            .processing_details
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let created_at = now_rfc3339();
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO extraction_runs (data_name, calculate_date, extraction_date, \
                 record_count, accepted_count, rejected_count, is_processed, processed_date, \
                 processing_details, processor_id, creator_id, data_source_id, \
                 extraction_log_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                 ?11, ?12, ?13, ?14)",
                params![
                    run.data_name,
                    run.calculate_date.map(|date| date.to_string()),
                    run.extraction_date,
                    to_sql_count(run.record_count)?,
                    to_sql_count(run.accepted_count)?,
                    to_sql_count(run.rejected_count)?,
                    run.is_processed,
                    run.processed_date,
                    details,
                    run.processor_id.get(),
                    run.creator_id.get(),
                    run.data_source_id.map(DataSourceId::get),
                    run.extraction_log_id.map(ExtractionLogId::get),
                    created_at,
                ],
            )
            .map_err(db)?;
        let id = guard.last_insert_rowid();
        drop(guard);
        Ok(ExtractionRun::from_new(ExtractionRunId::new(id), run, created_at))
    }

    /// Loads one run.
    fn load_run(&self, id: ExtractionRunId) -> Result<Option<ExtractionRun>, SqliteStoreError> {
        let guard = self.lock()?;
        let raw = guard
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM extraction_runs WHERE id = ?1"),
                params![id.get()],
                RawRun::from_row,
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        raw.map(RawRun::into_run).transpose()
    }

    /// Loads the newest runs.
    fn load_recent_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>, SqliteStoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("limit too large".to_string()))?;
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM extraction_runs ORDER BY id DESC LIMIT ?1"))
            .map_err(db)?;
        let raws = statement
            .query_map(params![limit], RawRun::from_row)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        drop(statement);
        drop(guard);
        raws.into_iter().map(RawRun::into_run).collect()
    }

    // ------------------------------------------------------------------------
    // Collaborators
    // ------------------------------------------------------------------------

    /// Loads a user by external identity.
    fn load_user(&self, external_id: &ExternalIdentity) -> Result<Option<User>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT id, display_name, active FROM users WHERE external_id = ?1",
                params![external_id.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, bool>(2)?)),
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        Ok(row.map(|(id, display_name, active)| User {
            id: UserId::new(id),
            external_id: external_id.clone(),
            display_name,
            active,
        }))
    }

    /// Loads a data source by id.
    fn load_data_source(&self, id: DataSourceId) -> Result<Option<DataSource>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT name, active FROM data_sources WHERE id = ?1",
                params![id.get()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        Ok(row.map(|(name, active)| DataSource {
            id,
            name,
            active,
        }))
    }

    /// Loads the newest in-progress log of a data source.
    fn load_active_log(
        &self,
        data_source_id: DataSourceId,
    ) -> Result<Option<ExtractionLog>, SqliteStoreError> {
        let guard = self.lock()?;
        let raw = guard
            .query_row(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM extraction_logs WHERE data_source_id = ?1 AND \
                     status = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![data_source_id.get(), ExtractionStatus::InProgress.as_str()],
                RawLog::from_row,
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        raw.map(RawLog::into_log).transpose()
    }

    /// Adds counts to a log.
    fn increment_log(&self, id: ExtractionLogId, counts: LogCounts) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE extraction_logs SET extracted_count = extracted_count + ?1, \
                 processed_count = processed_count + ?2, failed_count = failed_count + ?3 WHERE \
                 id = ?4",
                params![
                    to_sql_count(counts.extracted)?,
                    to_sql_count(counts.processed)?,
                    to_sql_count(counts.failed)?,
                    id.get()
                ],
            )
            .map_err(db)?;
        drop(guard);
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!("extraction log {id} not found")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Trait Implementations
// ============================================================================

impl EntityStore for SqliteIngestStore {
    fn find_by_keys(&self, block: BlockName, keys: &[String]) -> Result<Vec<EntityRow>, StoreError> {
        self.load_rows(block, keys).map_err(StoreError::from)
    }

    fn update_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.write_updates(block, rows).map_err(StoreError::from)
    }

    fn insert_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.write_inserts(block, rows).map_err(StoreError::from)
    }

    fn count_rows(&self, block: BlockName) -> Result<u64, StoreError> {
        self.count_domain(block).map_err(StoreError::from)
    }
}

impl ExtractionRunStore for SqliteIngestStore {
    fn insert_run(&self, run: NewExtractionRun) -> Result<ExtractionRun, StoreError> {
        self.append_run(run).map_err(StoreError::from)
    }

    fn get_run(&self, id: ExtractionRunId) -> Result<Option<ExtractionRun>, StoreError> {
        self.load_run(id).map_err(StoreError::from)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>, StoreError> {
        self.load_recent_runs(limit).map_err(StoreError::from)
    }
}

impl UserDirectory for SqliteIngestStore {
    fn find_user(&self, external_id: &ExternalIdentity) -> Result<Option<User>, StoreError> {
        self.load_user(external_id).map_err(StoreError::from)
    }
}

impl DataSourceCatalog for SqliteIngestStore {
    fn find_data_source(&self, id: DataSourceId) -> Result<Option<DataSource>, StoreError> {
        self.load_data_source(id).map_err(StoreError::from)
    }
}

impl ExtractionLogStore for SqliteIngestStore {
    fn find_active_log(
        &self,
        data_source_id: DataSourceId,
    ) -> Result<Option<ExtractionLog>, StoreError> {
        self.load_active_log(data_source_id).map_err(StoreError::from)
    }

    fn add_log_counts(&self, id: ExtractionLogId, counts: LogCounts) -> Result<(), StoreError> {
        self.increment_log(id, counts).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Columns selected for extraction runs, in [`RawRun`] order.
const RUN_COLUMNS: &str = "id, data_name, calculate_date, extraction_date, record_count, \
                           accepted_count, rejected_count, is_processed, processed_date, \
                           processing_details, processor_id, creator_id, data_source_id, \
                           extraction_log_id, created_at";

/// Columns selected for extraction logs, in [`RawLog`] order.
const LOG_COLUMNS: &str = "id, data_source_id, start_time, end_time, status, extracted_count, \
                           processed_count, failed_count, execution_detail";

/// Extraction run columns as stored.
struct RawRun {
    /// Row id.
    id: i64,
    /// Block name.
    data_name: String,
    /// Calculation date text.
    calculate_date: Option<String>,
    /// Producer timestamp.
    extraction_date: Option<String>,
    /// Record count.
    record_count: i64,
    /// Accepted count.
    accepted_count: i64,
    /// Rejected count.
    rejected_count: i64,
    /// Processed flag.
    is_processed: bool,
    /// Processing time.
    processed_date: Option<String>,
    /// Details JSON.
    processing_details: Option<Vec<u8>>,
    /// Processor id.
    processor_id: i64,
    /// Creator id.
    creator_id: i64,
    /// Data source id.
    data_source_id: Option<i64>,
    /// Extraction log id.
    extraction_log_id: Option<i64>,
    /// Creation time.
    created_at: String,
}

impl RawRun {
    /// Reads the columns listed in [`RUN_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            data_name: row.get(1)?,
            calculate_date: row.get(2)?,
            extraction_date: row.get(3)?,
            record_count: row.get(4)?,
            accepted_count: row.get(5)?,
            rejected_count: row.get(6)?,
            is_processed: row.get(7)?,
            processed_date: row.get(8)?,
            processing_details: row.get(9)?,
            processor_id: row.get(10)?,
            creator_id: row.get(11)?,
            data_source_id: row.get(12)?,
            extraction_log_id: row.get(13)?,
            created_at: row.get(14)?,
        })
    }

    /// Validates and converts the stored columns.
    fn into_run(self) -> Result<ExtractionRun, SqliteStoreError> {
        let calculate_date = self
            .calculate_date
            .as_deref()
            .map(CalculateDate::parse)
            .transpose()
            .map_err(|err| SqliteStoreError::Corrupt(format!("run {}: {err}", self.id)))?;
        let processing_details = self
            .processing_details
            .as_deref()
            .map(serde_json::from_slice::<ProcessingDetails>)
            .transpose()
            .map_err(|err| SqliteStoreError::Corrupt(format!("run {}: {err}", self.id)))?;
        Ok(ExtractionRun {
            id: ExtractionRunId::new(self.id),
            data_name: self.data_name,
            calculate_date,
            extraction_date: self.extraction_date,
            record_count: to_count(self.record_count, "record_count")?,
            accepted_count: to_count(self.accepted_count, "accepted_count")?,
            rejected_count: to_count(self.rejected_count, "rejected_count")?,
            is_processed: self.is_processed,
            processed_date: self.processed_date,
            processing_details,
            processor_id: UserId::new(self.processor_id),
            creator_id: UserId::new(self.creator_id),
            data_source_id: self.data_source_id.map(DataSourceId::new),
            extraction_log_id: self.extraction_log_id.map(ExtractionLogId::new),
            created_at: self.created_at,
        })
    }
}

/// Extraction log columns as stored.
struct RawLog {
    /// Row id.
    id: i64,
    /// Data source id.
    data_source_id: i64,
    /// Start time.
    start_time: String,
    /// End time.
    end_time: Option<String>,
    /// Status label.
    status: String,
    /// Extracted counter.
    extracted_count: i64,
    /// Processed counter.
    processed_count: i64,
    /// Failed counter.
    failed_count: i64,
    /// Free-form detail.
    execution_detail: Option<String>,
}

impl RawLog {
    /// Reads the columns listed in [`LOG_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            data_source_id: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            status: row.get(4)?,
            extracted_count: row.get(5)?,
            processed_count: row.get(6)?,
            failed_count: row.get(7)?,
            execution_detail: row.get(8)?,
        })
    }

    /// Validates and converts the stored columns.
    fn into_log(self) -> Result<ExtractionLog, SqliteStoreError> {
        let status = ExtractionStatus::parse(&self.status).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("log {}: unknown status {}", self.id, self.status))
        })?;
        Ok(ExtractionLog {
            id: ExtractionLogId::new(self.id),
            data_source_id: DataSourceId::new(self.data_source_id),
            start_time: self.start_time,
            end_time: self.end_time,
            status,
            extracted_count: to_count(self.extracted_count, "extracted_count")?,
            processed_count: to_count(self.processed_count, "processed_count")?,
            failed_count: to_count(self.failed_count, "failed_count")?,
            execution_detail: self.execution_detail,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes entity documents, enforcing the size limit.
fn encode_rows(rows: &[EntityRow]) -> Result<Vec<(&str, Vec<u8>)>, SqliteStoreError> {
    rows.iter()
        .map(|row| {
            let bytes = serde_json::to_vec(&row.document)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            if bytes.len() > MAX_DOCUMENT_BYTES {
                return Err(SqliteStoreError::TooLarge {
                    max_bytes: MAX_DOCUMENT_BYTES,
                    actual_bytes: bytes.len(),
                });
            }
            Ok((row.natural_key.as_str(), bytes))
        })
        .collect()
}

/// Parses a stored entity document.
fn decode_document(bytes: &[u8]) -> Result<Map<String, Value>, SqliteStoreError> {
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_DOCUMENT_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Converts a stored counter to `u64`.
fn to_count(value: i64, column: &str) -> Result<u64, SqliteStoreError> {
    u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt(format!("negative {column}")))
}

/// Converts a counter to its stored form.
fn to_sql_count(value: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid("counter too large".to_string()))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS entities (
                    domain TEXT NOT NULL,
                    natural_key TEXT NOT NULL,
                    document BLOB NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (domain, natural_key)
                );
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    active INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS data_sources (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    active INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS extraction_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    data_source_id INTEGER NOT NULL REFERENCES data_sources(id),
                    start_time TEXT NOT NULL,
                    end_time TEXT,
                    status TEXT NOT NULL,
                    extracted_count INTEGER NOT NULL DEFAULT 0,
                    processed_count INTEGER NOT NULL DEFAULT 0,
                    failed_count INTEGER NOT NULL DEFAULT 0,
                    execution_detail TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_extraction_logs_source_status
                    ON extraction_logs (data_source_id, status);
                CREATE TABLE IF NOT EXISTS extraction_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    data_name TEXT NOT NULL,
                    calculate_date TEXT,
                    extraction_date TEXT,
                    record_count INTEGER NOT NULL,
                    accepted_count INTEGER NOT NULL,
                    rejected_count INTEGER NOT NULL,
                    is_processed INTEGER NOT NULL,
                    processed_date TEXT,
                    processing_details BLOB,
                    processor_id INTEGER NOT NULL REFERENCES users(id),
                    creator_id INTEGER NOT NULL REFERENCES users(id),
                    data_source_id INTEGER REFERENCES data_sources(id),
                    extraction_log_id INTEGER REFERENCES extraction_logs(id),
                    created_at TEXT NOT NULL
                );",
            )
            .map_err(db)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db)?;
    Ok(())
}
