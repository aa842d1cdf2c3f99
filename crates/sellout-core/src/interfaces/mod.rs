// crates/sellout-core/src/interfaces/mod.rs
// ============================================================================
// Module: Sellout Interfaces
// Description: Storage and collaborator contracts used by the ingestion runtime.
// Purpose: Keep the runtime backend-agnostic; stores are injected, never global.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The runtime talks to persistence exclusively through these traits. A
//! single store handle implementing [`IngestStore`] is built at process start
//! and shared by every handler and the run recorder through
//! [`SharedIngestStore`]. Implementations must surface failures as
//! [`StoreError`] and never panic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::BlockName;
use crate::core::DataSource;
use crate::core::DataSourceId;
use crate::core::EntityRow;
use crate::core::ExternalIdentity;
use crate::core::ExtractionLog;
use crate::core::ExtractionLogId;
use crate::core::ExtractionRun;
use crate::core::ExtractionRunId;
use crate::core::NewExtractionRun;
use crate::core::User;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or arguments are invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Store engine reported an error.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Entity Store
// ============================================================================

/// Persistence for reconciled business entities, partitioned by block.
pub trait EntityStore {
    /// Returns the rows whose natural key is in `keys`. Missing keys are
    /// simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_by_keys(&self, block: BlockName, keys: &[String]) -> Result<Vec<EntityRow>, StoreError>;

    /// Replaces the documents of existing rows in one bulk statement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; no row of the batch is
    /// written in that case.
    fn update_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError>;

    /// Inserts new rows in one bulk statement. A key that a concurrent run
    /// created after the lookup is overwritten: the later write wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; no row of the batch is
    /// written in that case.
    fn insert_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError>;

    /// Counts the rows stored for a block.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    fn count_rows(&self, block: BlockName) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Extraction Runs
// ============================================================================

/// Append-only persistence for extraction runs.
pub trait ExtractionRunStore {
    /// Persists a run and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_run(&self, run: NewExtractionRun) -> Result<ExtractionRun, StoreError>;

    /// Loads a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_run(&self, id: ExtractionRunId) -> Result<Option<ExtractionRun>, StoreError>;

    /// Lists the most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>, StoreError>;
}

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// User lookup by identity-provider subject.
pub trait UserDirectory {
    /// Resolves a user from an external identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_user(&self, external_id: &ExternalIdentity) -> Result<Option<User>, StoreError>;
}

/// Data source lookup.
pub trait DataSourceCatalog {
    /// Loads a data source by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_data_source(&self, id: DataSourceId) -> Result<Option<DataSource>, StoreError>;
}

/// Counts added to a scheduler log after an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogCounts {
    /// Records received.
    pub extracted: u64,
    /// Records accepted.
    pub processed: u64,
    /// Records rejected.
    pub failed: u64,
}

/// Read/update access to scheduler-owned extraction logs.
pub trait ExtractionLogStore {
    /// Returns the most recent in-progress log for a data source.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_active_log(&self, data_source_id: DataSourceId)
    -> Result<Option<ExtractionLog>, StoreError>;

    /// Adds run counts to a log's counters. Status and times are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails or the log is missing.
    fn add_log_counts(&self, id: ExtractionLogId, counts: LogCounts) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Combined Store
// ============================================================================

/// Everything the ingestion runtime needs from persistence.
pub trait IngestStore:
    EntityStore + ExtractionRunStore + UserDirectory + DataSourceCatalog + ExtractionLogStore
{
}

impl<T> IngestStore for T where
    T: EntityStore + ExtractionRunStore + UserDirectory + DataSourceCatalog + ExtractionLogStore
{
}

/// Shared, clonable handle to an ingestion store.
#[derive(Clone)]
pub struct SharedIngestStore {
    /// Inner store implementation.
    inner: Arc<dyn IngestStore + Send + Sync>,
}

impl SharedIngestStore {
    /// Wraps a store in a shared handle.
    #[must_use]
    pub fn from_store(store: impl IngestStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn IngestStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl EntityStore for SharedIngestStore {
    fn find_by_keys(&self, block: BlockName, keys: &[String]) -> Result<Vec<EntityRow>, StoreError> {
        self.inner.find_by_keys(block, keys)
    }

    fn update_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        self.inner.update_rows(block, rows)
    }

    fn insert_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        self.inner.insert_rows(block, rows)
    }

    fn count_rows(&self, block: BlockName) -> Result<u64, StoreError> {
        self.inner.count_rows(block)
    }
}

impl ExtractionRunStore for SharedIngestStore {
    fn insert_run(&self, run: NewExtractionRun) -> Result<ExtractionRun, StoreError> {
        self.inner.insert_run(run)
    }

    fn get_run(&self, id: ExtractionRunId) -> Result<Option<ExtractionRun>, StoreError> {
        self.inner.get_run(id)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>, StoreError> {
        self.inner.list_runs(limit)
    }
}

impl UserDirectory for SharedIngestStore {
    fn find_user(&self, external_id: &ExternalIdentity) -> Result<Option<User>, StoreError> {
        self.inner.find_user(external_id)
    }
}

impl DataSourceCatalog for SharedIngestStore {
    fn find_data_source(&self, id: DataSourceId) -> Result<Option<DataSource>, StoreError> {
        self.inner.find_data_source(id)
    }
}

impl ExtractionLogStore for SharedIngestStore {
    fn find_active_log(
        &self,
        data_source_id: DataSourceId,
    ) -> Result<Option<ExtractionLog>, StoreError> {
        self.inner.find_active_log(data_source_id)
    }

    fn add_log_counts(&self, id: ExtractionLogId, counts: LogCounts) -> Result<(), StoreError> {
        self.inner.add_log_counts(id, counts)
    }
}
