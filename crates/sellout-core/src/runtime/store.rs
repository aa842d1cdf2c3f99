// crates/sellout-core/src/runtime/store.rs
// ============================================================================
// Module: Sellout In-Memory Store
// Description: In-memory ingestion store for tests and local runs.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of every storage
//! trait the ingestion runtime needs. State is lost when the process exits.
//! Seeding helpers stand in for the user, data source, and scheduler
//! collaborators.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Map;
use serde_json::Value;

use crate::core::BlockName;
use crate::core::DataSource;
use crate::core::DataSourceId;
use crate::core::EntityRow;
use crate::core::ExternalIdentity;
use crate::core::ExtractionLog;
use crate::core::ExtractionLogId;
use crate::core::ExtractionRun;
use crate::core::ExtractionRunId;
use crate::core::ExtractionStatus;
use crate::core::NewExtractionRun;
use crate::core::User;
use crate::core::UserId;
use crate::core::time::now_rfc3339;
use crate::interfaces::DataSourceCatalog;
use crate::interfaces::EntityStore;
use crate::interfaces::ExtractionLogStore;
use crate::interfaces::ExtractionRunStore;
use crate::interfaces::LogCounts;
use crate::interfaces::StoreError;
use crate::interfaces::UserDirectory;

// ============================================================================
// SECTION: State
// ============================================================================

/// Tables held by the in-memory store.
#[derive(Debug, Default)]
struct MemoryState {
    /// Entity documents keyed by block then natural key.
    entities: BTreeMap<BlockName, BTreeMap<String, Map<String, Value>>>,
    /// Extraction runs keyed by id.
    runs: BTreeMap<i64, ExtractionRun>,
    /// Users keyed by id.
    users: BTreeMap<i64, User>,
    /// Data sources keyed by id.
    data_sources: BTreeMap<i64, DataSource>,
    /// Extraction logs keyed by id.
    logs: BTreeMap<i64, ExtractionLog>,
    /// Last assigned id across all tables.
    last_id: i64,
}

impl MemoryState {
    /// Allocates the next identifier.
    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory ingestion store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIngestStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryIngestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("ingest store mutex poisoned".to_string()))
    }

    /// Registers a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn add_user(
        &self,
        external_id: impl Into<ExternalIdentity>,
        display_name: &str,
        active: bool,
    ) -> Result<User, StoreError> {
        let mut state = self.lock()?;
        let user = User {
            id: UserId::new(state.next_id()),
            external_id: external_id.into(),
            display_name: display_name.to_string(),
            active,
        };
        state.users.insert(user.id.get(), user.clone());
        Ok(user)
    }

    /// Registers a data source.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn add_data_source(&self, name: &str, active: bool) -> Result<DataSource, StoreError> {
        let mut state = self.lock()?;
        let source = DataSource {
            id: DataSourceId::new(state.next_id()),
            name: name.to_string(),
            active,
        };
        state.data_sources.insert(source.id.get(), source.clone());
        Ok(source)
    }

    /// Opens an in-progress extraction log the way the scheduler does.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn open_extraction_log(&self, data_source_id: DataSourceId) -> Result<ExtractionLog, StoreError> {
        let mut state = self.lock()?;
        let log = ExtractionLog {
            id: ExtractionLogId::new(state.next_id()),
            data_source_id,
            start_time: now_rfc3339(),
            end_time: None,
            status: ExtractionStatus::InProgress,
            extracted_count: 0,
            processed_count: 0,
            failed_count: 0,
            execution_detail: None,
        };
        state.logs.insert(log.id.get(), log.clone());
        Ok(log)
    }

    /// Loads an extraction log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn extraction_log(&self, id: ExtractionLogId) -> Result<Option<ExtractionLog>, StoreError> {
        Ok(self.lock()?.logs.get(&id.get()).cloned())
    }

    /// Loads one stored entity document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn entity(&self, block: BlockName, key: &str) -> Result<Option<Map<String, Value>>, StoreError> {
        Ok(self.lock()?.entities.get(&block).and_then(|rows| rows.get(key)).cloned())
    }

    /// Returns every stored document of a block ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn entities(&self, block: BlockName) -> Result<Vec<EntityRow>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .entities
            .get(&block)
            .map(|rows| {
                rows.iter().map(|(key, doc)| EntityRow::new(key.clone(), doc.clone())).collect()
            })
            .unwrap_or_default())
    }
}

impl EntityStore for InMemoryIngestStore {
    fn find_by_keys(&self, block: BlockName, keys: &[String]) -> Result<Vec<EntityRow>, StoreError> {
        let state = self.lock()?;
        let Some(rows) = state.entities.get(&block) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|key| rows.get(key).map(|doc| EntityRow::new(key.clone(), doc.clone())))
            .collect())
    }

    fn update_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let table = state.entities.entry(block).or_default();
        if let Some(missing) = rows.iter().find(|row| !table.contains_key(&row.natural_key)) {
            return Err(StoreError::Invalid(format!(
                "{block} row '{}' does not exist",
                missing.natural_key
            )));
        }
        for row in rows {
            table.insert(row.natural_key.clone(), row.document.clone());
        }
        Ok(())
    }

    fn insert_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let table = state.entities.entry(block).or_default();
        for row in rows {
            table.insert(row.natural_key.clone(), row.document.clone());
        }
        Ok(())
    }

    fn count_rows(&self, block: BlockName) -> Result<u64, StoreError> {
        let state = self.lock()?;
        let len = state.entities.get(&block).map_or(0, BTreeMap::len);
        Ok(u64::try_from(len).unwrap_or(u64::MAX))
    }
}

impl ExtractionRunStore for InMemoryIngestStore {
    fn insert_run(&self, run: NewExtractionRun) -> Result<ExtractionRun, StoreError> {
        let mut state = self.lock()?;
        let id = ExtractionRunId::new(state.next_id());
        let stored = ExtractionRun::from_new(id, run, now_rfc3339());
        state.runs.insert(id.get(), stored.clone());
        Ok(stored)
    }

    fn get_run(&self, id: ExtractionRunId) -> Result<Option<ExtractionRun>, StoreError> {
        Ok(self.lock()?.runs.get(&id.get()).cloned())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>, StoreError> {
        Ok(self.lock()?.runs.values().rev().take(limit).cloned().collect())
    }
}

impl UserDirectory for InMemoryIngestStore {
    fn find_user(&self, external_id: &ExternalIdentity) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.values().find(|user| &user.external_id == external_id).cloned())
    }
}

impl DataSourceCatalog for InMemoryIngestStore {
    fn find_data_source(&self, id: DataSourceId) -> Result<Option<DataSource>, StoreError> {
        Ok(self.lock()?.data_sources.get(&id.get()).cloned())
    }
}

impl ExtractionLogStore for InMemoryIngestStore {
    fn find_active_log(
        &self,
        data_source_id: DataSourceId,
    ) -> Result<Option<ExtractionLog>, StoreError> {
        Ok(self
            .lock()?
            .logs
            .values()
            .rev()
            .find(|log| {
                log.data_source_id == data_source_id && log.status == ExtractionStatus::InProgress
            })
            .cloned())
    }

    fn add_log_counts(&self, id: ExtractionLogId, counts: LogCounts) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let log = state
            .logs
            .get_mut(&id.get())
            .ok_or_else(|| StoreError::Invalid(format!("extraction log {id} not found")))?;
        log.extracted_count = log.extracted_count.saturating_add(counts.extracted);
        log.processed_count = log.processed_count.saturating_add(counts.processed);
        log.failed_count = log.failed_count.saturating_add(counts.failed);
        Ok(())
    }
}
