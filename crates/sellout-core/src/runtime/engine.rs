// crates/sellout-core/src/runtime/engine.rs
// ============================================================================
// Module: Batch Upsert Engine
// Description: Chunked deduplicate-then-upsert routine shared by every domain.
// Purpose: Reconcile loosely-typed records against persisted rows by natural key.
// Dependencies: crate::interfaces, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`reconcile`] deduplicates the input by natural key (last occurrence wins,
//! first position kept), splits the distinct records into chunks, and for
//! every chunk performs one batch lookup, one bulk update, and one bulk
//! insert. Chunks run strictly in sequence.
//!
//! Record-level failures are captured as [`RowError`] and never abort the
//! run. A store failure aborts the remaining chunks; chunks already written
//! stay written and the error reports how many completed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of distinct records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = 10_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Record-level coercion or validation failure.
///
/// Messages never carry row positions or values so identical failures group
/// together in the run record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// Record is not a JSON object.
    #[error("record must be a JSON object")]
    NotAnObject,
    /// Required field is absent, null, or blank.
    #[error("field '{0}' is required")]
    MissingField(&'static str),
    /// Field cannot be read as text.
    #[error("field '{0}' must be a string or number")]
    NotText(&'static str),
    /// Field cannot be read as a number.
    #[error("field '{0}' must be numeric")]
    NotNumeric(&'static str),
    /// Field is not a calendar date.
    #[error("field '{0}' must be a YYYY-MM-DD date")]
    InvalidDate(&'static str),
    /// Stored document would exceed the size limit.
    #[error("document exceeds {max_bytes} bytes")]
    DocumentTooLarge {
        /// Size limit in bytes.
        max_bytes: usize,
    },
}

/// Fatal reconciliation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// A chunk could not be read or written.
    #[error("persistence failed after {chunks_completed} of {chunks_total} chunks: {source}")]
    Persistence {
        /// Chunks fully written before the failure.
        chunks_completed: u64,
        /// Chunks planned for the run.
        chunks_total: u64,
        /// Distinct records written by the completed chunks.
        accepted: u64,
        /// Underlying store error.
        source: StoreError,
    },
}

// ============================================================================
// SECTION: Reconciler Contract
// ============================================================================

/// Domain adapter driven by [`reconcile`].
pub trait Reconciler {
    /// Persisted entity shape.
    type Entity;

    /// Derives the natural key of a raw record.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the key fields are missing or malformed.
    fn natural_key(&self, record: &Value) -> Result<String, RowError>;

    /// Loads the persisted entities whose key is in `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn lookup_existing(&self, keys: &[String]) -> Result<HashMap<String, Self::Entity>, StoreError>;

    /// Merges an incoming record onto an existing entity.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the record fails coercion.
    fn merge(&self, existing: Self::Entity, record: Value) -> Result<Self::Entity, RowError>;

    /// Builds a new entity from a record.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the record fails coercion.
    fn build(&self, key: String, record: Value) -> Result<Self::Entity, RowError>;

    /// Writes updated entities in one bulk operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn apply_updates(&self, entities: &[Self::Entity]) -> Result<(), StoreError>;

    /// Writes new entities in one bulk operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn apply_inserts(&self, entities: &[Self::Entity]) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of a completed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// Distinct keys written.
    pub accepted: u64,
    /// Row errors in input order.
    pub errors: Vec<RowError>,
    /// Records replaced by a later record with the same key.
    pub duplicates_dropped: u64,
    /// Chunks fully written.
    pub chunks_completed: u64,
    /// Chunks planned.
    pub chunks_total: u64,
    /// Entities updated.
    pub updated: u64,
    /// Entities inserted.
    pub inserted: u64,
}

// ============================================================================
// SECTION: Reconcile
// ============================================================================

/// Reconciles `records` through `reconciler` in chunks of `chunk_size`
/// distinct records. A zero chunk size is treated as one.
///
/// # Errors
///
/// Returns [`ReconcileError::Persistence`] when a lookup or bulk write fails.
pub fn reconcile<R: Reconciler>(
    reconciler: &R,
    records: Vec<Value>,
    chunk_size: usize,
) -> Result<ReconcileOutcome, ReconcileError> {
    let chunk_size = chunk_size.max(1);
    let mut outcome = ReconcileOutcome::default();
    let distinct = deduplicate(reconciler, records, &mut outcome);
    let chunks: Vec<&[(String, Value)]> = distinct.chunks(chunk_size).collect();
    outcome.chunks_total = count(chunks.len());

    for chunk in chunks {
        let keys: Vec<String> = chunk.iter().map(|(key, _)| key.clone()).collect();
        let mut existing =
            reconciler.lookup_existing(&keys).map_err(|source| persistence(&outcome, source))?;

        let mut updates = Vec::new();
        let mut inserts = Vec::new();
        for (key, record) in chunk {
            let built = match existing.remove(key) {
                Some(entity) => reconciler.merge(entity, record.clone()).map(|e| (true, e)),
                None => reconciler.build(key.clone(), record.clone()).map(|e| (false, e)),
            };
            match built {
                Ok((true, entity)) => updates.push(entity),
                Ok((false, entity)) => inserts.push(entity),
                Err(err) => outcome.errors.push(err),
            }
        }

        if !updates.is_empty() {
            reconciler.apply_updates(&updates).map_err(|source| persistence(&outcome, source))?;
        }
        if !inserts.is_empty() {
            reconciler.apply_inserts(&inserts).map_err(|source| persistence(&outcome, source))?;
        }
        outcome.updated += count(updates.len());
        outcome.inserted += count(inserts.len());
        outcome.accepted += count(updates.len() + inserts.len());
        outcome.chunks_completed += 1;
    }
    Ok(outcome)
}

/// Builds the ordered distinct record list. A later record replaces the value
/// of an earlier one with the same key but keeps the earlier position.
fn deduplicate<R: Reconciler>(
    reconciler: &R,
    records: Vec<Value>,
    outcome: &mut ReconcileOutcome,
) -> Vec<(String, Value)> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut distinct: Vec<(String, Value)> = Vec::with_capacity(records.len());
    for record in records {
        let key = match reconciler.natural_key(&record) {
            Ok(key) => key,
            Err(err) => {
                outcome.errors.push(err);
                continue;
            }
        };
        if let Some(&position) = positions.get(&key) {
            distinct[position].1 = record;
            outcome.duplicates_dropped += 1;
        } else {
            positions.insert(key.clone(), distinct.len());
            distinct.push((key, record));
        }
    }
    distinct
}

/// Wraps a store error with the progress made so far.
fn persistence(outcome: &ReconcileOutcome, source: StoreError) -> ReconcileError {
    ReconcileError::Persistence {
        chunks_completed: outcome.chunks_completed,
        chunks_total: outcome.chunks_total,
        accepted: outcome.accepted,
        source,
    }
}

/// Converts a collection length to a counter.
pub(crate) fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use std::cell::Cell;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::collections::HashMap;

    use serde_json::Value;
    use serde_json::json;

    use super::ReconcileError;
    use super::Reconciler;
    use super::RowError;
    use super::reconcile;
    use crate::interfaces::StoreError;

    /// Key/value reconciler over an in-memory map.
    #[derive(Default)]
    struct MapReconciler {
        rows: RefCell<BTreeMap<String, i64>>,
        bulk_writes: Cell<usize>,
        fail_on_write: Option<usize>,
    }

    impl Reconciler for MapReconciler {
        type Entity = (String, i64);

        fn natural_key(&self, record: &Value) -> Result<String, RowError> {
            record
                .get("k")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(RowError::MissingField("k"))
        }

        fn lookup_existing(&self, keys: &[String]) -> Result<HashMap<String, Self::Entity>, StoreError> {
            let rows = self.rows.borrow();
            Ok(keys
                .iter()
                .filter_map(|key| rows.get(key).map(|v| (key.clone(), (key.clone(), *v))))
                .collect())
        }

        fn merge(&self, existing: Self::Entity, record: Value) -> Result<Self::Entity, RowError> {
            let value = record.get("v").and_then(Value::as_i64).ok_or(RowError::NotNumeric("v"))?;
            Ok((existing.0, value))
        }

        fn build(&self, key: String, record: Value) -> Result<Self::Entity, RowError> {
            let value = record.get("v").and_then(Value::as_i64).ok_or(RowError::NotNumeric("v"))?;
            Ok((key, value))
        }

        fn apply_updates(&self, entities: &[Self::Entity]) -> Result<(), StoreError> {
            self.write(entities)
        }

        fn apply_inserts(&self, entities: &[Self::Entity]) -> Result<(), StoreError> {
            self.write(entities)
        }
    }

    impl MapReconciler {
        fn write(&self, entities: &[(String, i64)]) -> Result<(), StoreError> {
            let writes = self.bulk_writes.get() + 1;
            self.bulk_writes.set(writes);
            if self.fail_on_write == Some(writes) {
                return Err(StoreError::Store("disk full".to_string()));
            }
            let mut rows = self.rows.borrow_mut();
            for (key, value) in entities {
                rows.insert(key.clone(), *value);
            }
            Ok(())
        }
    }

    fn record(key: &str, value: i64) -> Value {
        json!({"k": key, "v": value})
    }

    #[test]
    fn last_record_wins_and_duplicates_are_counted() {
        let reconciler = MapReconciler::default();
        let records = vec![record("a", 1), record("b", 2), record("a", 3)];
        let outcome = reconcile(&reconciler, records, 10).unwrap();
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.duplicates_dropped, 1);
        assert_eq!(reconciler.rows.borrow().get("a"), Some(&3));
    }

    #[test]
    fn row_errors_do_not_abort_the_chunk() {
        let reconciler = MapReconciler::default();
        let records = vec![
            record("a", 1),
            json!({"v": 4}),
            json!({"k": "c", "v": "x"}),
            record("d", 5),
        ];
        let outcome = reconcile(&reconciler, records, 10).unwrap();
        assert_eq!(outcome.accepted, 2);
        assert_eq!(
            outcome.errors,
            vec![RowError::MissingField("k"), RowError::NotNumeric("v")]
        );
        let total = outcome.accepted + outcome.duplicates_dropped + outcome.errors.len() as u64;
        assert_eq!(total, 4);
    }

    #[test]
    fn existing_rows_are_updated_not_inserted() {
        let reconciler = MapReconciler::default();
        reconciler.rows.borrow_mut().insert("a".to_string(), 0);
        let outcome = reconcile(&reconciler, vec![record("a", 9), record("b", 1)], 10).unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn chunk_counts_follow_distinct_records() {
        let reconciler = MapReconciler::default();
        let records: Vec<Value> = (0..2500).map(|i| record(&format!("k{i}"), i)).collect();
        let outcome = reconcile(&reconciler, records, 1000).unwrap();
        assert_eq!(outcome.chunks_total, 3);
        assert_eq!(outcome.chunks_completed, 3);
        assert_eq!(outcome.accepted, 2500);
    }

    #[test]
    fn zero_chunk_size_is_treated_as_one() {
        let reconciler = MapReconciler::default();
        let outcome = reconcile(&reconciler, vec![record("a", 1), record("b", 2)], 0).unwrap();
        assert_eq!(outcome.chunks_total, 2);
    }

    #[test]
    fn persistence_failure_keeps_committed_chunks() {
        let reconciler = MapReconciler {
            fail_on_write: Some(2),
            ..MapReconciler::default()
        };
        let records = vec![record("a", 1), record("b", 2), record("c", 3)];
        let err = reconcile(&reconciler, records, 1).unwrap_err();
        let ReconcileError::Persistence {
            chunks_completed,
            chunks_total,
            accepted,
            ..
        } = err;
        assert_eq!(chunks_completed, 1);
        assert_eq!(chunks_total, 3);
        assert_eq!(accepted, 1);
        assert_eq!(reconciler.rows.borrow().len(), 1);
    }
}
