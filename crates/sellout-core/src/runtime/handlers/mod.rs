// crates/sellout-core/src/runtime/handlers/mod.rs
// ============================================================================
// Module: Reconciliation Handlers
// Description: Per-domain record decoding and dispatch into the upsert engine.
// Purpose: Normalize producer records and persist them as entity documents.
// Dependencies: crate::{core, interfaces, runtime::engine}, serde_json
// ============================================================================

//! ## Overview
//! Every block maps to one [`DomainRecord`] type. The record type derives the
//! natural key from a raw object, decodes the object into its typed form
//! (normalizing codes, ids, dates, and amounts), and renders the typed form
//! back into a document. [`DocumentReconciler`] adapts any record type to the
//! engine's [`Reconciler`] contract over an [`EntityStore`].
//!
//! Updates merge the incoming document onto the stored one, so fields absent
//! from the incoming record are preserved. A document larger than
//! [`MAX_DOCUMENT_BYTES`] once merged is a row error, not a chunk failure.

// ============================================================================
// SECTION: Submodules
// ============================================================================

mod commissions;
pub(crate) mod fields;
mod masters;
mod products;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::marker::PhantomData;

use serde_json::Map;
use serde_json::Value;

pub use self::commissions::AdvisorCommissionRecord;
pub use self::commissions::StoreManagerCommissionRecord;
pub use self::masters::ActiveDirectoryRecord;
pub use self::masters::EmployeeRecord;
pub use self::masters::StoreConfigurationRecord;
pub use self::products::ExtrategicProductRecord;
pub use self::products::ProductComplianceRecord;
use crate::core::BlockName;
use crate::core::CalculateDate;
use crate::core::EntityRow;
use crate::core::MAX_DOCUMENT_BYTES;
use crate::interfaces::EntityStore;
use crate::interfaces::StoreError;
use crate::runtime::engine::DEFAULT_CHUNK_SIZE;
use crate::runtime::engine::ReconcileError;
use crate::runtime::engine::ReconcileOutcome;
use crate::runtime::engine::Reconciler;
use crate::runtime::engine::RowError;
use crate::runtime::engine::reconcile;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Batch-level context shared by every record of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerContext {
    /// Batch calculation date used when a record carries none.
    pub calculate_date: Option<CalculateDate>,
    /// Distinct records per chunk.
    pub chunk_size: usize,
}

impl Default for HandlerContext {
    fn default() -> Self {
        Self {
            calculate_date: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

// ============================================================================
// SECTION: Domain Records
// ============================================================================

/// Typed record of one data domain.
pub trait DomainRecord: Sized {
    /// Block the record belongs to.
    const BLOCK: BlockName;

    /// Derives the natural key without decoding the rest of the record.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when a key field is missing or malformed.
    fn natural_key(record: &Map<String, Value>, context: &HandlerContext)
    -> Result<String, RowError>;

    /// Decodes and normalizes a raw record. Unknown fields are retained.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when a field fails coercion.
    fn decode(record: Map<String, Value>, context: &HandlerContext) -> Result<Self, RowError>;

    /// Renders the normalized record as a stored document.
    fn into_document(self) -> Map<String, Value>;
}

// ============================================================================
// SECTION: Document Reconciler
// ============================================================================

/// Engine adapter persisting a domain's records as entity documents.
pub struct DocumentReconciler<'a, S: ?Sized, D> {
    /// Entity store receiving the writes.
    store: &'a S,
    /// Batch context.
    context: &'a HandlerContext,
    /// Record type marker.
    record: PhantomData<fn() -> D>,
}

impl<'a, S: EntityStore + ?Sized, D: DomainRecord> DocumentReconciler<'a, S, D> {
    /// Creates a reconciler for one run.
    #[must_use]
    pub const fn new(store: &'a S, context: &'a HandlerContext) -> Self {
        Self {
            store,
            context,
            record: PhantomData,
        }
    }

    /// Decodes a raw record into its stored document.
    fn document(&self, record: Value) -> Result<Map<String, Value>, RowError> {
        let Value::Object(object) = record else {
            return Err(RowError::NotAnObject);
        };
        Ok(D::decode(object, self.context)?.into_document())
    }
}

impl<S: EntityStore + ?Sized, D: DomainRecord> Reconciler for DocumentReconciler<'_, S, D> {
    type Entity = EntityRow;

    fn natural_key(&self, record: &Value) -> Result<String, RowError> {
        let object = record.as_object().ok_or(RowError::NotAnObject)?;
        D::natural_key(object, self.context)
    }

    fn lookup_existing(&self, keys: &[String]) -> Result<HashMap<String, EntityRow>, StoreError> {
        let rows = self.store.find_by_keys(D::BLOCK, keys)?;
        Ok(rows.into_iter().map(|row| (row.natural_key.clone(), row)).collect())
    }

    fn merge(&self, existing: EntityRow, record: Value) -> Result<EntityRow, RowError> {
        let incoming = self.document(record)?;
        let mut document = existing.document;
        document.extend(incoming);
        sized_row(existing.natural_key, document)
    }

    fn build(&self, key: String, record: Value) -> Result<EntityRow, RowError> {
        sized_row(key, self.document(record)?)
    }

    fn apply_updates(&self, entities: &[EntityRow]) -> Result<(), StoreError> {
        self.store.update_rows(D::BLOCK, entities)
    }

    fn apply_inserts(&self, entities: &[EntityRow]) -> Result<(), StoreError> {
        self.store.insert_rows(D::BLOCK, entities)
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Runs the handler selected for `block`.
///
/// # Errors
///
/// Returns [`ReconcileError`] when the store fails mid-run.
pub fn reconcile_block<S: EntityStore + ?Sized>(
    store: &S,
    block: BlockName,
    records: Vec<Value>,
    context: &HandlerContext,
) -> Result<ReconcileOutcome, ReconcileError> {
    match block {
        BlockName::Employees => run::<S, EmployeeRecord>(store, records, context),
        BlockName::ProductCompliance => run::<S, ProductComplianceRecord>(store, records, context),
        BlockName::CalculationProductExtrategic => {
            run::<S, ExtrategicProductRecord>(store, records, context)
        }
        BlockName::ActiveDirectory => run::<S, ActiveDirectoryRecord>(store, records, context),
        BlockName::StoreConfiguration => run::<S, StoreConfigurationRecord>(store, records, context),
        BlockName::AdvisorCommission => run::<S, AdvisorCommissionRecord>(store, records, context),
        BlockName::StoreManagerCalculationCommission => {
            run::<S, StoreManagerCommissionRecord>(store, records, context)
        }
    }
}

/// Reconciles records of one domain.
fn run<S: EntityStore + ?Sized, D: DomainRecord>(
    store: &S,
    records: Vec<Value>,
    context: &HandlerContext,
) -> Result<ReconcileOutcome, ReconcileError> {
    let reconciler = DocumentReconciler::<S, D>::new(store, context);
    reconcile(&reconciler, records, context.chunk_size)
}

/// Builds a row, rejecting documents over the size limit.
fn sized_row(key: String, document: Map<String, Value>) -> Result<EntityRow, RowError> {
    let size = serde_json::to_vec(&document).map_or(usize::MAX, |bytes| bytes.len());
    if size > MAX_DOCUMENT_BYTES {
        return Err(RowError::DocumentTooLarge {
            max_bytes: MAX_DOCUMENT_BYTES,
        });
    }
    Ok(EntityRow::new(key, document))
}

/// Joins key parts with the composite key separator.
pub(crate) fn composite_key(parts: &[&str]) -> String {
    parts.join("|")
}
