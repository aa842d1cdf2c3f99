// crates/sellout-core/src/core/records.rs
// ============================================================================
// Module: Persisted Records
// Description: Extraction runs, extraction logs, users, data sources, and entity rows.
// Purpose: Shared persisted shapes for the recorder and every store backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`ExtractionRun`] is the append-only audit row written once per ingestion
//! call. [`ExtractionLog`] belongs to the external scheduler; the ingestion
//! core only reads it and adds counts. [`User`] and [`DataSource`] are
//! collaborator records resolved by reference. [`EntityRow`] is the generic
//! per-domain document the handlers reconcile into.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::DataSourceId;
use crate::core::identifiers::ExternalIdentity;
use crate::core::identifiers::ExtractionLogId;
use crate::core::identifiers::ExtractionRunId;
use crate::core::identifiers::UserId;
use crate::core::time::CalculateDate;

// ============================================================================
// SECTION: Extraction Runs
// ============================================================================

/// Data name recorded for payloads no handler recognized.
pub const UNCLASSIFIED_DATA_NAME: &str = "unclassified";

/// Maximum serialized size of one entity document.
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Outcome metrics of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingDetails {
    /// Handler wall-clock duration in milliseconds.
    pub duration: u64,
    /// Input records that did not become an accepted row.
    pub error: u64,
    /// Row error messages grouped by text.
    pub sms_errors: Vec<String>,
    /// Records dropped because a later record shared their natural key.
    #[serde(default)]
    pub duplicates_dropped: u64,
    /// Chunks fully written before the run ended.
    #[serde(default)]
    pub chunks_completed: u64,
}

/// Values of an extraction run before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExtractionRun {
    /// Block name processed, or [`UNCLASSIFIED_DATA_NAME`].
    pub data_name: String,
    /// Calculation date the batch belongs to.
    pub calculate_date: Option<CalculateDate>,
    /// Producer-supplied extraction timestamp.
    pub extraction_date: Option<String>,
    /// Number of records in the classified block.
    pub record_count: u64,
    /// Distinct keys written.
    pub accepted_count: u64,
    /// Records not written (row errors and dropped duplicates).
    pub rejected_count: u64,
    /// Whether a handler processed the block.
    pub is_processed: bool,
    /// When the block was processed (RFC 3339).
    pub processed_date: Option<String>,
    /// Processing metrics; absent for unclassified payloads.
    pub processing_details: Option<ProcessingDetails>,
    /// User that processed the batch.
    pub processor_id: UserId,
    /// User that created the run record.
    pub creator_id: UserId,
    /// Originating data source when the producer declared one.
    pub data_source_id: Option<DataSourceId>,
    /// Scheduler log active for the data source at ingestion time.
    pub extraction_log_id: Option<ExtractionLogId>,
}

/// Persisted extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRun {
    /// Store-assigned identifier.
    pub id: ExtractionRunId,
    /// Block name processed.
    pub data_name: String,
    /// Calculation date the batch belongs to.
    pub calculate_date: Option<CalculateDate>,
    /// Producer-supplied extraction timestamp.
    pub extraction_date: Option<String>,
    /// Number of records in the classified block.
    pub record_count: u64,
    /// Distinct keys written.
    pub accepted_count: u64,
    /// Records not written.
    pub rejected_count: u64,
    /// Whether a handler processed the block.
    pub is_processed: bool,
    /// When the block was processed.
    pub processed_date: Option<String>,
    /// Processing metrics.
    pub processing_details: Option<ProcessingDetails>,
    /// Processing user.
    pub processor_id: UserId,
    /// Creating user.
    pub creator_id: UserId,
    /// Originating data source.
    pub data_source_id: Option<DataSourceId>,
    /// Linked scheduler log.
    pub extraction_log_id: Option<ExtractionLogId>,
    /// Row creation time (RFC 3339).
    pub created_at: String,
}

impl ExtractionRun {
    /// Builds the persisted form of a draft run.
    #[must_use]
    pub fn from_new(id: ExtractionRunId, run: NewExtractionRun, created_at: String) -> Self {
        Self {
            id,
            data_name: run.data_name,
            calculate_date: run.calculate_date,
            extraction_date: run.extraction_date,
            record_count: run.record_count,
            accepted_count: run.accepted_count,
            rejected_count: run.rejected_count,
            is_processed: run.is_processed,
            processed_date: run.processed_date,
            processing_details: run.processing_details,
            processor_id: run.processor_id,
            creator_id: run.creator_id,
            data_source_id: run.data_source_id,
            extraction_log_id: run.extraction_log_id,
            created_at,
        }
    }
}

// ============================================================================
// SECTION: Extraction Logs
// ============================================================================

/// Scheduler-owned extraction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionStatus {
    /// Extraction is running.
    InProgress,
    /// Extraction finished successfully.
    Success,
    /// Extraction failed.
    Failed,
    /// Extraction was cancelled.
    Cancelled,
}

impl ExtractionStatus {
    /// Returns the persisted label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IN_PROGRESS" => Some(Self::InProgress),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Coarse extraction record maintained by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionLog {
    /// Store-assigned identifier.
    pub id: ExtractionLogId,
    /// Data source the extraction belongs to.
    pub data_source_id: DataSourceId,
    /// Start time (RFC 3339).
    pub start_time: String,
    /// End time (RFC 3339) once finished.
    pub end_time: Option<String>,
    /// Current status.
    pub status: ExtractionStatus,
    /// Records extracted by the producer.
    pub extracted_count: u64,
    /// Records accepted by ingestion.
    pub processed_count: u64,
    /// Records rejected by ingestion.
    pub failed_count: u64,
    /// Free-form execution detail.
    pub execution_detail: Option<String>,
}

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// Back-office user resolved from an external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned identifier.
    pub id: UserId,
    /// Identity provider subject.
    pub external_id: ExternalIdentity,
    /// Display name.
    pub display_name: String,
    /// Inactive users cannot be attributed runs.
    pub active: bool,
}

/// Configured extraction data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Store-assigned identifier.
    pub id: DataSourceId,
    /// Human-readable name.
    pub name: String,
    /// Inactive sources reject ingestion.
    pub active: bool,
}

// ============================================================================
// SECTION: Entity Rows
// ============================================================================

/// Reconciled business entity stored as a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRow {
    /// Normalized natural key.
    pub natural_key: String,
    /// Entity fields.
    pub document: Map<String, Value>,
}

impl EntityRow {
    /// Creates a row from a key and document.
    #[must_use]
    pub fn new(natural_key: impl Into<String>, document: Map<String, Value>) -> Self {
        Self {
            natural_key: natural_key.into(),
            document,
        }
    }
}
