// crates/sellout-core/src/runtime/recorder.rs
// ============================================================================
// Module: Ingestion Service
// Description: Actor resolution, classification, timed reconciliation, and run recording.
// Purpose: Turn one decoded payload into reconciled entities plus one audit row.
// Dependencies: crate::{core, interfaces, runtime}, serde, thiserror
// ============================================================================

//! ## Overview
//! [`IngestionService::ingest`] drives one run:
//! `Received -> Classified -> Reconciling -> Recorded | RecordedWithErrors`,
//! or stops early at `ClassificationFailed`. Reference and classification
//! failures return before anything is written. A store failure during
//! reconciliation keeps the chunks already written, persists no run row, and
//! reports how far the run got. Once the run row exists, a failed scheduler
//! log update is reported on the [`IngestReport`] instead of failing the call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::BlockName;
use crate::core::DataSourceId;
use crate::core::ExternalIdentity;
use crate::core::ExtractionLogId;
use crate::core::ExtractionRun;
use crate::core::NewExtractionRun;
use crate::core::ProcessingDetails;
use crate::core::UNCLASSIFIED_DATA_NAME;
use crate::core::User;
use crate::core::time::now_rfc3339;
use crate::interfaces::DataSourceCatalog;
use crate::interfaces::ExtractionLogStore;
use crate::interfaces::ExtractionRunStore;
use crate::interfaces::LogCounts;
use crate::interfaces::SharedIngestStore;
use crate::interfaces::StoreError;
use crate::interfaces::UserDirectory;
use crate::runtime::classifier::Classification;
use crate::runtime::classifier::ClassificationError;
use crate::runtime::classifier::ClassifiedBlock;
use crate::runtime::classifier::EnvelopeError;
use crate::runtime::classifier::IngestEnvelope;
use crate::runtime::classifier::classify;
use crate::runtime::engine::DEFAULT_CHUNK_SIZE;
use crate::runtime::engine::ReconcileError;
use crate::runtime::engine::RowError;
use crate::runtime::engine::count;
use crate::runtime::handlers::HandlerContext;
use crate::runtime::handlers::reconcile_block;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Handling of payloads that contain no known block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclassifiedPolicy {
    /// Fail the request with a classification error; nothing is written.
    #[default]
    Reject,
    /// Persist a minimal unprocessed run and report success.
    Record,
}

/// Ingestion tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Distinct records per chunk.
    pub chunk_size: usize,
    /// Unclassified payload handling.
    pub unclassified: UnclassifiedPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            unclassified: UnclassifiedPolicy::Reject,
        }
    }
}

// ============================================================================
// SECTION: Requests and Reports
// ============================================================================

/// Decoded ingestion payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    /// Payload object as produced by the decompression gateway.
    pub payload: Map<String, Value>,
}

impl IngestRequest {
    /// Wraps a decoded payload object.
    #[must_use]
    pub const fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload,
        }
    }
}

/// Terminal state of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every record was accepted.
    Recorded,
    /// Some records were rejected by row validation.
    RecordedWithErrors,
    /// No block was recognized; a minimal run was recorded.
    Unclassified,
}

/// Result of a successful ingestion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Human-readable summary.
    pub message: String,
    /// Terminal state.
    pub status: RunStatus,
    /// Persisted run row.
    pub run: ExtractionRun,
    /// Entities updated.
    pub updated: u64,
    /// Entities inserted.
    pub inserted: u64,
    /// Chunks planned.
    pub chunks_total: u64,
    /// Scheduler log counter update that failed after the run was recorded.
    pub log_sync_error: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingestion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// Actor or data source could not be resolved.
    #[error("{0}")]
    ReferenceNotFound(String),
    /// Envelope fields are malformed.
    #[error(transparent)]
    InvalidEnvelope(#[from] EnvelopeError),
    /// No usable block was found.
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    /// Reconciliation stopped on a store failure; completed chunks remain.
    #[error("{block} reconciliation failed after {chunks_completed} of {chunks_total} chunks: {source}")]
    Persistence {
        /// Block being reconciled.
        block: BlockName,
        /// Chunks fully written.
        chunks_completed: u64,
        /// Chunks planned.
        chunks_total: u64,
        /// Distinct records written before the failure.
        accepted: u64,
        /// Underlying store error.
        source: StoreError,
    },
    /// A lookup or run write failed outside reconciliation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Stable error kind reported to callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound(_) => "reference_not_found",
            Self::InvalidEnvelope(_) => "invalid_envelope",
            Self::Classification(_) => "classification_error",
            Self::Persistence {
                ..
            } => "persistence_error",
            Self::Store(_) => "store_error",
        }
    }
}

// ============================================================================
// SECTION: Ingestion Service
// ============================================================================

/// Ingestion entry point shared by every request.
#[derive(Clone)]
pub struct IngestionService {
    /// Injected store handle.
    store: SharedIngestStore,
    /// Tuning.
    settings: IngestSettings,
}

/// Data source and scheduler log linked to a run.
struct SourceLink {
    /// Declared data source.
    data_source_id: Option<DataSourceId>,
    /// Active scheduler log, when one exists.
    extraction_log_id: Option<ExtractionLogId>,
}

impl IngestionService {
    /// Creates a service over an injected store.
    #[must_use]
    pub const fn new(store: SharedIngestStore, settings: IngestSettings) -> Self {
        Self {
            store,
            settings,
        }
    }

    /// Returns the service settings.
    #[must_use]
    pub const fn settings(&self) -> IngestSettings {
        self.settings
    }

    /// Returns the injected store.
    #[must_use]
    pub const fn store(&self) -> &SharedIngestStore {
        &self.store
    }

    /// Ingests one decoded payload on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when references cannot be resolved, the
    /// payload cannot be classified, or the store fails.
    pub fn ingest(
        &self,
        request: IngestRequest,
        actor: &ExternalIdentity,
    ) -> Result<IngestReport, IngestError> {
        let user = self.resolve_actor(actor)?;
        let envelope = IngestEnvelope::read(&request.payload)?;
        let link = self.resolve_source(envelope.data_source_id)?;
        match classify(&request.payload)? {
            Classification::Block(block) => self.reconcile_and_record(block, &envelope, &link, &user),
            Classification::Unclassified => match self.settings.unclassified {
                UnclassifiedPolicy::Reject => Err(ClassificationError::NoKnownBlock.into()),
                UnclassifiedPolicy::Record => self.record_unclassified(&envelope, &link, &user),
            },
        }
    }

    /// Resolves the processing user from the caller identity.
    fn resolve_actor(&self, actor: &ExternalIdentity) -> Result<User, IngestError> {
        if actor.is_empty() {
            return Err(IngestError::ReferenceNotFound("actor identity is empty".to_string()));
        }
        match self.store.find_user(actor)? {
            Some(user) if user.active => Ok(user),
            Some(_) => Err(IngestError::ReferenceNotFound(format!("user '{actor}' is inactive"))),
            None => Err(IngestError::ReferenceNotFound(format!("user '{actor}' not found"))),
        }
    }

    /// Validates the declared data source and finds its active log.
    fn resolve_source(&self, data_source_id: Option<DataSourceId>) -> Result<SourceLink, IngestError> {
        let Some(id) = data_source_id else {
            return Ok(SourceLink {
                data_source_id: None,
                extraction_log_id: None,
            });
        };
        match self.store.find_data_source(id)? {
            Some(source) if source.active => {}
            Some(_) => {
                return Err(IngestError::ReferenceNotFound(format!("data source {id} is inactive")));
            }
            None => {
                return Err(IngestError::ReferenceNotFound(format!("data source {id} not found")));
            }
        }
        let log = self.store.find_active_log(id)?;
        Ok(SourceLink {
            data_source_id: Some(id),
            extraction_log_id: log.map(|log| log.id),
        })
    }

    /// Runs the selected handler and records the outcome.
    fn reconcile_and_record(
        &self,
        block: ClassifiedBlock,
        envelope: &IngestEnvelope,
        link: &SourceLink,
        user: &User,
    ) -> Result<IngestReport, IngestError> {
        let ClassifiedBlock {
            block,
            records,
        } = block;
        let record_count = count(records.len());
        let context = HandlerContext {
            calculate_date: envelope.calculate_date,
            chunk_size: self.settings.chunk_size,
        };

        let started = Instant::now();
        let outcome = reconcile_block(&self.store, block, records, &context).map_err(|err| {
            let ReconcileError::Persistence {
                chunks_completed,
                chunks_total,
                accepted,
                source,
            } = err;
            IngestError::Persistence {
                block,
                chunks_completed,
                chunks_total,
                accepted,
                source,
            }
        })?;
        let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let rejected = record_count.saturating_sub(outcome.accepted);
        let details = ProcessingDetails {
            duration,
            error: rejected,
            sms_errors: group_errors(&outcome.errors),
            duplicates_dropped: outcome.duplicates_dropped,
            chunks_completed: outcome.chunks_completed,
        };
        let run = self.store.insert_run(NewExtractionRun {
            data_name: block.as_str().to_string(),
            calculate_date: envelope.calculate_date,
            extraction_date: envelope.extraction_date.clone(),
            record_count,
            accepted_count: outcome.accepted,
            rejected_count: rejected,
            is_processed: true,
            processed_date: Some(now_rfc3339()),
            processing_details: Some(details),
            processor_id: user.id,
            creator_id: user.id,
            data_source_id: link.data_source_id,
            extraction_log_id: link.extraction_log_id,
        })?;
        // The run row is committed; a failed counter update must not turn it
        // into an error that invites a duplicate delivery.
        let log_sync_error = link.extraction_log_id.and_then(|log_id| {
            self.store
                .add_log_counts(
                    log_id,
                    LogCounts {
                        extracted: record_count,
                        processed: outcome.accepted,
                        failed: rejected,
                    },
                )
                .err()
                .map(|err| err.to_string())
        });

        let status = if outcome.errors.is_empty() {
            RunStatus::Recorded
        } else {
            RunStatus::RecordedWithErrors
        };
        let message = match status {
            RunStatus::RecordedWithErrors => format!(
                "{block} processed: {} accepted, {} rejected",
                outcome.accepted, rejected
            ),
            _ => format!("{block} processed: {} accepted", outcome.accepted),
        };
        Ok(IngestReport {
            message,
            status,
            run,
            updated: outcome.updated,
            inserted: outcome.inserted,
            chunks_total: outcome.chunks_total,
            log_sync_error,
        })
    }

    /// Records a payload no handler recognized.
    fn record_unclassified(
        &self,
        envelope: &IngestEnvelope,
        link: &SourceLink,
        user: &User,
    ) -> Result<IngestReport, IngestError> {
        let run = self.store.insert_run(NewExtractionRun {
            data_name: UNCLASSIFIED_DATA_NAME.to_string(),
            calculate_date: envelope.calculate_date,
            extraction_date: envelope.extraction_date.clone(),
            record_count: 0,
            accepted_count: 0,
            rejected_count: 0,
            is_processed: false,
            processed_date: None,
            processing_details: None,
            processor_id: user.id,
            creator_id: user.id,
            data_source_id: link.data_source_id,
            extraction_log_id: link.extraction_log_id,
        })?;
        Ok(IngestReport {
            message: "extracted data received; no known block to process".to_string(),
            status: RunStatus::Unclassified,
            run,
            updated: 0,
            inserted: 0,
            chunks_total: 0,
            log_sync_error: None,
        })
    }
}

// ============================================================================
// SECTION: Error Grouping
// ============================================================================

/// Groups row errors by message in first-occurrence order. Repeated messages
/// render as `"<message> (xN)"`.
#[must_use]
pub fn group_errors(errors: &[RowError]) -> Vec<String> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, u64)> = Vec::new();
    for error in errors {
        let message = error.to_string();
        if let Some(&position) = positions.get(&message) {
            groups[position].1 += 1;
        } else {
            positions.insert(message.clone(), groups.len());
            groups.push((message, 1));
        }
    }
    groups
        .into_iter()
        .map(|(message, n)| if n > 1 { format!("{message} (x{n})") } else { message })
        .collect()
}
