// crates/sellout-core/src/runtime/mod.rs
// ============================================================================
// Module: Sellout Runtime
// Description: Decompression gateway, classifier, upsert engine, handlers, and recorder.
// Purpose: Execute ingestion runs against an injected store.
// Dependencies: crate::{core, interfaces}, base64, flate2, serde_json
// ============================================================================

//! ## Overview
//! A request body flows through [`gateway::normalize_body`], then
//! [`IngestionService::ingest`], which classifies the payload, runs exactly
//! one domain handler through the batch upsert engine, and records the run.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod classifier;
pub mod engine;
pub mod gateway;
pub mod handlers;
pub mod recorder;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use classifier::Classification;
pub use classifier::ClassificationError;
pub use classifier::ClassifiedBlock;
pub use classifier::EnvelopeError;
pub use classifier::IngestEnvelope;
pub use classifier::classify;
pub use engine::DEFAULT_CHUNK_SIZE;
pub use engine::MAX_CHUNK_SIZE;
pub use engine::ReconcileError;
pub use engine::ReconcileOutcome;
pub use engine::Reconciler;
pub use engine::RowError;
pub use engine::reconcile;
pub use gateway::BodyEncoding;
pub use gateway::DecodedBody;
pub use gateway::GatewayError;
pub use gateway::GatewayLimits;
pub use gateway::normalize_body;
pub use handlers::DocumentReconciler;
pub use handlers::DomainRecord;
pub use handlers::HandlerContext;
pub use handlers::reconcile_block;
pub use recorder::IngestError;
pub use recorder::IngestReport;
pub use recorder::IngestRequest;
pub use recorder::IngestSettings;
pub use recorder::IngestionService;
pub use recorder::RunStatus;
pub use recorder::UnclassifiedPolicy;
pub use recorder::group_errors;
pub use store::InMemoryIngestStore;
