// crates/sellout-core/src/lib.rs
// ============================================================================
// Module: Sellout Core Library
// Description: Public API surface for the sellout ingestion core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Sellout core ingests compressed, loosely-typed extracted-data batches from
//! external producers. It decodes the body, classifies the payload into one
//! data domain, reconciles the records against persisted entities by natural
//! key in bounded chunks, and records one auditable extraction run per call.
//! Persistence is reached only through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::DataSourceCatalog;
pub use interfaces::EntityStore;
pub use interfaces::ExtractionLogStore;
pub use interfaces::ExtractionRunStore;
pub use interfaces::IngestStore;
pub use interfaces::LogCounts;
pub use interfaces::SharedIngestStore;
pub use interfaces::StoreError;
pub use interfaces::UserDirectory;
pub use runtime::BodyEncoding;
pub use runtime::DecodedBody;
pub use runtime::GatewayError;
pub use runtime::GatewayLimits;
pub use runtime::InMemoryIngestStore;
pub use runtime::IngestError;
pub use runtime::IngestReport;
pub use runtime::IngestRequest;
pub use runtime::IngestSettings;
pub use runtime::IngestionService;
pub use runtime::RunStatus;
pub use runtime::UnclassifiedPolicy;
pub use runtime::normalize_body;
