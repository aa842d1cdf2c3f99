// crates/sellout-core/src/core/mod.rs
// ============================================================================
// Module: Sellout Core Types
// Description: Identifiers, block names, dates, and persisted record shapes.
// Purpose: Shared vocabulary for the ingestion runtime and store backends.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Plain data types with no I/O. Everything the stores persist and the HTTP
//! layer returns is defined here.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod block;
pub mod identifiers;
pub mod records;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use block::BlockName;
pub use identifiers::DataSourceId;
pub use identifiers::ExternalIdentity;
pub use identifiers::ExtractionLogId;
pub use identifiers::ExtractionRunId;
pub use identifiers::UserId;
pub use records::DataSource;
pub use records::EntityRow;
pub use records::ExtractionLog;
pub use records::ExtractionRun;
pub use records::ExtractionStatus;
pub use records::MAX_DOCUMENT_BYTES;
pub use records::NewExtractionRun;
pub use records::ProcessingDetails;
pub use records::UNCLASSIFIED_DATA_NAME;
pub use records::User;
pub use time::CalculateDate;
pub use time::DateError;
