// crates/sellout-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Ingest Store
// Description: Durable ingestion store backend using SQLite WAL.
// Purpose: Provide production persistence for reconciled entities and runs.
// Dependencies: sellout-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of every storage trait
//! the ingestion runtime consumes. Entity documents live in one table keyed
//! by `(domain, natural_key)`; each bulk write of a chunk runs in a single
//! transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteIngestStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
