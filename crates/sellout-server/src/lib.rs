// crates/sellout-server/src/lib.rs
// ============================================================================
// Module: Sellout Server Library
// Description: HTTP surface for extracted-data ingestion.
// Purpose: Expose the ingestion service over HTTP with structured audit logs.
// Dependencies: sellout-core, sellout-config, sellout-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! `sellout-server` exposes the ingestion service over HTTP. Request bodies
//! are decoded by the decompression gateway, the caller identity comes from a
//! header set by the authenticating proxy, and every request, run, and
//! failure is written to an audit sink as a JSON line.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod error;
pub mod extract;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FailureAuditEvent;
pub use audit::FileAuditSink;
pub use audit::IngestAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::RunAuditEvent;
pub use audit::StderrAuditSink;
pub use error::ApiError;
pub use server::SelloutServer;
pub use server::ServerError;
pub use server::build_audit_sink;
pub use server::build_store;
