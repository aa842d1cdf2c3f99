// crates/sellout-config/src/lib.rs
// ============================================================================
// Module: Sellout Config Library
// Description: Configuration model and validation for the ingestion service.
// Purpose: Single source of truth for sellout-ingest.toml semantics.
// Dependencies: sellout-core, sellout-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `sellout-config` defines the configuration model for the sellout
//! ingestion service. It provides strict, fail-closed validation so a
//! misconfigured server never starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
