// crates/sellout-server/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared test utilities for HTTP ingestion tests.
// Purpose: Spawn servers on ephemeral ports and capture audit events.
// Dependencies: sellout-core, sellout-config, sellout-server, reqwest, tokio
// ============================================================================

//! ## Overview
//! Spawns a [`SelloutServer`] over a seeded in-memory store on an ephemeral
//! loopback port and records every audit event for inspection.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only fixtures."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use flate2::Compression;
use flate2::write::GzEncoder;
use sellout_config::SelloutConfig;
use sellout_core::InMemoryIngestStore;
use sellout_core::SharedIngestStore;
use sellout_server::FailureAuditEvent;
use sellout_server::IngestAuditSink;
use sellout_server::RequestAuditEvent;
use sellout_server::RunAuditEvent;
use sellout_server::SelloutServer;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Identity header used by the tests.
pub const IDENTITY_HEADER: &str = "x-authenticated-user";
/// Seeded active user.
pub const ACTOR: &str = "svc-extractor@corp.example";

// ============================================================================
// SECTION: Audit Capture
// ============================================================================

/// Audit sink that keeps serialized events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Captured events in emission order.
    events: Mutex<Vec<Value>>,
}

impl MemoryAuditSink {
    /// Returns captured events named `event`.
    pub fn events(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|value| value["event"] == event)
            .cloned()
            .collect()
    }

    fn push(&self, value: Value) {
        self.events.lock().unwrap().push(value);
    }
}

impl IngestAuditSink for MemoryAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        self.push(serde_json::to_value(event).unwrap());
    }

    fn record_run(&self, event: &RunAuditEvent) {
        self.push(serde_json::to_value(event).unwrap());
    }

    fn record_failure(&self, event: &FailureAuditEvent) {
        self.push(serde_json::to_value(event).unwrap());
    }
}

// ============================================================================
// SECTION: Server Harness
// ============================================================================

/// Running server bound to an ephemeral port.
pub struct TestServer {
    /// Base URL, without a trailing slash.
    pub base: String,
    /// Store shared with the server.
    pub store: InMemoryIngestStore,
    /// Captured audit events.
    pub audit: Arc<MemoryAuditSink>,
    /// HTTP client.
    pub client: reqwest::Client,
    /// Server task.
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Returns an absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a server with `config` over a store seeded with [`ACTOR`].
pub async fn spawn(config: SelloutConfig) -> TestServer {
    let store = InMemoryIngestStore::new();
    store.add_user(ACTOR, "Extractor", true).unwrap();
    let audit = Arc::new(MemoryAuditSink::default());
    let server = SelloutServer::with_parts(
        config,
        SharedIngestStore::from_store(store.clone()),
        Arc::clone(&audit) as Arc<dyn IngestAuditSink>,
    )
    .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = server.serve_with_listener(listener).await;
    });
    TestServer {
        base: format!("http://{addr}"),
        store,
        audit,
        client: reqwest::Client::new(),
        handle,
    }
}

/// Spawns a server with default configuration.
pub async fn spawn_default() -> TestServer {
    spawn(SelloutConfig::default()).await
}

// ============================================================================
// SECTION: Payload Helpers
// ============================================================================

/// Gzips a JSON value.
pub fn gzip(value: &Value) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serde_json::to_vec(value).unwrap()).unwrap();
    encoder.finish().unwrap()
}
