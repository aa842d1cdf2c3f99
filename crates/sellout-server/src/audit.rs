// crates/sellout-server/src/audit.rs
// ============================================================================
// Module: Ingestion Audit Logging
// Description: Structured audit events for ingestion requests and runs.
// Purpose: Emit JSON-line audit logs without hard dependencies.
// Dependencies: sellout-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Three events are emitted: `ingest_request` for every HTTP call,
//! `ingest_run` for every recorded run, and `ingest_failed` when an
//! ingestion stops before recording. Sinks are lightweight so deployments can
//! route events to their preferred logging pipeline. Payload contents are
//! never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use sellout_core::ExternalIdentity;
use sellout_core::IngestError;
use sellout_core::IngestReport;
use sellout_core::RunStatus;
use sellout_core::core::time::unix_millis;
use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Audit event for one HTTP request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// HTTP method.
    pub method: String,
    /// Route template.
    pub route: &'static str,
    /// Response status code.
    pub status: u16,
    /// Request body size in bytes, as received.
    pub request_bytes: usize,
    /// Body decoding path when the body was decoded.
    pub encoding: Option<&'static str>,
    /// Caller identity when resolved.
    pub actor: Option<String>,
    /// Error kind label when the request failed.
    pub error_kind: Option<&'static str>,
    /// Handling time in milliseconds.
    pub latency_ms: u128,
}

/// Inputs required to construct a request audit event.
pub struct RequestAuditParams {
    /// HTTP method.
    pub method: String,
    /// Route template.
    pub route: &'static str,
    /// Response status code.
    pub status: u16,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Body decoding path.
    pub encoding: Option<&'static str>,
    /// Caller identity.
    pub actor: Option<String>,
    /// Error kind label.
    pub error_kind: Option<&'static str>,
    /// Handling time in milliseconds.
    pub latency_ms: u128,
}

impl RequestAuditEvent {
    /// Creates a new request event with a consistent timestamp.
    #[must_use]
    pub fn new(params: RequestAuditParams) -> Self {
        Self {
            event: "ingest_request",
            timestamp_ms: unix_millis(),
            method: params.method,
            route: params.route,
            status: params.status,
            request_bytes: params.request_bytes,
            encoding: params.encoding,
            actor: params.actor,
            error_kind: params.error_kind,
            latency_ms: params.latency_ms,
        }
    }
}

/// Audit event for a recorded extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct RunAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Persisted run id.
    pub run_id: i64,
    /// Block processed.
    pub data_name: String,
    /// Terminal state.
    pub status: RunStatus,
    /// Processing user.
    pub actor: String,
    /// Input records.
    pub record_count: u64,
    /// Accepted records.
    pub accepted_count: u64,
    /// Rejected records.
    pub rejected_count: u64,
    /// Records superseded by a later record with the same key.
    pub duplicates_dropped: u64,
    /// Chunks written.
    pub chunks_completed: u64,
    /// Chunks planned.
    pub chunks_total: u64,
    /// Entities updated.
    pub updated: u64,
    /// Entities inserted.
    pub inserted: u64,
    /// Handler duration in milliseconds.
    pub duration_ms: u64,
    /// Linked data source.
    pub data_source_id: Option<i64>,
    /// Linked scheduler log.
    pub extraction_log_id: Option<i64>,
    /// Scheduler log counter update failure, when the run was recorded anyway.
    pub log_sync_error: Option<String>,
}

impl RunAuditEvent {
    /// Builds the event for a successful ingestion.
    #[must_use]
    pub fn from_report(report: &IngestReport, actor: &ExternalIdentity) -> Self {
        let details = report.run.processing_details.as_ref();
        Self {
            event: "ingest_run",
            timestamp_ms: unix_millis(),
            run_id: report.run.id.get(),
            data_name: report.run.data_name.clone(),
            status: report.status,
            actor: actor.as_str().to_string(),
            record_count: report.run.record_count,
            accepted_count: report.run.accepted_count,
            rejected_count: report.run.rejected_count,
            duplicates_dropped: details.map_or(0, |details| details.duplicates_dropped),
            chunks_completed: details.map_or(0, |details| details.chunks_completed),
            chunks_total: report.chunks_total,
            updated: report.updated,
            inserted: report.inserted,
            duration_ms: details.map_or(0, |details| details.duration),
            data_source_id: report.run.data_source_id.map(|id| id.get()),
            extraction_log_id: report.run.extraction_log_id.map(|id| id.get()),
            log_sync_error: report.log_sync_error.clone(),
        }
    }
}

/// Audit event for an ingestion that stopped before recording a run.
#[derive(Debug, Clone, Serialize)]
pub struct FailureAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Error kind label.
    pub error_kind: &'static str,
    /// Error description.
    pub message: String,
    /// Caller identity.
    pub actor: String,
    /// Block being reconciled on persistence failures.
    pub block: Option<&'static str>,
    /// Chunks committed before a persistence failure.
    pub chunks_completed: Option<u64>,
    /// Chunks planned on persistence failures.
    pub chunks_total: Option<u64>,
    /// Records committed before a persistence failure.
    pub accepted: Option<u64>,
}

impl FailureAuditEvent {
    /// Builds the event for a failed ingestion.
    #[must_use]
    pub fn from_error(error: &IngestError, actor: &ExternalIdentity) -> Self {
        let mut event = Self {
            event: "ingest_failed",
            timestamp_ms: unix_millis(),
            error_kind: error.kind(),
            message: error.to_string(),
            actor: actor.as_str().to_string(),
            block: None,
            chunks_completed: None,
            chunks_total: None,
            accepted: None,
        };
        if let IngestError::Persistence {
            block,
            chunks_completed,
            chunks_total,
            accepted,
            ..
        } = error
        {
            event.block = Some(block.as_str());
            event.chunks_completed = Some(*chunks_completed);
            event.chunks_total = Some(*chunks_total);
            event.accepted = Some(*accepted);
        }
        event
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for ingestion events.
pub trait IngestAuditSink: Send + Sync {
    /// Record a request event.
    fn record_request(&self, event: &RequestAuditEvent);

    /// Record a run event.
    fn record_run(&self, event: &RunAuditEvent);

    /// Record a failure event.
    fn record_failure(&self, event: &FailureAuditEvent);
}

/// Writes one event as a JSON line. Audit failures never fail a request.
fn write_line(writer: &mut impl Write, event: &impl Serialize) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(writer, "{payload}");
        let _ = writer.flush();
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl IngestAuditSink for StderrAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        write_line(&mut io::stderr(), event);
    }

    fn record_run(&self, event: &RunAuditEvent) {
        write_line(&mut io::stderr(), event);
    }

    fn record_failure(&self, event: &FailureAuditEvent) {
        write_line(&mut io::stderr(), event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one event.
    fn append(&self, event: &impl Serialize) {
        if let Ok(mut file) = self.file.lock() {
            write_line(&mut *file, event);
        }
    }
}

impl IngestAuditSink for FileAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        self.append(event);
    }

    fn record_run(&self, event: &RunAuditEvent) {
        self.append(event);
    }

    fn record_failure(&self, event: &FailureAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl IngestAuditSink for NoopAuditSink {
    fn record_request(&self, _event: &RequestAuditEvent) {}

    fn record_run(&self, _event: &RunAuditEvent) {}

    fn record_failure(&self, _event: &FailureAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use sellout_core::BlockName;
    use sellout_core::StoreError;
    use serde_json::Value;

    use super::*;

    #[test]
    fn failure_event_carries_partial_commit_progress() {
        let error = IngestError::Persistence {
            block: BlockName::Employees,
            chunks_completed: 2,
            chunks_total: 5,
            accepted: 20,
            source: StoreError::Store("disk full".to_string()),
        };
        let event = FailureAuditEvent::from_error(&error, &ExternalIdentity::new("svc"));
        assert_eq!(event.error_kind, "persistence_error");
        assert_eq!(event.block, Some("employees"));
        assert_eq!(event.chunks_completed, Some(2));
        assert_eq!(event.chunks_total, Some(5));
        assert_eq!(event.accepted, Some(20));
    }

    #[test]
    fn failure_event_omits_progress_for_other_errors() {
        let error = IngestError::ReferenceNotFound("user 'x' not found".to_string());
        let event = FailureAuditEvent::from_error(&error, &ExternalIdentity::new("x"));
        assert_eq!(event.error_kind, "reference_not_found");
        assert!(event.chunks_completed.is_none());
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).unwrap();
        let params = || RequestAuditParams {
            method: "POST".to_string(),
            route: "/api/extracted-data",
            status: 201,
            request_bytes: 42,
            encoding: Some("gzip"),
            actor: Some("svc".to_string()),
            error_kind: None,
            latency_ms: 3,
        };
        sink.record_request(&RequestAuditEvent::new(params()));
        sink.record_request(&RequestAuditEvent::new(params()));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "ingest_request");
        assert_eq!(parsed["status"], 201);
        assert_eq!(parsed["encoding"], "gzip");
    }
}
