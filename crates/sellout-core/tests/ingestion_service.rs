// crates/sellout-core/tests/ingestion_service.rs
// ============================================================================
// Module: Ingestion Service Tests
// Description: End-to-end runs through the gateway, classifier, handlers, and recorder.
// Purpose: Validate run accounting, reference checks, and failure semantics.
// Dependencies: sellout-core, flate2, serde_json
// ============================================================================

//! ## Overview
//! Drives [`IngestionService`] against the in-memory store, including a store
//! wrapper that interferes with a run: failing a chosen bulk insert, writing a
//! competing row right after the lookup, or losing the scheduler log.

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use flate2::Compression;
use flate2::write::GzEncoder;
use sellout_core::BlockName;
use sellout_core::DataSource;
use sellout_core::DataSourceCatalog;
use sellout_core::DataSourceId;
use sellout_core::EntityRow;
use sellout_core::EntityStore;
use sellout_core::ExternalIdentity;
use sellout_core::ExtractionLog;
use sellout_core::ExtractionLogId;
use sellout_core::ExtractionLogStore;
use sellout_core::ExtractionRun;
use sellout_core::ExtractionRunId;
use sellout_core::ExtractionRunStore;
use sellout_core::GatewayLimits;
use sellout_core::InMemoryIngestStore;
use sellout_core::IngestError;
use sellout_core::IngestRequest;
use sellout_core::IngestSettings;
use sellout_core::IngestionService;
use sellout_core::LogCounts;
use sellout_core::NewExtractionRun;
use sellout_core::RunStatus;
use sellout_core::SharedIngestStore;
use sellout_core::StoreError;
use sellout_core::UnclassifiedPolicy;
use sellout_core::User;
use sellout_core::UserDirectory;
use sellout_core::normalize_body;
use sellout_core::runtime::ClassificationError;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const ACTOR: &str = "svc-extractor@corp.example";

struct Fixture {
    store: InMemoryIngestStore,
    service: IngestionService,
    actor: ExternalIdentity,
}

fn fixture(settings: IngestSettings) -> Fixture {
    let store = InMemoryIngestStore::new();
    store.add_user(ACTOR, "Extractor", true).unwrap();
    let service = IngestionService::new(SharedIngestStore::from_store(store.clone()), settings);
    Fixture {
        store,
        service,
        actor: ExternalIdentity::new(ACTOR),
    }
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn gzip(value: &Value) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serde_json::to_vec(value).unwrap()).unwrap();
    encoder.finish().unwrap()
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn gzip_store_configuration_inserts_one_row() {
    let fx = fixture(IngestSettings::default());
    let body = gzip(&json!({"store_configuration": [{"storeCode": " A1 ", "name": "Centro"}]}));
    let decoded = normalize_body(Some("application/gzip"), &body, &GatewayLimits::default()).unwrap();

    let report = fx.service.ingest(IngestRequest::new(decoded.into_object()), &fx.actor).unwrap();

    assert_eq!(report.status, RunStatus::Recorded);
    assert_eq!(report.inserted, 1);
    let details = report.run.processing_details.unwrap();
    assert_eq!(details.error, 0);
    assert!(details.sms_errors.is_empty());
    assert!(report.run.is_processed);
    assert!(report.run.processed_date.is_some());
    assert_eq!(report.run.data_name, "store_configuration");
    let stored = fx.store.entity(BlockName::StoreConfiguration, "A1").unwrap().unwrap();
    assert_eq!(stored.get("storeCode"), Some(&json!("A1")));
}

#[test]
fn unknown_block_is_rejected_without_a_run() {
    let fx = fixture(IngestSettings::default());
    let payload = object(json!({"dataContent": {"unknown_block": [{"a": 1}]}}));

    let err = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap_err();

    assert_eq!(err, IngestError::Classification(ClassificationError::NoKnownBlock));
    assert_eq!(err.kind(), "classification_error");
    assert!(fx.service.store().list_runs(10).unwrap().is_empty());
}

#[test]
fn unknown_block_is_recorded_when_configured() {
    let fx = fixture(IngestSettings {
        unclassified: UnclassifiedPolicy::Record,
        ..IngestSettings::default()
    });
    let payload = object(json!({"dataContent": {"unknown_block": [{"a": 1}]}}));

    let report = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap();

    assert_eq!(report.status, RunStatus::Unclassified);
    assert_eq!(report.run.data_name, "unclassified");
    assert!(!report.run.is_processed);
    assert!(report.run.processing_details.is_none());
    assert_eq!(fx.service.store().list_runs(10).unwrap().len(), 1);
}

#[test]
fn large_block_runs_in_three_chunks() {
    let fx = fixture(IngestSettings {
        chunk_size: 1000,
        ..IngestSettings::default()
    });
    let mut records: Vec<Value> =
        (0 .. 2500).map(|i| json!({"employeeCode": format!("{i:06}"), "name": "x"})).collect();
    records[10] = json!({"name": "no code"});
    records[20] = json!({"employeeCode": "000001", "name": "duplicate of 1"});
    let payload = object(json!({"dataContent": {"employees": records}}));

    let report = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap();

    let details = report.run.processing_details.clone().unwrap();
    assert_eq!(report.chunks_total, 3);
    assert_eq!(details.chunks_completed, 3);
    assert_eq!(details.duplicates_dropped, 1);
    assert_eq!(report.run.record_count, 2500);
    assert_eq!(report.run.accepted_count, 2498);
    assert_eq!(report.run.accepted_count + report.run.rejected_count, 2500);
    assert_eq!(details.sms_errors, vec!["field 'employeeCode' is required".to_string()]);
    assert_eq!(report.status, RunStatus::RecordedWithErrors);
    let one = fx.store.entity(BlockName::Employees, "1").unwrap().unwrap();
    assert_eq!(one.get("name"), Some(&json!("duplicate of 1")));
}

#[test]
fn first_registry_block_is_the_only_one_reconciled() {
    let fx = fixture(IngestSettings::default());
    let payload = object(json!({
        "store_configuration": [{"storeCode": "A1"}],
        "employees": [{"employeeCode": "7"}]
    }));

    let report = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap();

    assert_eq!(report.run.data_name, "employees");
    assert!(fx.store.entities(BlockName::StoreConfiguration).unwrap().is_empty());
}

#[test]
fn updates_preserve_fields_absent_from_the_incoming_record() {
    let fx = fixture(IngestSettings::default());
    let first = object(json!({"store_configuration": [{"storeCode": "B2", "region": "North", "goalAmount": 10}]}));
    let second = object(json!({"store_configuration": [{"storeCode": " b2", "goalAmount": "20"}]}));

    fx.service.ingest(IngestRequest::new(first), &fx.actor).unwrap();
    let report = fx.service.ingest(IngestRequest::new(second), &fx.actor).unwrap();

    assert_eq!(report.updated, 1);
    let stored = fx.store.entity(BlockName::StoreConfiguration, "B2").unwrap().unwrap();
    assert_eq!(stored.get("region"), Some(&json!("North")));
    assert_eq!(stored.get("goalAmount"), Some(&json!(20)));
}

#[test]
fn envelope_date_keys_commission_rows() {
    let fx = fixture(IngestSettings::default());
    let payload = object(json!({
        "calculateDate": "2024-07-31",
        "extractionDate": "2024-08-01T02:00:00Z",
        "dataContent": {"advisor_commission": [
            {"employeeCode": "0099", "commissionAmount": "150.75"},
            {"employeeCode": "0100", "commissionAmount": "n/a"}
        ]}
    }));

    let report = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap();

    assert_eq!(report.run.calculate_date.unwrap().to_string(), "2024-07-31");
    assert_eq!(report.run.extraction_date.as_deref(), Some("2024-08-01T02:00:00Z"));
    assert_eq!(report.run.rejected_count, 1);
    assert_eq!(
        report.run.processing_details.unwrap().sms_errors,
        vec!["field 'commissionAmount' must be numeric".to_string()]
    );
    let row = fx.store.entity(BlockName::AdvisorCommission, "2024-07-31|99").unwrap().unwrap();
    assert_eq!(row.get("commissionAmount"), Some(&json!(150.75)));
}

// ============================================================================
// SECTION: References
// ============================================================================

#[test]
fn unknown_actor_is_not_found_and_nothing_is_written() {
    let fx = fixture(IngestSettings::default());
    let payload = object(json!({"employees": [{"employeeCode": "1"}]}));

    let err = fx
        .service
        .ingest(IngestRequest::new(payload), &ExternalIdentity::new("intruder"))
        .unwrap_err();

    assert_eq!(err.kind(), "reference_not_found");
    assert!(fx.store.entities(BlockName::Employees).unwrap().is_empty());
    assert!(fx.service.store().list_runs(10).unwrap().is_empty());
}

#[test]
fn inactive_actor_is_not_found() {
    let fx = fixture(IngestSettings::default());
    fx.store.add_user("retired", "Retired", false).unwrap();
    let payload = object(json!({"employees": [{"employeeCode": "1"}]}));

    let err = fx
        .service
        .ingest(IngestRequest::new(payload), &ExternalIdentity::new("retired"))
        .unwrap_err();

    assert!(matches!(err, IngestError::ReferenceNotFound(_)));
}

#[test]
fn unknown_data_source_is_not_found() {
    let fx = fixture(IngestSettings::default());
    let payload = object(json!({"dataSourceId": 999, "employees": [{"employeeCode": "1"}]}));

    let err = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap_err();

    assert_eq!(err, IngestError::ReferenceNotFound("data source 999 not found".to_string()));
}

#[test]
fn malformed_envelope_is_rejected() {
    let fx = fixture(IngestSettings::default());
    let payload = object(json!({"calculateDate": "yesterday", "employees": [{"employeeCode": "1"}]}));

    let err = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap_err();

    assert_eq!(err.kind(), "invalid_envelope");
}

#[test]
fn active_extraction_log_is_linked_and_counted() {
    let fx = fixture(IngestSettings::default());
    let source = fx.store.add_data_source("POS export", true).unwrap();
    let log = fx.store.open_extraction_log(source.id).unwrap();
    let payload = object(json!({
        "dataSourceId": source.id.get(),
        "active_directory": [{"username": " JDoe "}, {"username": "jdoe"}, {"username": ""}]
    }));

    let report = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap();

    assert_eq!(report.run.data_source_id, Some(source.id));
    assert_eq!(report.run.extraction_log_id, Some(log.id));
    let log = fx.store.extraction_log(log.id).unwrap().unwrap();
    assert_eq!(log.extracted_count, 3);
    assert_eq!(log.processed_count, 1);
    assert_eq!(log.failed_count, 2);
    assert_eq!(log.status, sellout_core::ExtractionStatus::InProgress);
}

// ============================================================================
// SECTION: Interfering Store
// ============================================================================

/// Store wrapper that disturbs a run at chosen points.
struct InterferingStore {
    inner: InMemoryIngestStore,
    inserts: AtomicUsize,
    /// Bulk insert call (1-based) that fails.
    fail_insert_on: Option<usize>,
    /// Row another run writes right after this run's lookup.
    competing_row: Mutex<Option<(BlockName, EntityRow)>>,
    /// Scheduler log removed before the counters are updated.
    lose_log: bool,
}

impl InterferingStore {
    fn new(inner: InMemoryIngestStore) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
            fail_insert_on: None,
            competing_row: Mutex::new(None),
            lose_log: false,
        }
    }
}

impl EntityStore for InterferingStore {
    fn find_by_keys(&self, block: BlockName, keys: &[String]) -> Result<Vec<EntityRow>, StoreError> {
        let found = self.inner.find_by_keys(block, keys)?;
        if let Some((competing_block, row)) = self.competing_row.lock().unwrap().take() {
            self.inner.insert_rows(competing_block, &[row])?;
        }
        Ok(found)
    }

    fn update_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        self.inner.update_rows(block, rows)
    }

    fn insert_rows(&self, block: BlockName, rows: &[EntityRow]) -> Result<(), StoreError> {
        let call = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_insert_on == Some(call) {
            return Err(StoreError::Io("disk unavailable".to_string()));
        }
        self.inner.insert_rows(block, rows)
    }

    fn count_rows(&self, block: BlockName) -> Result<u64, StoreError> {
        self.inner.count_rows(block)
    }
}

impl ExtractionRunStore for InterferingStore {
    fn insert_run(&self, run: NewExtractionRun) -> Result<ExtractionRun, StoreError> {
        self.inner.insert_run(run)
    }

    fn get_run(&self, id: ExtractionRunId) -> Result<Option<ExtractionRun>, StoreError> {
        self.inner.get_run(id)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>, StoreError> {
        self.inner.list_runs(limit)
    }
}

impl UserDirectory for InterferingStore {
    fn find_user(&self, external_id: &ExternalIdentity) -> Result<Option<User>, StoreError> {
        self.inner.find_user(external_id)
    }
}

impl DataSourceCatalog for InterferingStore {
    fn find_data_source(&self, id: DataSourceId) -> Result<Option<DataSource>, StoreError> {
        self.inner.find_data_source(id)
    }
}

impl ExtractionLogStore for InterferingStore {
    fn find_active_log(&self, id: DataSourceId) -> Result<Option<ExtractionLog>, StoreError> {
        self.inner.find_active_log(id)
    }

    fn add_log_counts(&self, id: ExtractionLogId, counts: LogCounts) -> Result<(), StoreError> {
        if self.lose_log {
            return Err(StoreError::Invalid(format!("extraction log {id} not found")));
        }
        self.inner.add_log_counts(id, counts)
    }
}

fn interfering_service(store: InterferingStore, chunk_size: usize) -> IngestionService {
    IngestionService::new(
        SharedIngestStore::new(Arc::new(store)),
        IngestSettings {
            chunk_size,
            ..IngestSettings::default()
        },
    )
}

// ============================================================================
// SECTION: Partial Commit
// ============================================================================

#[test]
fn persistence_failure_keeps_committed_chunks_and_records_no_run() {
    let inner = InMemoryIngestStore::new();
    inner.add_user(ACTOR, "Extractor", true).unwrap();
    let mut failing = InterferingStore::new(inner.clone());
    failing.fail_insert_on = Some(3);
    let service = interfering_service(failing, 10);
    let records: Vec<Value> = (0 .. 45).map(|i| json!({"storeCode": format!("S{i}")})).collect();
    let payload = object(json!({"store_configuration": records}));

    let err = service.ingest(IngestRequest::new(payload), &ExternalIdentity::new(ACTOR)).unwrap_err();

    let IngestError::Persistence {
        block,
        chunks_completed,
        chunks_total,
        accepted,
        ..
    } = err
    else {
        panic!("expected a persistence error");
    };
    assert_eq!(block, BlockName::StoreConfiguration);
    assert_eq!(chunks_completed, 2);
    assert_eq!(chunks_total, 5);
    assert_eq!(accepted, 20);
    assert_eq!(inner.entities(BlockName::StoreConfiguration).unwrap().len(), 20);
    assert!(inner.list_runs(10).unwrap().is_empty());
}

// ============================================================================
// SECTION: Concurrent Runs
// ============================================================================

#[test]
fn later_insert_wins_over_a_row_written_after_the_lookup() {
    let inner = InMemoryIngestStore::new();
    inner.add_user(ACTOR, "Extractor", true).unwrap();
    let store = InterferingStore::new(inner.clone());
    *store.competing_row.lock().unwrap() = Some((
        BlockName::StoreConfiguration,
        EntityRow::new("A1", object(json!({"storeCode": "A1", "name": "other run"}))),
    ));
    let service = interfering_service(store, 10);
    let payload = object(json!({"store_configuration": [{"storeCode": " a1 ", "name": "this run"}]}));

    let report = service.ingest(IngestRequest::new(payload), &ExternalIdentity::new(ACTOR)).unwrap();

    assert_eq!(report.run.accepted_count, 1);
    assert_eq!(report.inserted, 1);
    let stored = inner.entity(BlockName::StoreConfiguration, "A1").unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("this run")));
    assert_eq!(inner.list_runs(10).unwrap().len(), 1);
}

#[test]
fn lost_extraction_log_keeps_the_recorded_run() {
    let inner = InMemoryIngestStore::new();
    inner.add_user(ACTOR, "Extractor", true).unwrap();
    let source = inner.add_data_source("POS export", true).unwrap();
    let log = inner.open_extraction_log(source.id).unwrap();
    let mut store = InterferingStore::new(inner.clone());
    store.lose_log = true;
    let service = interfering_service(store, 10);
    let payload = object(json!({
        "dataSourceId": source.id.get(),
        "employees": [{"employeeCode": "1"}, {"employeeCode": "2"}]
    }));

    let report = service.ingest(IngestRequest::new(payload), &ExternalIdentity::new(ACTOR)).unwrap();

    assert_eq!(report.status, RunStatus::Recorded);
    assert_eq!(report.run.extraction_log_id, Some(log.id));
    let sync_error = report.log_sync_error.clone().unwrap();
    assert!(sync_error.contains(&format!("extraction log {} not found", log.id)));
    assert_eq!(inner.list_runs(10).unwrap(), vec![report.run]);
    assert_eq!(inner.entities(BlockName::Employees).unwrap().len(), 2);
}

#[test]
fn synced_extraction_log_reports_no_error() {
    let fx = fixture(IngestSettings::default());
    let source = fx.store.add_data_source("POS export", true).unwrap();
    fx.store.open_extraction_log(source.id).unwrap();
    let payload = object(json!({"dataSourceId": source.id.get(), "employees": [{"employeeCode": "1"}]}));

    let report = fx.service.ingest(IngestRequest::new(payload), &fx.actor).unwrap();

    assert!(report.log_sync_error.is_none());
}
