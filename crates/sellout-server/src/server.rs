// crates/sellout-server/src/server.rs
// ============================================================================
// Module: Sellout HTTP Server
// Description: Axum routes for ingestion, run lookup, and health.
// Purpose: Expose the ingestion service over HTTP.
// Dependencies: sellout-core, sellout-config, sellout-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! The store handle and audit sink are built once at startup and shared by
//! every request. Ingestion runs on a blocking thread because the stores are
//! synchronous; chunks inside one run are reconciled strictly in sequence.
//! Every route emits an `ingest_request` audit event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path as PathParam;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::PathRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use sellout_config::SelloutConfig;
use sellout_config::ServerAuditConfig;
use sellout_config::StoreConfig;
use sellout_config::StoreType;
use sellout_core::CalculateDate;
use sellout_core::DecodedBody;
use sellout_core::ExternalIdentity;
use sellout_core::ExtractionRun;
use sellout_core::ExtractionRunId;
use sellout_core::ExtractionRunStore;
use sellout_core::GatewayLimits;
use sellout_core::InMemoryIngestStore;
use sellout_core::IngestReport;
use sellout_core::IngestRequest;
use sellout_core::IngestionService;
use sellout_core::ProcessingDetails;
use sellout_core::SharedIngestStore;
use sellout_store_sqlite::SqliteIngestStore;
use sellout_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::audit::FailureAuditEvent;
use crate::audit::FileAuditSink;
use crate::audit::IngestAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::RequestAuditEvent;
use crate::audit::RequestAuditParams;
use crate::audit::RunAuditEvent;
use crate::audit::StderrAuditSink;
use crate::error::ApiError;
use crate::extract::RawBody;
use crate::extract::resolve_actor;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Ingestion and run listing route.
const EXTRACTED_DATA_ROUTE: &str = "/api/extracted-data";
/// Single run route.
const EXTRACTED_DATA_ITEM_ROUTE: &str = "/api/extracted-data/{id}";
/// Health route.
const HEALTH_ROUTE: &str = "/health";
/// Default number of runs returned by the listing route.
const DEFAULT_LIST_LIMIT: usize = 50;
/// Maximum number of runs returned by the listing route.
const MAX_LIST_LIMIT: usize = 500;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Sellout ingestion HTTP server.
pub struct SelloutServer {
    /// Server configuration.
    config: SelloutConfig,
    /// Shared request state.
    state: AppState,
}

impl SelloutServer {
    /// Builds a server from configuration, opening the configured store and
    /// audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when validation or initialization fails.
    pub fn from_config(config: SelloutConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = build_store(&config.store)?;
        let audit = build_audit_sink(&config.server.audit)?;
        Self::with_parts(config, store, audit)
    }

    /// Builds a server around an existing store and audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the configuration is invalid.
    pub fn with_parts(
        config: SelloutConfig,
        store: SharedIngestStore,
        audit: Arc<dyn IngestAuditSink>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let identity_header = HeaderName::from_bytes(config.server.identity_header.as_bytes())
            .map_err(|_| ServerError::Config("invalid identity header".to_string()))?;
        let state = AppState {
            service: IngestionService::new(store, config.ingest.settings()),
            limits: GatewayLimits {
                max_decompressed_bytes: config.server.max_decompressed_bytes,
            },
            identity_header,
            default_actor: config.server.default_actor.as_deref().map(ExternalIdentity::new),
            audit,
        };
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(EXTRACTED_DATA_ROUTE, post(ingest_extracted_data).get(list_extracted_data))
            .route(EXTRACTED_DATA_ITEM_ROUTE, get(get_extracted_data))
            .route(HEALTH_ROUTE, get(health))
            .layer(DefaultBodyLimit::max(self.config.server.max_body_bytes))
            .with_state(self.state.clone())
    }

    /// Binds the configured address and serves requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|_| ServerError::Transport("http bind failed".to_string()))?;
        self.serve_with_listener(listener).await
    }

    /// Serves requests on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when serving fails.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        emit_default_actor_warning(&self.config);
        let app = self.router();
        axum::serve(listener, app)
            .await
            .map_err(|_| ServerError::Transport("http server failed".to_string()))
    }
}

/// Builds the ingestion store from configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the store cannot be opened.
pub fn build_store(config: &StoreConfig) -> Result<SharedIngestStore, ServerError> {
    let store = match config.store_type {
        StoreType::Memory => SharedIngestStore::from_store(InMemoryIngestStore::new()),
        StoreType::Sqlite => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| ServerError::Config("sqlite store requires path".to_string()))?;
            let sqlite_config = SqliteStoreConfig {
                path,
                busy_timeout_ms: config.busy_timeout_ms,
                journal_mode: config.journal_mode,
                sync_mode: config.sync_mode,
            };
            let store = SqliteIngestStore::new(&sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedIngestStore::from_store(store)
        }
    };
    Ok(store)
}

/// Builds the audit sink from configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the audit file cannot be opened.
pub fn build_audit_sink(
    config: &ServerAuditConfig,
) -> Result<Arc<dyn IngestAuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path.trim()))
                .map_err(|err| ServerError::Init(format!("audit log: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Warns when requests without an identity header are attributed to a
/// configured actor.
fn emit_default_actor_warning(config: &SelloutConfig) {
    if let Some(actor) = &config.server.default_actor {
        let _ = writeln!(
            io::stderr(),
            "sellout-server: WARNING: requests without {} are attributed to '{actor}'",
            config.server.identity_header
        );
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct AppState {
    /// Ingestion entry point.
    service: IngestionService,
    /// Decompression limits.
    limits: GatewayLimits,
    /// Header carrying the caller identity.
    identity_header: HeaderName,
    /// Identity used when the header is absent.
    default_actor: Option<ExternalIdentity>,
    /// Audit sink.
    audit: Arc<dyn IngestAuditSink>,
}

impl AppState {
    /// Resolves the caller identity for a request.
    fn actor(&self, headers: &HeaderMap) -> Option<ExternalIdentity> {
        resolve_actor(headers, &self.identity_header, self.default_actor.as_ref())
    }

    /// Records the request event and turns the outcome into a response.
    fn finish<T: IntoResponse>(
        &self,
        params: RequestAuditBase,
        outcome: Result<T, ApiError>,
    ) -> Response {
        let (status, error_kind, response) = match outcome {
            Ok(value) => {
                let response = value.into_response();
                (response.status(), None, response)
            }
            Err(error) => (error.status, Some(error.kind), error.into_response()),
        };
        self.audit.record_request(&RequestAuditEvent::new(RequestAuditParams {
            method: params.method.to_string(),
            route: params.route,
            status: status.as_u16(),
            request_bytes: params.request_bytes,
            encoding: params.encoding,
            actor: params.actor.map(|actor| actor.as_str().to_string()),
            error_kind,
            latency_ms: params.started.elapsed().as_millis(),
        }));
        response
    }
}

/// Request facts gathered before the outcome is known.
struct RequestAuditBase {
    /// HTTP method.
    method: Method,
    /// Route template.
    route: &'static str,
    /// Body size.
    request_bytes: usize,
    /// Body decoding path.
    encoding: Option<&'static str>,
    /// Caller identity.
    actor: Option<ExternalIdentity>,
    /// Request start.
    started: Instant,
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Run summary returned by the ingestion route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedDataView {
    /// Run id.
    id: ExtractionRunId,
    /// Input records.
    record_count: u64,
    /// Whether a handler processed the payload.
    is_processed: bool,
    /// Processing time.
    processed_date: Option<String>,
    /// Outcome metrics.
    processing_details: Option<ProcessingDetails>,
    /// Block processed.
    data_name: String,
    /// Calculation date.
    calculate_date: Option<CalculateDate>,
}

impl From<ExtractionRun> for ExtractedDataView {
    fn from(run: ExtractionRun) -> Self {
        Self {
            id: run.id,
            record_count: run.record_count,
            is_processed: run.is_processed,
            processed_date: run.processed_date,
            processing_details: run.processing_details,
            data_name: run.data_name,
            calculate_date: run.calculate_date,
        }
    }
}

/// Ingestion response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    /// Summary message.
    message: String,
    /// Recorded run.
    extracted_data: ExtractedDataView,
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            message: report.message,
            extracted_data: ExtractedDataView::from(report.run),
        }
    }
}

/// Envelope for run lookups.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunEnvelope<T> {
    /// Run or runs.
    extracted_data: T,
}

/// Listing query parameters.
#[derive(Debug, Deserialize)]
struct ListQuery {
    /// Maximum runs to return.
    limit: Option<usize>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /api/extracted-data`.
async fn ingest_extracted_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<RawBody, ApiError>,
) -> Response {
    let started = Instant::now();
    let actor = state.actor(&headers);
    let request_bytes = body.as_ref().map_or_else(|_| content_length(&headers), RawBody::len);
    let mut encoding = None;
    // Nothing is decoded until the caller is known.
    let outcome = match (&actor, body) {
        (None, _) => Err(ApiError::unauthenticated(state.identity_header.as_str())),
        (Some(_), Err(error)) => Err(error),
        (Some(actor), Ok(raw)) => match raw.decode(state.limits).await {
            Err(error) => Err(error),
            Ok(decoded) => {
                encoding = Some(decoded.encoding.as_str());
                run_ingest(&state, decoded, actor.clone())
                    .await
                    .map(|response| (StatusCode::CREATED, Json(response)))
            }
        },
    };
    state.finish(
        RequestAuditBase {
            method: Method::POST,
            route: EXTRACTED_DATA_ROUTE,
            request_bytes,
            encoding,
            actor,
            started,
        },
        outcome,
    )
}

/// Runs one ingestion on a blocking thread and audits the outcome.
async fn run_ingest(
    state: &AppState,
    decoded: DecodedBody,
    actor: ExternalIdentity,
) -> Result<IngestResponse, ApiError> {
    let service = state.service.clone();
    let audit = Arc::clone(&state.audit);
    tokio::task::spawn_blocking(move || {
        let request = IngestRequest::new(decoded.into_object());
        match service.ingest(request, &actor) {
            Ok(report) => {
                audit.record_run(&RunAuditEvent::from_report(&report, &actor));
                Ok(IngestResponse::from(report))
            }
            Err(error) => {
                audit.record_failure(&FailureAuditEvent::from_error(&error, &actor));
                Err(ApiError::from(&error))
            }
        }
    })
    .await
    .map_err(|_| ApiError::internal("ingestion task failed"))?
}

/// `GET /api/extracted-data/{id}`.
async fn get_extracted_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<PathParam<i64>, PathRejection>,
) -> Response {
    let started = Instant::now();
    let outcome = match id {
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        Ok(PathParam(id)) => {
            let service = state.service.clone();
            let run_id = ExtractionRunId::new(id);
            tokio::task::spawn_blocking(move || service.store().get_run(run_id))
                .await
                .map_err(|_| ApiError::internal("lookup task failed"))
                .and_then(|result| result.map_err(|err| ApiError::internal(err.to_string())))
                .and_then(|run| {
                    run.map(|run| Json(RunEnvelope {
                        extracted_data: run,
                    }))
                        .ok_or_else(|| ApiError::not_found(format!("extracted data {id} not found")))
                })
        }
    };
    state.finish(read_audit(&state, &headers, EXTRACTED_DATA_ITEM_ROUTE, started), outcome)
}

/// `GET /api/extracted-data?limit=N`.
async fn list_extracted_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let outcome = match query {
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        Ok(Query(query)) => match query.limit.unwrap_or(DEFAULT_LIST_LIMIT) {
            limit @ 1 ..= MAX_LIST_LIMIT => {
                let service = state.service.clone();
                tokio::task::spawn_blocking(move || service.store().list_runs(limit))
                    .await
                    .map_err(|_| ApiError::internal("listing task failed"))
                    .and_then(|result| result.map_err(|err| ApiError::internal(err.to_string())))
                    .map(|runs| {
                        Json(RunEnvelope {
                            extracted_data: runs,
                        })
                    })
            }
            _ => Err(ApiError::bad_request(format!("limit must be between 1 and {MAX_LIST_LIMIT}"))),
        },
    };
    state.finish(read_audit(&state, &headers, EXTRACTED_DATA_ROUTE, started), outcome)
}

/// `GET /health`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Audit facts for read routes.
fn read_audit(
    state: &AppState,
    headers: &HeaderMap,
    route: &'static str,
    started: Instant,
) -> RequestAuditBase {
    RequestAuditBase {
        method: Method::GET,
        route,
        request_bytes: 0,
        encoding: None,
        actor: state.actor(headers),
        started,
    }
}

/// Declared body size, used when the body could not be read.
fn content_length(headers: &HeaderMap) -> usize {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
