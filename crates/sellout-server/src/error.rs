// crates/sellout-server/src/error.rs
// ============================================================================
// Module: HTTP Error Mapping
// Description: Maps ingestion and gateway errors to HTTP responses.
// Purpose: Keep the status taxonomy in one place.
// Dependencies: sellout-core, axum, serde
// ============================================================================

//! ## Overview
//! Every failure leaves the server as `{ "error": <kind>, "message": <text> }`
//! with a status chosen by error class: client input 400, missing identity
//! 401, unknown references 404, store failures 500.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use sellout_core::GatewayError;
use sellout_core::IngestError;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// HTTP error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Stable error kind.
    pub kind: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Serialized error body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    /// Error kind.
    error: &'a str,
    /// Error description.
    message: &'a str,
}

impl ApiError {
    /// Creates an error response.
    #[must_use]
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    /// No caller identity was supplied.
    #[must_use]
    pub fn unauthenticated(header: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", format!("missing {header} header"))
    }

    /// Requested resource does not exist.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Query or path parameters are invalid.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    /// Unexpected server failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Maps a body read failure, including the body size limit.
    #[must_use]
    pub fn from_body_rejection(rejection: &BytesRejection) -> Self {
        let status = rejection.status();
        let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "payload_format_error"
        };
        Self::new(status, kind, rejection.body_text())
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.kind(), error.to_string())
    }
}

impl From<&IngestError> for ApiError {
    fn from(error: &IngestError) -> Self {
        let status = match error {
            IngestError::ReferenceNotFound(_) => StatusCode::NOT_FOUND,
            IngestError::InvalidEnvelope(_) | IngestError::Classification(_) => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Persistence {
                ..
            }
            | IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.kind(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
