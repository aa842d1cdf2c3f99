// crates/sellout-server/src/extract.rs
// ============================================================================
// Module: Request Extraction
// Description: Body decoding extractor and caller identity resolution.
// Purpose: Turn raw HTTP requests into decoded payloads and actors.
// Dependencies: sellout-core, axum, tokio
// ============================================================================

//! ## Overview
//! [`RawBody`] buffers the body under the router's body limit without
//! interpreting it. The handler resolves the caller first and only then calls
//! [`RawBody::decode`], which runs the decompression gateway on a blocking
//! thread so gzip bodies never stall the async workers. [`resolve_actor`]
//! reads the identity header set by the authenticating proxy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::body::Bytes;
use axum::extract::FromRequest;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::header::CONTENT_TYPE;
use sellout_core::DecodedBody;
use sellout_core::ExternalIdentity;
use sellout_core::GatewayLimits;
use sellout_core::normalize_body;

use crate::error::ApiError;

// ============================================================================
// SECTION: Raw Body
// ============================================================================

/// Buffered request body, not yet decoded.
#[derive(Debug, Clone)]
pub struct RawBody {
    /// Body as received.
    bytes: Bytes,
    /// Declared content type.
    content_type: Option<String>,
}

impl RawBody {
    /// Body size as received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true when the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Runs the decompression gateway on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the body cannot be decoded.
    pub async fn decode(self, limits: GatewayLimits) -> Result<DecodedBody, ApiError> {
        let Self {
            bytes,
            content_type,
        } = self;
        let body = tokio::task::spawn_blocking(move || {
            normalize_body(content_type.as_deref(), &bytes, &limits)
        })
        .await
        .map_err(|_| ApiError::internal("body decoding task failed"))??;
        Ok(body)
    }
}

impl<S> FromRequest<S> for RawBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::from_body_rejection(&rejection))?;
        Ok(Self {
            bytes,
            content_type,
        })
    }
}

// ============================================================================
// SECTION: Actor
// ============================================================================

/// Resolves the caller identity from `header`, falling back to `fallback`
/// when the header is absent or blank.
#[must_use]
pub fn resolve_actor(
    headers: &HeaderMap,
    header: &HeaderName,
    fallback: Option<&ExternalIdentity>,
) -> Option<ExternalIdentity> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ExternalIdentity::new)
        .or_else(|| fallback.cloned())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
