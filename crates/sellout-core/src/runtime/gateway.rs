// crates/sellout-core/src/runtime/gateway.rs
// ============================================================================
// Module: Decompression Gateway
// Description: Normalizes gzip, base64-gzip, and plain JSON bodies into JSON.
// Purpose: Give the classifier a parsed object regardless of transfer encoding.
// Dependencies: base64, flate2, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Producers send extracted data three ways. The paths are checked in order
//! and are mutually exclusive:
//!
//! 1. A gzip content type: the raw body is gunzipped and parsed.
//! 2. A JSON object carrying a `gzipBase64` string: the field is base64
//!    decoded, gunzipped, and parsed. The result replaces the whole body.
//! 3. Anything else: the body is parsed as JSON and passed through.
//!
//! Decompression is bounded by [`GatewayLimits::max_decompressed_bytes`] so a
//! small compressed body cannot expand without limit. The result must be a
//! JSON object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::GeneralPurpose;
use base64::engine::GeneralPurposeConfig;
use flate2::read::MultiGzDecoder;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name of the JSON field carrying base64-encoded gzip bytes.
pub const GZIP_BASE64_FIELD: &str = "gzipBase64";
/// Default ceiling on decompressed payload size (256 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: usize = 256 * 1024 * 1024;
/// Gzip member magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// Base64 engine accepting padded and unpadded input.
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Size limits applied while decoding a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayLimits {
    /// Maximum number of bytes a gzip stream may expand to.
    pub max_decompressed_bytes: usize,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
        }
    }
}

/// Path the gateway took for a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// Raw gzip body.
    Gzip,
    /// JSON body with an embedded base64 gzip field.
    Base64Gzip,
    /// Plain JSON body.
    Json,
}

impl BodyEncoding {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Base64Gzip => "base64_gzip",
            Self::Json => "json",
        }
    }
}

/// Parsed body and the path used to obtain it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody {
    /// Parsed JSON object.
    pub value: Value,
    /// Decoding path.
    pub encoding: BodyEncoding,
}

impl DecodedBody {
    /// Returns the payload object. The gateway only builds object values.
    #[must_use]
    pub fn into_object(self) -> Map<String, Value> {
        match self.value {
            Value::Object(object) => object,
            _ => Map::new(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Body decoding failures. All of them are client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Body has no bytes.
    #[error("request body is empty")]
    EmptyBody,
    /// Raw gzip body could not be decompressed.
    #[error("could not decompress gzip content")]
    Decompression,
    /// Decompressed gzip body is not JSON.
    #[error("decompressed content is not valid JSON")]
    DecompressedJson,
    /// `gzipBase64` field is not valid base64 text.
    #[error("could not decode base64 content")]
    Base64,
    /// Base64-decoded bytes could not be decompressed.
    #[error("could not decompress base64 gzip content")]
    Base64Decompression,
    /// Base64-decoded and decompressed bytes are not JSON.
    #[error("decompressed base64 content is not valid JSON")]
    Base64Json,
    /// Decompressed content exceeded the configured ceiling.
    #[error("decompressed content exceeds {max_bytes} bytes")]
    TooLarge {
        /// Configured ceiling.
        max_bytes: usize,
    },
    /// Plain body is not JSON.
    #[error("request body is not valid JSON")]
    BodyJson,
    /// Decoded payload is valid JSON but not an object.
    #[error("payload must be a JSON object")]
    NotAnObject,
}

impl GatewayError {
    /// Returns the error taxonomy label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decompression | Self::Base64Decompression | Self::Base64 | Self::TooLarge {
                ..
            } => "decompression_error",
            Self::EmptyBody
            | Self::DecompressedJson
            | Self::Base64Json
            | Self::BodyJson
            | Self::NotAnObject => "payload_format_error",
        }
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// Decodes an inbound body into a JSON object.
///
/// # Errors
///
/// Returns [`GatewayError`] when the body cannot be decompressed, decoded, or
/// parsed, or when the result is not a JSON object.
pub fn normalize_body(
    content_type: Option<&str>,
    body: &[u8],
    limits: &GatewayLimits,
) -> Result<DecodedBody, GatewayError> {
    if body.is_empty() {
        return Err(GatewayError::EmptyBody);
    }
    if declares_gzip(content_type, body) {
        let bytes = gunzip(body, limits.max_decompressed_bytes)
            .map_err(|err| err.unwrap_or(GatewayError::Decompression))?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|_| GatewayError::DecompressedJson)?;
        return finish(value, BodyEncoding::Gzip);
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| GatewayError::BodyJson)?;
    let Some(encoded) = value.as_object().and_then(|object| object.get(GZIP_BASE64_FIELD)) else {
        return finish(value, BodyEncoding::Json);
    };
    let encoded = encoded.as_str().ok_or(GatewayError::Base64)?;
    let compressed = decode_base64(encoded)?;
    let bytes = gunzip(&compressed, limits.max_decompressed_bytes)
        .map_err(|err| err.unwrap_or(GatewayError::Base64Decompression))?;
    let inner: Value = serde_json::from_slice(&bytes).map_err(|_| GatewayError::Base64Json)?;
    finish(inner, BodyEncoding::Base64Gzip)
}

/// Returns true when the content type names a gzip body.
#[must_use]
pub fn is_gzip_content_type(content_type: Option<&str>) -> bool {
    matches!(
        media_type(content_type).as_deref(),
        Some("application/gzip" | "application/x-gzip")
    )
}

/// Gzip is declared by content type; generic binary bodies count when they
/// start with the gzip magic bytes.
fn declares_gzip(content_type: Option<&str>, body: &[u8]) -> bool {
    if is_gzip_content_type(content_type) {
        return true;
    }
    media_type(content_type).as_deref() == Some("application/octet-stream")
        && body.starts_with(&GZIP_MAGIC)
}

/// Lowercased media type without parameters.
fn media_type(content_type: Option<&str>) -> Option<String> {
    let raw = content_type?;
    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

/// Decodes base64 text, ignoring surrounding whitespace and padding.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, GatewayError> {
    let compact: String = encoded.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(GatewayError::Base64);
    }
    BASE64_LENIENT.decode(compact.as_bytes()).map_err(|_| GatewayError::Base64)
}

/// Gunzips bytes with a size ceiling. `Err(None)` means the stream itself
/// was malformed; the caller picks the path-specific error.
fn gunzip(bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>, Option<GatewayError>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Err(None);
    }
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = MultiGzDecoder::new(bytes).take(limit);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|_| None::<GatewayError>)?;
    if out.len() > max_bytes {
        return Err(Some(GatewayError::TooLarge {
            max_bytes,
        }));
    }
    Ok(out)
}

/// Ensures the decoded value is an object.
fn finish(value: Value, encoding: BodyEncoding) -> Result<DecodedBody, GatewayError> {
    if !value.is_object() {
        return Err(GatewayError::NotAnObject);
    }
    Ok(DecodedBody {
        value,
        encoding,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::io::Write;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::json;

    use super::BodyEncoding;
    use super::GatewayError;
    use super::GatewayLimits;
    use super::normalize_body;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzip_body_round_trips() {
        let payload = json!({"store_configuration": [{"storeCode": " A1 "}]});
        let body = gzip(payload.to_string().as_bytes());
        let decoded =
            normalize_body(Some("application/gzip"), &body, &GatewayLimits::default()).unwrap();
        assert_eq!(decoded.value, payload);
        assert_eq!(decoded.encoding, BodyEncoding::Gzip);
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let body = gzip(b"{\"a\":1}");
        let decoded = normalize_body(
            Some("Application/X-Gzip; charset=binary"),
            &body,
            &GatewayLimits::default(),
        )
        .unwrap();
        assert_eq!(decoded.value, json!({"a": 1}));
    }

    #[test]
    fn malformed_gzip_is_rejected() {
        let err = normalize_body(Some("application/gzip"), b"definitely not gzip", &GatewayLimits::default())
            .unwrap_err();
        assert_eq!(err, GatewayError::Decompression);
        assert_eq!(err.to_string(), "could not decompress gzip content");
    }

    #[test]
    fn truncated_gzip_is_rejected() {
        let body = gzip(b"{\"employees\":[{\"employeeCode\":\"1\"}]}");
        let truncated = &body[..body.len() / 2];
        let err =
            normalize_body(Some("application/gzip"), truncated, &GatewayLimits::default()).unwrap_err();
        assert_eq!(err, GatewayError::Decompression);
    }

    #[test]
    fn gzip_of_non_json_is_rejected() {
        let body = gzip(b"<xml/>");
        let err = normalize_body(Some("application/gzip"), &body, &GatewayLimits::default()).unwrap_err();
        assert_eq!(err, GatewayError::DecompressedJson);
    }

    #[test]
    fn base64_field_replaces_body() {
        let inner = json!({"dataContent": {"employees": [{"employeeCode": "7"}]}});
        let encoded = STANDARD.encode(gzip(inner.to_string().as_bytes()));
        let body = json!({"gzipBase64": encoded, "ignored": true}).to_string();
        let decoded =
            normalize_body(Some("application/json"), body.as_bytes(), &GatewayLimits::default())
                .unwrap();
        assert_eq!(decoded.value, inner);
        assert_eq!(decoded.encoding, BodyEncoding::Base64Gzip);
    }

    #[test]
    fn base64_errors_name_the_base64_path() {
        let limits = GatewayLimits::default();
        let bad_text = json!({"gzipBase64": "***"}).to_string();
        assert_eq!(
            normalize_body(Some("application/json"), bad_text.as_bytes(), &limits).unwrap_err(),
            GatewayError::Base64
        );
        let not_gzip = json!({"gzipBase64": STANDARD.encode(b"plain")}).to_string();
        assert_eq!(
            normalize_body(Some("application/json"), not_gzip.as_bytes(), &limits).unwrap_err(),
            GatewayError::Base64Decompression
        );
        let not_json = json!({"gzipBase64": STANDARD.encode(gzip(b"nope"))}).to_string();
        assert_eq!(
            normalize_body(Some("application/json"), not_json.as_bytes(), &limits).unwrap_err(),
            GatewayError::Base64Json
        );
    }

    #[test]
    fn plain_json_passes_through() {
        let payload = json!({"dataContent": {"store_configuration": []}, "dataSourceId": 3});
        let decoded = normalize_body(
            Some("application/json"),
            payload.to_string().as_bytes(),
            &GatewayLimits::default(),
        )
        .unwrap();
        assert_eq!(decoded.value, payload);
        assert_eq!(decoded.encoding, BodyEncoding::Json);
    }

    #[test]
    fn oversized_decompression_is_rejected() {
        let body = gzip(&vec![b' '; 4096]);
        let limits = GatewayLimits {
            max_decompressed_bytes: 1024,
        };
        let err = normalize_body(Some("application/gzip"), &body, &limits).unwrap_err();
        assert_eq!(
            err,
            GatewayError::TooLarge {
                max_bytes: 1024
            }
        );
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = normalize_body(None, b"[1,2,3]", &GatewayLimits::default()).unwrap_err();
        assert_eq!(err, GatewayError::NotAnObject);
        let err = normalize_body(None, b"", &GatewayLimits::default()).unwrap_err();
        assert_eq!(err, GatewayError::EmptyBody);
    }
}
