// crates/sellout-core/src/runtime/classifier.rs
// ============================================================================
// Module: Payload Classifier
// Description: Envelope parsing and block selection for decoded payloads.
// Purpose: Pick exactly one data domain per ingestion call.
// Dependencies: crate::core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Blocks live under `dataContent` when the producer wraps them in an
//! envelope, otherwise at the payload root. The classifier walks
//! [`BlockName::REGISTRY`] in order and claims the first block whose key is
//! present with a truthy value. Later blocks in the same payload are ignored.
//! A claimed block that is not a non-empty array is a classification error;
//! a payload with no known block is reported as [`Classification::Unclassified`]
//! and the caller decides what to do with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::BlockName;
use crate::core::CalculateDate;
use crate::core::DataSourceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Envelope field wrapping the blocks.
pub const DATA_CONTENT_FIELD: &str = "dataContent";
/// Envelope field naming the data source.
pub const DATA_SOURCE_FIELD: &str = "dataSourceId";
/// Envelope field carrying the calculation date.
pub const CALCULATE_DATE_FIELD: &str = "calculateDate";
/// Envelope field carrying the producer extraction timestamp.
pub const EXTRACTION_DATE_FIELD: &str = "extractionDate";

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Envelope metadata sent next to the blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestEnvelope {
    /// Producer extraction timestamp, passed through verbatim.
    pub extraction_date: Option<String>,
    /// Declared data source.
    pub data_source_id: Option<DataSourceId>,
    /// Calculation date of the batch.
    pub calculate_date: Option<CalculateDate>,
}

/// Envelope field errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// `dataSourceId` is not an integer.
    #[error("dataSourceId must be an integer")]
    DataSource,
    /// `calculateDate` is not a calendar date.
    #[error("{0}")]
    CalculateDate(String),
}

impl IngestEnvelope {
    /// Reads envelope fields from a decoded payload. Absent and null fields
    /// are treated the same.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when a present field has the wrong shape.
    pub fn read(payload: &Map<String, Value>) -> Result<Self, EnvelopeError> {
        let data_source_id = match payload.get(DATA_SOURCE_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => {
                Some(DataSourceId::new(number.as_i64().ok_or(EnvelopeError::DataSource)?))
            }
            Some(Value::String(text)) if !text.trim().is_empty() => Some(DataSourceId::new(
                text.trim().parse::<i64>().map_err(|_| EnvelopeError::DataSource)?,
            )),
            Some(Value::String(_)) => None,
            Some(_) => return Err(EnvelopeError::DataSource),
        };
        let calculate_date = match payload.get(CALCULATE_DATE_FIELD) {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(
                CalculateDate::parse(text)
                    .map_err(|err| EnvelopeError::CalculateDate(err.to_string()))?,
            ),
            None | Some(Value::Null | Value::String(_)) => None,
            Some(other) => {
                return Err(EnvelopeError::CalculateDate(format!(
                    "invalid calculate date '{other}', expected YYYY-MM-DD"
                )));
            }
        };
        let extraction_date = payload
            .get(EXTRACTION_DATE_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Ok(Self {
            extraction_date,
            data_source_id,
            calculate_date,
        })
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Block selected for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedBlock {
    /// Selected block.
    pub block: BlockName,
    /// Raw records of the block, in producer order.
    pub records: Vec<Value>,
}

/// Classifier result.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A known block was selected.
    Block(ClassifiedBlock),
    /// No known block is present.
    Unclassified,
}

/// Classification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// Selected block is not a non-empty array.
    #[error("block '{0}' contains no records")]
    EmptyBlock(BlockName),
    /// No known block is present and the caller rejects unclassified data.
    #[error("payload contains no known data block")]
    NoKnownBlock,
}

/// Selects the block to reconcile from a decoded payload.
///
/// # Errors
///
/// Returns [`ClassificationError::EmptyBlock`] when the selected block is not
/// a non-empty array.
pub fn classify(payload: &Map<String, Value>) -> Result<Classification, ClassificationError> {
    let content = block_container(payload);
    for block in BlockName::REGISTRY {
        let Some(value) = content.get(block.as_str()) else {
            continue;
        };
        if !is_truthy(value) {
            continue;
        }
        return match value {
            Value::Array(records) if !records.is_empty() => {
                Ok(Classification::Block(ClassifiedBlock {
                    block,
                    records: records.clone(),
                }))
            }
            _ => Err(ClassificationError::EmptyBlock(block)),
        };
    }
    Ok(Classification::Unclassified)
}

/// Returns the object holding the blocks: `dataContent` when it is an
/// object, the payload root otherwise.
fn block_container(payload: &Map<String, Value>) -> &Map<String, Value> {
    match payload.get(DATA_CONTENT_FIELD) {
        Some(Value::Object(content)) => content,
        _ => payload,
    }
}

/// Loose truthiness used by producers: empty arrays and objects count as
/// present, null/false/zero/empty strings do not.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
