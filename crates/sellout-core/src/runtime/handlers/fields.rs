// crates/sellout-core/src/runtime/handlers/fields.rs
// ============================================================================
// Module: Field Normalization
// Description: Loose field readers shared by the domain handlers.
// Purpose: Absorb producer inconsistencies in codes, ids, amounts, and dates.
// Dependencies: crate::core, serde_json
// ============================================================================

//! Producers send codes as strings or numbers, pad them with whitespace and
//! leading zeros, and quote amounts. These helpers read one field at a time
//! and report failures as [`RowError`] naming the field.

use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::core::CalculateDate;
use crate::runtime::engine::RowError;

/// Reads a required text-like field (string or number), trimmed.
pub(crate) fn required_text(
    record: &Map<String, Value>,
    field: &'static str,
) -> Result<String, RowError> {
    let text = match record.get(field) {
        None | Some(Value::Null) => return Err(RowError::MissingField(field)),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(_) => return Err(RowError::NotText(field)),
    };
    if text.is_empty() {
        return Err(RowError::MissingField(field));
    }
    Ok(text)
}

/// Normalizes an employee code: trimmed, leading zeros removed from
/// digit-only codes.
pub(crate) fn employee_code(
    record: &Map<String, Value>,
    field: &'static str,
) -> Result<String, RowError> {
    let code = required_text(record, field)?;
    if code.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = code.trim_start_matches('0');
        return Ok(if stripped.is_empty() { "0".to_string() } else { stripped.to_string() });
    }
    Ok(code)
}

/// Normalizes a store code: trimmed and uppercased.
pub(crate) fn store_code(
    record: &Map<String, Value>,
    field: &'static str,
) -> Result<String, RowError> {
    Ok(required_text(record, field)?.to_uppercase())
}

/// Reads a required integer id from a number or a digit string.
pub(crate) fn numeric_id(record: &Map<String, Value>, field: &'static str) -> Result<i64, RowError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(RowError::MissingField(field)),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).and_then(whole_to_i64))
            .ok_or(RowError::NotNumeric(field)),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(RowError::MissingField(field));
            }
            trimmed.parse::<i64>().map_err(|_| RowError::NotNumeric(field))
        }
        Some(_) => Err(RowError::NotNumeric(field)),
    }
}

/// Reads an optional amount from a number or a numeric string. Blank
/// strings read as absent.
pub(crate) fn amount(record: &Map<String, Value>, field: &'static str) -> Result<Option<Number>, RowError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(Some(number.clone())),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            if let Ok(integer) = trimmed.parse::<i64>() {
                return Ok(Some(Number::from(integer)));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Some)
                .ok_or(RowError::NotNumeric(field))
        }
        Some(_) => Err(RowError::NotNumeric(field)),
    }
}

/// Reads the record calculation date, falling back to the batch date.
pub(crate) fn calculate_date(
    record: &Map<String, Value>,
    field: &'static str,
    fallback: Option<CalculateDate>,
) -> Result<CalculateDate, RowError> {
    match record.get(field) {
        None | Some(Value::Null) => fallback.ok_or(RowError::MissingField(field)),
        Some(Value::String(text)) if text.trim().is_empty() => {
            fallback.ok_or(RowError::MissingField(field))
        }
        Some(Value::String(text)) => {
            CalculateDate::parse(text).map_err(|_| RowError::InvalidDate(field))
        }
        Some(_) => Err(RowError::InvalidDate(field)),
    }
}

/// Rewrites every listed amount field present in `record` as a JSON number.
pub(crate) fn coerce_amounts(
    record: &mut Map<String, Value>,
    fields: &[&'static str],
) -> Result<(), RowError> {
    for field in fields {
        if let Some(number) = amount(record, field)? {
            record.insert((*field).to_string(), Value::Number(number));
        }
    }
    Ok(())
}

/// Converts a whole float to an integer when it is in range.
fn whole_to_i64(value: f64) -> Option<i64> {
    let text = format!("{value:.0}");
    text.parse::<i64>().ok()
}
