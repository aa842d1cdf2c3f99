// crates/sellout-core/src/runtime/handlers/masters.rs
// ============================================================================
// Module: Master Data Handlers
// Description: Employees, directory accounts, and store configuration.
// Purpose: Key master data by normalized codes.
// Dependencies: crate::runtime::handlers, serde_json
// ============================================================================

use serde_json::Map;
use serde_json::Value;

use super::DomainRecord;
use super::HandlerContext;
use super::fields;
use crate::core::BlockName;
use crate::runtime::engine::RowError;

const EMPLOYEE_CODE: &str = "employeeCode";
const STORE_CODE: &str = "storeCode";
const USERNAME: &str = "username";
const EMAIL: &str = "email";

// ============================================================================
// SECTION: Employees
// ============================================================================

/// Employee master record keyed by employee code.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRecord {
    /// Normalized employee code.
    pub employee_code: String,
    /// Assigned store, normalized when present.
    pub store_code: Option<String>,
    /// Remaining producer fields.
    pub fields: Map<String, Value>,
}

impl DomainRecord for EmployeeRecord {
    const BLOCK: BlockName = BlockName::Employees;

    fn natural_key(record: &Map<String, Value>, _: &HandlerContext) -> Result<String, RowError> {
        fields::employee_code(record, EMPLOYEE_CODE)
    }

    fn decode(record: Map<String, Value>, _: &HandlerContext) -> Result<Self, RowError> {
        let employee_code = fields::employee_code(&record, EMPLOYEE_CODE)?;
        let store_code = optional_store_code(&record)?;
        Ok(Self {
            employee_code,
            store_code,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(EMPLOYEE_CODE.to_string(), Value::String(self.employee_code));
        if let Some(store_code) = self.store_code {
            document.insert(STORE_CODE.to_string(), Value::String(store_code));
        }
        document
    }
}

/// Reads a store code that may be absent.
fn optional_store_code(record: &Map<String, Value>) -> Result<Option<String>, RowError> {
    match record.get(STORE_CODE) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(_) => fields::store_code(record, STORE_CODE).map(Some),
    }
}

// ============================================================================
// SECTION: Active Directory
// ============================================================================

/// Directory account keyed by lowercase username.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDirectoryRecord {
    /// Trimmed, lowercased username.
    pub username: String,
    /// Remaining producer fields.
    pub fields: Map<String, Value>,
}

impl DomainRecord for ActiveDirectoryRecord {
    const BLOCK: BlockName = BlockName::ActiveDirectory;

    fn natural_key(record: &Map<String, Value>, _: &HandlerContext) -> Result<String, RowError> {
        Ok(fields::required_text(record, USERNAME)?.to_lowercase())
    }

    fn decode(mut record: Map<String, Value>, context: &HandlerContext) -> Result<Self, RowError> {
        let username = Self::natural_key(&record, context)?;
        if let Some(Value::String(email)) = record.get_mut(EMAIL) {
            *email = email.trim().to_lowercase();
        }
        Ok(Self {
            username,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(USERNAME.to_string(), Value::String(self.username));
        document
    }
}

// ============================================================================
// SECTION: Store Configuration
// ============================================================================

/// Store configuration keyed by uppercase store code.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfigurationRecord {
    /// Trimmed, uppercased store code.
    pub store_code: String,
    /// Remaining producer fields.
    pub fields: Map<String, Value>,
}

impl DomainRecord for StoreConfigurationRecord {
    const BLOCK: BlockName = BlockName::StoreConfiguration;

    fn natural_key(record: &Map<String, Value>, _: &HandlerContext) -> Result<String, RowError> {
        fields::store_code(record, STORE_CODE)
    }

    fn decode(mut record: Map<String, Value>, _: &HandlerContext) -> Result<Self, RowError> {
        let store_code = fields::store_code(&record, STORE_CODE)?;
        fields::coerce_amounts(&mut record, &["goalAmount", "minimumCompliance"])?;
        Ok(Self {
            store_code,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(STORE_CODE.to_string(), Value::String(self.store_code));
        document
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::Value;
    use serde_json::json;

    use super::ActiveDirectoryRecord;
    use super::EmployeeRecord;
    use super::StoreConfigurationRecord;
    use crate::runtime::engine::RowError;
    use crate::runtime::handlers::DomainRecord;
    use crate::runtime::handlers::HandlerContext;

    fn decode<D: DomainRecord>(value: Value) -> Result<Value, RowError> {
        let object = value.as_object().cloned().unwrap();
        D::decode(object, &HandlerContext::default()).map(|r| Value::Object(r.into_document()))
    }

    #[test]
    fn employee_document_is_normalized() {
        let doc = decode::<EmployeeRecord>(json!({
            "employeeCode": "0042", "storeCode": " s01 ", "name": "Ana"
        }))
        .unwrap();
        assert_eq!(doc, json!({"employeeCode": "42", "storeCode": "S01", "name": "Ana"}));
    }

    #[test]
    fn usernames_and_emails_are_lowercased() {
        let doc = decode::<ActiveDirectoryRecord>(json!({
            "username": " JDoe ", "email": " JDoe@Example.COM "
        }))
        .unwrap();
        assert_eq!(doc, json!({"username": "jdoe", "email": "jdoe@example.com"}));
    }

    #[test]
    fn store_configuration_coerces_amounts() {
        let doc = decode::<StoreConfigurationRecord>(json!({
            "storeCode": " a1 ", "goalAmount": "1500"
        }))
        .unwrap();
        assert_eq!(doc, json!({"storeCode": "A1", "goalAmount": 1500}));
        assert_eq!(
            decode::<StoreConfigurationRecord>(json!({"storeCode": "A1", "goalAmount": "lots"}))
                .unwrap_err(),
            RowError::NotNumeric("goalAmount")
        );
    }
}
