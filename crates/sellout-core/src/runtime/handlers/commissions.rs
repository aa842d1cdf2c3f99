// crates/sellout-core/src/runtime/handlers/commissions.rs
// ============================================================================
// Module: Commission Handlers
// Description: Advisor and store manager commission results.
// Purpose: Key commission figures by calculation date and payee.
// Dependencies: crate::runtime::handlers, serde_json
// ============================================================================

use serde_json::Map;
use serde_json::Value;

use super::DomainRecord;
use super::HandlerContext;
use super::composite_key;
use super::fields;
use crate::core::BlockName;
use crate::core::CalculateDate;
use crate::runtime::engine::RowError;

const CALCULATE_DATE: &str = "calculateDate";
const EMPLOYEE_CODE: &str = "employeeCode";
const STORE_CODE: &str = "storeCode";

const ADVISOR_AMOUNTS: [&str; 5] =
    ["salesAmount", "goalAmount", "compliancePercentage", "commissionAmount", "bonusAmount"];
const MANAGER_AMOUNTS: [&str; 5] = [
    "salesAmount",
    "goalAmount",
    "compliancePercentage",
    "commissionAmount",
    "advisorCount",
];

// ============================================================================
// SECTION: Advisor Commission
// ============================================================================

/// Advisor commission keyed by date and employee.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorCommissionRecord {
    /// Calculation date.
    pub calculate_date: CalculateDate,
    /// Normalized employee code.
    pub employee_code: String,
    /// Remaining producer fields with amounts coerced.
    pub fields: Map<String, Value>,
}

impl DomainRecord for AdvisorCommissionRecord {
    const BLOCK: BlockName = BlockName::AdvisorCommission;

    fn natural_key(
        record: &Map<String, Value>,
        context: &HandlerContext,
    ) -> Result<String, RowError> {
        let date = fields::calculate_date(record, CALCULATE_DATE, context.calculate_date)?;
        let employee_code = fields::employee_code(record, EMPLOYEE_CODE)?;
        Ok(composite_key(&[&date.to_string(), &employee_code]))
    }

    fn decode(mut record: Map<String, Value>, context: &HandlerContext) -> Result<Self, RowError> {
        let calculate_date = fields::calculate_date(&record, CALCULATE_DATE, context.calculate_date)?;
        let employee_code = fields::employee_code(&record, EMPLOYEE_CODE)?;
        fields::coerce_amounts(&mut record, &ADVISOR_AMOUNTS)?;
        Ok(Self {
            calculate_date,
            employee_code,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(CALCULATE_DATE.to_string(), Value::String(self.calculate_date.to_string()));
        document.insert(EMPLOYEE_CODE.to_string(), Value::String(self.employee_code));
        document
    }
}

// ============================================================================
// SECTION: Store Manager Commission
// ============================================================================

/// Store manager commission calculation keyed by date and store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreManagerCommissionRecord {
    /// Calculation date.
    pub calculate_date: CalculateDate,
    /// Uppercased store code.
    pub store_code: String,
    /// Remaining producer fields with amounts coerced.
    pub fields: Map<String, Value>,
}

impl DomainRecord for StoreManagerCommissionRecord {
    const BLOCK: BlockName = BlockName::StoreManagerCalculationCommission;

    fn natural_key(
        record: &Map<String, Value>,
        context: &HandlerContext,
    ) -> Result<String, RowError> {
        let date = fields::calculate_date(record, CALCULATE_DATE, context.calculate_date)?;
        let store_code = fields::store_code(record, STORE_CODE)?;
        Ok(composite_key(&[&date.to_string(), &store_code]))
    }

    fn decode(mut record: Map<String, Value>, context: &HandlerContext) -> Result<Self, RowError> {
        let calculate_date = fields::calculate_date(&record, CALCULATE_DATE, context.calculate_date)?;
        let store_code = fields::store_code(&record, STORE_CODE)?;
        fields::coerce_amounts(&mut record, &MANAGER_AMOUNTS)?;
        Ok(Self {
            calculate_date,
            store_code,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(CALCULATE_DATE.to_string(), Value::String(self.calculate_date.to_string()));
        document.insert(STORE_CODE.to_string(), Value::String(self.store_code));
        document
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::AdvisorCommissionRecord;
    use super::StoreManagerCommissionRecord;
    use crate::runtime::engine::RowError;
    use crate::runtime::handlers::DomainRecord;
    use crate::runtime::handlers::HandlerContext;

    #[test]
    fn advisor_key_uses_normalized_employee_code() {
        let record = json!({"calculateDate": "2024-02-29", "employeeCode": "00123"});
        let key = AdvisorCommissionRecord::natural_key(
            record.as_object().unwrap(),
            &HandlerContext::default(),
        )
        .unwrap();
        assert_eq!(key, "2024-02-29|123");
    }

    #[test]
    fn missing_date_without_batch_date_is_a_row_error() {
        let record = json!({"storeCode": "A1"});
        let err = StoreManagerCommissionRecord::natural_key(
            record.as_object().unwrap(),
            &HandlerContext::default(),
        )
        .unwrap_err();
        assert_eq!(err, RowError::MissingField("calculateDate"));
    }

    #[test]
    fn manager_amounts_are_numeric() {
        let record = json!({"calculateDate": "2024-02-29", "storeCode": "a1", "commissionAmount": " 99.5 "});
        let doc = StoreManagerCommissionRecord::decode(
            record.as_object().cloned().unwrap(),
            &HandlerContext::default(),
        )
        .unwrap()
        .into_document();
        assert_eq!(doc.get("commissionAmount"), Some(&json!(99.5)));
        assert_eq!(doc.get("storeCode"), Some(&json!("A1")));
    }
}
