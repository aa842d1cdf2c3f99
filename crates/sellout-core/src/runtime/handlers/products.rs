// crates/sellout-core/src/runtime/handlers/products.rs
// ============================================================================
// Module: Product Handlers
// Description: Product compliance figures and the strategic product catalogue.
// Purpose: Key product data by calculation date and numeric product id.
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
const STORE_CODE: &str = "storeCode";
const PRODUCT_ID: &str = "productId";

/// Amount fields reported per store and product.
const COMPLIANCE_AMOUNTS: [&str; 4] = ["goal", "sales", "compliance", "units"];
/// Amount fields of catalogue entries.
const CATALOGUE_AMOUNTS: [&str; 2] = ["price", "commissionValue"];

// ============================================================================
// SECTION: Product Compliance
// ============================================================================

/// Per-store product compliance keyed by date, store, and product.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductComplianceRecord {
    /// Calculation date.
    pub calculate_date: CalculateDate,
    /// Uppercased store code.
    pub store_code: String,
    /// Numeric product id.
    pub product_id: i64,
    /// Remaining producer fields with amounts coerced.
    pub fields: Map<String, Value>,
}

impl DomainRecord for ProductComplianceRecord {
    const BLOCK: BlockName = BlockName::ProductCompliance;

    fn natural_key(
        record: &Map<String, Value>,
        context: &HandlerContext,
    ) -> Result<String, RowError> {
        let date = fields::calculate_date(record, CALCULATE_DATE, context.calculate_date)?;
        let store_code = fields::store_code(record, STORE_CODE)?;
        let product_id = fields::numeric_id(record, PRODUCT_ID)?;
        Ok(composite_key(&[&date.to_string(), &store_code, &product_id.to_string()]))
    }

    fn decode(mut record: Map<String, Value>, context: &HandlerContext) -> Result<Self, RowError> {
        let calculate_date = fields::calculate_date(&record, CALCULATE_DATE, context.calculate_date)?;
        let store_code = fields::store_code(&record, STORE_CODE)?;
        let product_id = fields::numeric_id(&record, PRODUCT_ID)?;
        fields::coerce_amounts(&mut record, &COMPLIANCE_AMOUNTS)?;
        Ok(Self {
            calculate_date,
            store_code,
            product_id,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(CALCULATE_DATE.to_string(), Value::String(self.calculate_date.to_string()));
        document.insert(STORE_CODE.to_string(), Value::String(self.store_code));
        document.insert(PRODUCT_ID.to_string(), Value::from(self.product_id));
        document
    }
}

// ============================================================================
// SECTION: Strategic Catalogue
// ============================================================================

/// Strategic product entry keyed by date and product.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrategicProductRecord {
    /// Calculation date.
    pub calculate_date: CalculateDate,
    /// Numeric product id.
    pub product_id: i64,
    /// Remaining producer fields with amounts coerced.
    pub fields: Map<String, Value>,
}

impl DomainRecord for ExtrategicProductRecord {
    const BLOCK: BlockName = BlockName::CalculationProductExtrategic;

    fn natural_key(
        record: &Map<String, Value>,
        context: &HandlerContext,
    ) -> Result<String, RowError> {
        let date = fields::calculate_date(record, CALCULATE_DATE, context.calculate_date)?;
        let product_id = fields::numeric_id(record, PRODUCT_ID)?;
        Ok(composite_key(&[&date.to_string(), &product_id.to_string()]))
    }

    fn decode(mut record: Map<String, Value>, context: &HandlerContext) -> Result<Self, RowError> {
        let calculate_date = fields::calculate_date(&record, CALCULATE_DATE, context.calculate_date)?;
        let product_id = fields::numeric_id(&record, PRODUCT_ID)?;
        fields::coerce_amounts(&mut record, &CATALOGUE_AMOUNTS)?;
        Ok(Self {
            calculate_date,
            product_id,
            fields: record,
        })
    }

    fn into_document(self) -> Map<String, Value> {
        let mut document = self.fields;
        document.insert(CALCULATE_DATE.to_string(), Value::String(self.calculate_date.to_string()));
        document.insert(PRODUCT_ID.to_string(), Value::from(self.product_id));
        document
    }
}
