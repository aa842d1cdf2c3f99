// crates/sellout-core/src/core/block.rs
// ============================================================================
// Module: Block Names
// Description: Known top-level blocks of an extracted-data payload.
// Purpose: Fix the classification registry order in one place.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A block is a named top-level array inside an ingestion payload. Each block
//! maps to exactly one data domain. [`BlockName::REGISTRY`] is the order the
//! classifier probes them in; the first present block wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Block Names
// ============================================================================

/// Known payload block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockName {
    /// Employee master data.
    Employees,
    /// Per-store product compliance figures.
    ProductCompliance,
    /// Strategic product catalogue used for commission calculation.
    CalculationProductExtrategic,
    /// Directory accounts synchronized from Active Directory.
    ActiveDirectory,
    /// Store configuration master data.
    StoreConfiguration,
    /// Advisor commission results.
    AdvisorCommission,
    /// Store manager commission calculation results.
    StoreManagerCalculationCommission,
}

impl BlockName {
    /// Classification registry in precedence order.
    pub const REGISTRY: [Self; 7] = [
        Self::Employees,
        Self::ProductCompliance,
        Self::CalculationProductExtrategic,
        Self::ActiveDirectory,
        Self::StoreConfiguration,
        Self::AdvisorCommission,
        Self::StoreManagerCalculationCommission,
    ];

    /// Returns the payload key for the block.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Employees => "employees",
            Self::ProductCompliance => "product_compliance",
            Self::CalculationProductExtrategic => "calculation_product_extrategic",
            Self::ActiveDirectory => "active_directory",
            Self::StoreConfiguration => "store_configuration",
            Self::AdvisorCommission => "advisor_commission",
            Self::StoreManagerCalculationCommission => "store_manager_calculation_commission",
        }
    }

    /// Parses a payload key into a block name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::REGISTRY.into_iter().find(|block| block.as_str() == value)
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::BlockName;

    #[test]
    fn registry_keys_parse_back() {
        for block in BlockName::REGISTRY {
            assert_eq!(BlockName::parse(block.as_str()), Some(block));
        }
        assert_eq!(BlockName::parse("unknown_block"), None);
    }

    #[test]
    fn registry_starts_with_employees() {
        assert_eq!(BlockName::REGISTRY[0], BlockName::Employees);
        assert_eq!(BlockName::REGISTRY[6], BlockName::StoreManagerCalculationCommission);
    }
}
