// crates/sellout-core/src/core/identifiers.rs
// ============================================================================
// Module: Sellout Identifiers
// Description: Typed identifiers for users, data sources, and extraction records.
// Purpose: Keep persisted row ids from being mixed up across entities.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Persisted rows are addressed by positive integer ids assigned by the store.
//! Each entity gets its own newtype so a data source id can never be passed
//! where a user id is expected. Actor identities coming from the SAML proxy
//! are opaque strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Declares a transparent integer identifier newtype.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw store identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a back-office user.
    UserId
);
numeric_id!(
    /// Identifier of a configured extraction data source.
    DataSourceId
);
numeric_id!(
    /// Identifier of a persisted extraction run.
    ExtractionRunId
);
numeric_id!(
    /// Identifier of a scheduler-owned extraction log.
    ExtractionLogId
);

// ============================================================================
// SECTION: External Identity
// ============================================================================

/// External identity asserted by the identity provider (SAML `NameID`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdentity(String);

impl ExternalIdentity {
    /// Creates a new external identity, trimming surrounding whitespace.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let raw: String = id.into();
        Self(raw.trim().to_string())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identity carries no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ExternalIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExternalIdentity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
