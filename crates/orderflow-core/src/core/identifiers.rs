// crates/orderflow-core/src/core/identifiers.rs
// ============================================================================
// Module: Orderflow Identifiers
// Description: Canonical opaque identifiers for cases, tenants, and entities.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! Orderflow. Identifiers are opaque and serialize as strings. Validation is
//! handled at request or configuration boundaries rather than within these
//! simple wrappers. A case identifier doubles as the workflow identity, so
//! uniqueness of `CaseId` is what forbids concurrent executions per case.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier newtype with the standard surface.
macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_id! {
    /// Case identifier; globally unique and also the workflow identity.
    CaseId
}

string_id! {
    /// Tenant identifier scoping catalog access and rate limits.
    TenantId
}

string_id! {
    /// End-user identifier recorded on signals and corrections.
    UserId
}

string_id! {
    /// Correlation identifier tying requests, events, and notifications.
    CorrelationId
}

string_id! {
    /// Committee model-provider identifier.
    ProviderId
}

string_id! {
    /// Provider family tag used for committee diversity selection.
    ProviderFamily
}

string_id! {
    /// Spreadsheet column identifier emitted by the parser.
    ColumnId
}

string_id! {
    /// External catalog customer identifier.
    CustomerId
}

string_id! {
    /// External catalog item identifier.
    ItemId
}

string_id! {
    /// External draft sales-order identifier.
    DraftId
}

string_id! {
    /// Chat thread handle receiving case notifications.
    ChatThreadId
}
