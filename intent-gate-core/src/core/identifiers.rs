// intent-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Intent Gate Identifiers
// Description: Canonical opaque identifiers for Intent Gate records.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! Intent Gate. Identifiers are opaque and serialize as strings. Freshly
//! minted identifiers are UUIDv4; validation of externally supplied values is
//! handled at service boundaries rather than within these simple wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier newtype with the shared conversions.
macro_rules! string_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from an existing string form.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mints a fresh random (UUIDv4) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
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

string_identifier! {
    /// Tenant identifier; the isolation boundary for every record.
    TenantId
}

string_identifier! {
    /// Intent identifier.
    IntentId
}

string_identifier! {
    /// Entity identifier for the submitting actor (user, service, or agent).
    EntityId
}

string_identifier! {
    /// Namespace identifier used for policy routing.
    NamespaceId
}

string_identifier! {
    /// Policy identifier.
    PolicyId
}

string_identifier! {
    /// Rule identifier scoped to a policy definition.
    RuleId
}

string_identifier! {
    /// Escalation identifier.
    EscalationId
}

string_identifier! {
    /// Intent ledger event identifier.
    EventId
}

string_identifier! {
    /// Audit record identifier.
    AuditId
}

string_identifier! {
    /// Queue job identifier.
    JobId
}

string_identifier! {
    /// Distributed trace identifier propagated from the transport layer.
    TraceId
}

string_identifier! {
    /// Principal subject identifier from the authenticated envelope.
    PrincipalId
}

impl NamespaceId {
    /// Returns the default policy namespace.
    #[must_use]
    pub fn default_namespace() -> Self {
        Self::new("default")
    }
}
