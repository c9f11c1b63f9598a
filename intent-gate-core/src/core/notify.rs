// intent-gate-core/src/core/notify.rs
// ============================================================================
// Module: Intent Gate Notification Records
// Description: Structured delivery records handed to notification fan-out.
// Purpose: Describe what must be delivered without binding to a transport.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The core never talks to email, chat, or webhook transports. It produces
//! structured delivery records (escalation notices, monitor signals) that the
//! external fan-out layer consumes. Delivery is fire-and-forget from the
//! decision path's perspective.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::IntentId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Delivery Records
// ============================================================================

/// Delivery record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// A human approver must be notified of a new escalation.
    EscalationCreated,
    /// An escalation timed out unresolved.
    EscalationTimedOut,
    /// A `monitor` policy action fired.
    MonitorSignal,
}

impl DeliveryKind {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EscalationCreated => "escalation_created",
            Self::EscalationTimedOut => "escalation_timed_out",
            Self::MonitorSignal => "monitor_signal",
        }
    }
}

/// Structured delivery record consumed by notification fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Record kind.
    pub kind: DeliveryKind,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Related intent.
    pub intent_id: IntentId,
    /// Addressee: role, group, or user identifier.
    pub recipient: String,
    /// Human-readable subject line.
    pub subject: String,
    /// Structured body for the transport to render.
    pub body: Value,
    /// Creation time.
    pub created_at: Timestamp,
}
