// intent-gate-core/src/core/escalation.rs
// ============================================================================
// Module: Intent Gate Escalation Model
// Description: Human-approval records with SLA timeouts.
// Purpose: Capture the single active escalation an intent may carry and the
//          irreversible resolution transitions.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! An escalation is the human-in-the-loop approval record created when policy
//! emits an `escalate` action. Exactly one non-terminal escalation exists per
//! intent at any time; the escalation holds `intent_id` and the intent never
//! holds an escalation reference back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EscalationId;
use crate::core::identifiers::IntentId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Escalation Status
// ============================================================================

/// Escalation lifecycle status.
///
/// # Invariants
/// - Terminal transitions are irreversible.
/// - Timeout resolution applies only from `Pending` or `Acknowledged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Awaiting approver attention.
    Pending,
    /// An approver has claimed the escalation.
    Acknowledged,
    /// Terminal: approver authorized the intent.
    Approved,
    /// Terminal: approver refused the intent.
    Rejected,
    /// Terminal: the SLA deadline passed unresolved.
    Timeout,
    /// Terminal: the underlying intent was cancelled.
    Cancelled,
}

impl EscalationStatus {
    /// Returns true when the status has no outbound edges.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Timeout | Self::Cancelled)
    }

    /// Returns true when a human resolution (approve/reject) is permitted.
    #[must_use]
    pub const fn is_resolvable(self) -> bool {
        matches!(self, Self::Pending | Self::Acknowledged)
    }

    /// Returns a stable label for metrics and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Escalation Record
// ============================================================================

/// Human-approval record for one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    /// Escalation identifier.
    pub id: EscalationId,
    /// Intent awaiting the decision.
    pub intent_id: IntentId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Reason the policy escalated.
    pub reason: String,
    /// Coarse reason category for reporting.
    pub reason_category: String,
    /// Role, group, or user the escalation is addressed to.
    pub escalated_to: String,
    /// Lifecycle status.
    pub status: EscalationStatus,
    /// SLA deadline.
    pub timeout_at: Timestamp,
    /// Whether an unresolved escalation denies the intent at timeout.
    pub auto_deny_on_timeout: bool,
    /// Context snapshot surfaced to the approver.
    pub context: Value,
    /// Time an approver claimed the escalation.
    pub acknowledged_at: Option<Timestamp>,
    /// Resolver principal.
    pub resolved_by: Option<PrincipalId>,
    /// Resolution time.
    pub resolved_at: Option<Timestamp>,
    /// Resolver notes.
    pub resolution_notes: Option<String>,
    /// True when resolution happened after `timeout_at`.
    pub sla_breached: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl Escalation {
    /// Returns true when the SLA deadline has passed at `now`.
    ///
    /// The deadline itself counts as due: an escalation exactly at
    /// `timeout_at` is swept on the next tick.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status.is_resolvable() && now >= self.timeout_at
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Builds a pending escalation due at t=1000.
    fn pending_at(timeout_at: i64) -> Escalation {
        Escalation {
            id: EscalationId::new("esc-1"),
            intent_id: IntentId::new("i-1"),
            tenant_id: TenantId::new("t-1"),
            reason: "threshold exceeded".to_string(),
            reason_category: "policy".to_string(),
            escalated_to: "data-gov".to_string(),
            status: EscalationStatus::Pending,
            timeout_at: Timestamp::from_unix_millis(timeout_at),
            auto_deny_on_timeout: true,
            context: json!({}),
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            sla_breached: false,
            created_at: Timestamp::from_unix_millis(0),
            updated_at: Timestamp::from_unix_millis(0),
        }
    }

    /// Tests the deadline boundary: due exactly at `timeout_at`, not before.
    #[test]
    fn test_due_boundary_is_inclusive() {
        let escalation = pending_at(1_000);
        assert!(!escalation.is_due(Timestamp::from_unix_millis(999)));
        assert!(escalation.is_due(Timestamp::from_unix_millis(1_000)));
        assert!(escalation.is_due(Timestamp::from_unix_millis(1_001)));
    }

    /// Tests terminal escalations are never due.
    #[test]
    fn test_terminal_escalations_are_not_due() {
        let mut escalation = pending_at(1_000);
        escalation.status = EscalationStatus::Rejected;
        assert!(!escalation.is_due(Timestamp::from_unix_millis(2_000)));
    }
}
