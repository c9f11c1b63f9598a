// intent-gate-core/src/core/intent.rs
// ============================================================================
// Module: Intent Gate Intent Model
// Description: Intent records, lifecycle status machine, and the per-intent
//              hash-chained event ledger.
// Purpose: Capture governed submissions and their append-only history.
// Dependencies: crate::core::{hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! An intent is the primary governed entity: a goal plus context submitted by
//! an entity, moving through a closed lifecycle graph until it reaches a
//! terminal state. Every state change appends a hash-chained event to the
//! intent's ledger; the ledger is append-only and survives soft deletion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::GENESIS_PREVIOUS_HASH;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::IntentId;
use crate::core::identifiers::PolicyId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Validation Limits
// ============================================================================

/// Maximum accepted goal length in characters.
pub const MAX_GOAL_CHARS: usize = 1024;

/// Maximum accepted canonical-serialized context size in bytes.
pub const MAX_CONTEXT_BYTES: usize = 64 * 1024;

/// Maximum accepted priority value.
pub const MAX_PRIORITY: u8 = 9;

// ============================================================================
// SECTION: Intent Status
// ============================================================================

/// Intent lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - Transitions must satisfy [`IntentStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Accepted and queued for intake.
    Pending,
    /// Trust snapshot captured; policy evaluation in flight.
    Evaluating,
    /// Terminal: authorized for execution.
    Approved,
    /// Terminal: refused by policy or approver.
    Denied,
    /// Waiting on a human approval decision.
    Escalated,
    /// Executor has begun acting on the approved intent.
    Executing,
    /// Terminal: execution finished successfully.
    Completed,
    /// Terminal: evaluation or execution failed.
    Failed,
    /// Terminal: withdrawn by the submitter or an operator.
    Cancelled,
}

impl IntentStatus {
    /// Returns true when the status has no outbound edges.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true when the lifecycle graph permits `self -> next`.
    ///
    /// `Approved` is terminal for the governance core but hands off to the
    /// executor edge (`Approved -> Executing`), so it keeps outbound edges.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Evaluating | Self::Cancelled)
                | (
                    Self::Evaluating,
                    Self::Approved
                        | Self::Denied
                        | Self::Escalated
                        | Self::Cancelled
                        | Self::Failed
                )
                | (Self::Escalated, Self::Approved | Self::Denied | Self::Cancelled)
                | (Self::Approved, Self::Executing)
                | (Self::Executing, Self::Completed | Self::Failed)
        )
    }

    /// Returns true when a submitter cancellation is permitted from `self`.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Evaluating | Self::Escalated)
    }

    /// Returns true when replay is permitted from `self`.
    #[must_use]
    pub const fn is_replayable(self) -> bool {
        matches!(self, Self::Failed | Self::Denied)
    }

    /// Returns a stable label for metrics and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Evaluating => "evaluating",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Escalated => "escalated",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Intent Record
// ============================================================================

/// Governed intent record.
///
/// # Invariants
/// - `(tenant_id, dedupe_hash)` is unique while `status` is non-terminal.
/// - `deleted_at` non-null implies `context`/`metadata` have been redacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Intent identifier.
    pub id: IntentId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Submitting entity.
    pub entity_id: EntityId,
    /// Free-text goal, at most [`MAX_GOAL_CHARS`] characters.
    pub goal: String,
    /// Optional intent type tag used for namespace routing.
    pub intent_type: Option<String>,
    /// Priority 0..=9, default 0.
    pub priority: u8,
    /// Submission context mapping.
    pub context: Value,
    /// Submitter metadata mapping.
    pub metadata: BTreeMap<String, Value>,
    /// Lifecycle status.
    pub status: IntentStatus,
    /// Trust snapshot frozen at evaluation start.
    pub trust_snapshot: Option<Value>,
    /// Trust level extracted from the snapshot.
    pub trust_level: Option<i64>,
    /// Trust score extracted from the snapshot.
    pub trust_score: Option<f64>,
    /// Version of the policy that decided this intent.
    pub policy_version: Option<i64>,
    /// Stable content hash used for duplicate collapse.
    pub dedupe_hash: HashDigest,
    /// Optional client-supplied idempotency key.
    pub idempotency_key: Option<String>,
    /// Reason recorded at cancellation.
    pub cancellation_reason: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
    /// Time evaluation started.
    pub evaluated_at: Option<Timestamp>,
    /// Time a terminal governance decision was recorded.
    pub decided_at: Option<Timestamp>,
    /// Time execution completed.
    pub completed_at: Option<Timestamp>,
    /// Soft-deletion time; ledger and audit trail are retained.
    pub deleted_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Intent Events
// ============================================================================

/// Closed set of ledger event types.
///
/// # Invariants
/// - Serialized forms are the dotted names recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentEventType {
    /// Intent accepted at sequence 1.
    #[serde(rename = "intent.submitted")]
    Submitted,
    /// Intake captured a trust snapshot and began evaluation.
    #[serde(rename = "intent.evaluating")]
    Evaluating,
    /// Terminal approval.
    #[serde(rename = "intent.approved")]
    Approved,
    /// Terminal denial.
    #[serde(rename = "intent.denied")]
    Denied,
    /// Escalated to a human approver.
    #[serde(rename = "intent.escalated")]
    Escalated,
    /// Terminal cancellation.
    #[serde(rename = "intent.cancelled")]
    Cancelled,
    /// Evaluation or execution failure.
    #[serde(rename = "intent.failed")]
    Failed,
    /// Executor started acting on the approval.
    #[serde(rename = "intent.executing")]
    Executing,
    /// Execution finished.
    #[serde(rename = "intent.completed")]
    Completed,
    /// Soft deletion redacted sensitive fields.
    #[serde(rename = "intent.redacted")]
    Redacted,
    /// Failed or denied intent was reset to pending.
    #[serde(rename = "intent.replayed")]
    Replayed,
    /// An approver claimed the intent's escalation.
    #[serde(rename = "escalation.acknowledged")]
    EscalationAcknowledged,
    /// The intent's escalation timed out unresolved.
    #[serde(rename = "escalation.timeout")]
    EscalationTimedOut,
}

impl IntentEventType {
    /// Returns the dotted ledger name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "intent.submitted",
            Self::Evaluating => "intent.evaluating",
            Self::Approved => "intent.approved",
            Self::Denied => "intent.denied",
            Self::Escalated => "intent.escalated",
            Self::Cancelled => "intent.cancelled",
            Self::Failed => "intent.failed",
            Self::Executing => "intent.executing",
            Self::Completed => "intent.completed",
            Self::Redacted => "intent.redacted",
            Self::Replayed => "intent.replayed",
            Self::EscalationAcknowledged => "escalation.acknowledged",
            Self::EscalationTimedOut => "escalation.timeout",
        }
    }
}

/// Ledger event awaiting sequence assignment inside a store transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingIntentEvent {
    /// Event identifier.
    pub id: EventId,
    /// Owning intent.
    pub intent_id: IntentId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Ledger event type.
    pub event_type: IntentEventType,
    /// Event payload mapping.
    pub payload: Value,
    /// Creation time.
    pub created_at: Timestamp,
}

impl PendingIntentEvent {
    /// Builds a pending ledger event.
    #[must_use]
    pub fn new(
        intent_id: IntentId,
        tenant_id: TenantId,
        event_type: IntentEventType,
        payload: Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: EventId::generate(),
            intent_id,
            tenant_id,
            event_type,
            payload,
            created_at,
        }
    }

    /// Seals the event into a chain link at the given sequence.
    ///
    /// Stores call this inside the transaction that reserves the sequence so
    /// hashing stays in the core while atomicity stays in the store.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn seal(
        self,
        sequence_number: u64,
        previous_hash: HashDigest,
    ) -> Result<IntentEvent, HashError> {
        let event_hash = chain_hash(
            &self.intent_id,
            sequence_number,
            self.event_type,
            &self.payload,
            &previous_hash,
        )?;
        Ok(IntentEvent {
            id: self.id,
            intent_id: self.intent_id,
            tenant_id: self.tenant_id,
            event_type: self.event_type,
            payload: self.payload,
            sequence_number,
            previous_hash,
            event_hash,
            created_at: self.created_at,
        })
    }
}

/// Sealed ledger event.
///
/// # Invariants
/// - `sequence_number` is dense and monotonic per intent, starting at 1.
/// - `event_hash` commits to `previous_hash`, forming the per-intent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentEvent {
    /// Event identifier.
    pub id: EventId,
    /// Owning intent.
    pub intent_id: IntentId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Ledger event type.
    pub event_type: IntentEventType,
    /// Event payload mapping.
    pub payload: Value,
    /// Dense per-intent sequence starting at 1.
    pub sequence_number: u64,
    /// Hash of the preceding event; empty at sequence 1.
    pub previous_hash: HashDigest,
    /// Canonical hash over this link.
    pub event_hash: HashDigest,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Canonical basis hashed into each ledger chain link.
#[derive(Debug, Serialize)]
struct EventChainBasis<'a> {
    /// Owning intent.
    intent_id: &'a str,
    /// Link sequence number.
    sequence: u64,
    /// Ledger event type.
    event_type: &'static str,
    /// Event payload mapping.
    payload: &'a Value,
    /// Hash of the preceding link.
    previous_hash: &'a str,
}

/// Computes the chain hash for a ledger link.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn chain_hash(
    intent_id: &IntentId,
    sequence: u64,
    event_type: IntentEventType,
    payload: &Value,
    previous_hash: &HashDigest,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(&EventChainBasis {
        intent_id: intent_id.as_str(),
        sequence,
        event_type: event_type.as_str(),
        payload,
        previous_hash: previous_hash.as_str(),
    })
}

/// Outcome of verifying a per-intent ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// True when every link verified.
    pub valid: bool,
    /// Number of events inspected.
    pub event_count: u64,
    /// First sequence number that failed verification.
    pub invalid_at: Option<u64>,
    /// Human-readable failure description.
    pub error: Option<String>,
}

/// Verifies a ledger chain loaded in sequence order.
///
/// # Errors
///
/// Returns [`HashError`] only when canonicalization itself fails; tampered
/// links are reported through the returned [`ChainVerification`].
pub fn verify_event_chain(events: &[IntentEvent]) -> Result<ChainVerification, HashError> {
    let mut previous = HashDigest::from_hex(GENESIS_PREVIOUS_HASH);
    for (index, event) in events.iter().enumerate() {
        let expected_sequence = index as u64 + 1;
        if event.sequence_number != expected_sequence {
            return Ok(ChainVerification {
                valid: false,
                event_count: events.len() as u64,
                invalid_at: Some(expected_sequence),
                error: Some(format!(
                    "sequence gap: expected {expected_sequence}, found {}",
                    event.sequence_number
                )),
            });
        }
        if event.previous_hash != previous {
            return Ok(ChainVerification {
                valid: false,
                event_count: events.len() as u64,
                invalid_at: Some(event.sequence_number),
                error: Some("previous_hash does not match prior link".to_string()),
            });
        }
        let recomputed = chain_hash(
            &event.intent_id,
            event.sequence_number,
            event.event_type,
            &event.payload,
            &event.previous_hash,
        )?;
        if recomputed != event.event_hash {
            return Ok(ChainVerification {
                valid: false,
                event_count: events.len() as u64,
                invalid_at: Some(event.sequence_number),
                error: Some("event_hash does not match canonical recomputation".to_string()),
            });
        }
        previous = event.event_hash.clone();
    }
    Ok(ChainVerification {
        valid: true,
        event_count: events.len() as u64,
        invalid_at: None,
        error: None,
    })
}

// ============================================================================
// SECTION: Evaluation Records
// ============================================================================

/// Decision-stage trace labels.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationStage {
    /// Trust snapshot capture.
    TrustSnapshot,
    /// Trust ceiling gate applied to degraded snapshots.
    TrustGate,
    /// Evaluation context assembly.
    Basis,
    /// Policy engine invocation.
    Policy,
    /// Terminal decision application.
    Decision,
    /// Stage failure.
    Error,
    /// Cooperative cancellation observed mid-flight.
    Cancelled,
}

impl EvaluationStage {
    /// Returns the stable kebab-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrustSnapshot => "trust-snapshot",
            Self::TrustGate => "trust-gate",
            Self::Basis => "basis",
            Self::Policy => "policy",
            Self::Decision => "decision",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Append-only evaluation trace row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Intent under evaluation.
    pub intent_id: IntentId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Decision stage.
    pub stage: EvaluationStage,
    /// Stage result mapping.
    pub result: Value,
    /// Stage duration in milliseconds.
    pub duration_ms: u64,
    /// Policy consulted, when the stage touched one.
    pub policy_id: Option<PolicyId>,
    /// Policy version consulted.
    pub policy_version: Option<i64>,
    /// Creation time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::*;

    /// Builds a sealed chain of `n` events for one intent.
    fn build_chain(n: u64) -> Vec<IntentEvent> {
        let intent_id = IntentId::new("i-1");
        let tenant_id = TenantId::new("t-1");
        let mut previous = HashDigest::from_hex(GENESIS_PREVIOUS_HASH);
        let mut events = Vec::new();
        for sequence in 1..=n {
            let pending = PendingIntentEvent::new(
                intent_id.clone(),
                tenant_id.clone(),
                IntentEventType::Evaluated,
                json!({"seq": sequence}),
                Timestamp::from_unix_millis(sequence as i64),
            );
            let event = pending.seal(sequence, previous.clone()).unwrap();
            previous = event.event_hash.clone();
            events.push(event);
        }
        events
    }

    /// Tests terminal statuses reject every outbound transition.
    #[test]
    fn test_terminal_statuses_have_no_outbound_edges() {
        for terminal in [
            IntentStatus::Denied,
            IntentStatus::Completed,
            IntentStatus::Failed,
            IntentStatus::Cancelled,
        ] {
            for next in [
                IntentStatus::Pending,
                IntentStatus::Evaluating,
                IntentStatus::Approved,
                IntentStatus::Denied,
                IntentStatus::Escalated,
                IntentStatus::Executing,
                IntentStatus::Completed,
                IntentStatus::Failed,
                IntentStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
            }
        }
    }

    /// Tests the lifecycle graph edges from the specification hold.
    #[test]
    fn test_lifecycle_graph_edges() {
        assert!(IntentStatus::Pending.can_transition_to(IntentStatus::Evaluating));
        assert!(IntentStatus::Pending.can_transition_to(IntentStatus::Cancelled));
        assert!(IntentStatus::Evaluating.can_transition_to(IntentStatus::Escalated));
        assert!(IntentStatus::Escalated.can_transition_to(IntentStatus::Approved));
        assert!(IntentStatus::Approved.can_transition_to(IntentStatus::Executing));
        assert!(IntentStatus::Executing.can_transition_to(IntentStatus::Completed));
        assert!(!IntentStatus::Pending.can_transition_to(IntentStatus::Approved));
        assert!(!IntentStatus::Approved.can_transition_to(IntentStatus::Denied));
    }

    /// Tests a well-formed chain verifies end to end.
    #[test]
    fn test_event_chain_verifies() {
        let events = build_chain(5);
        let report = verify_event_chain(&events).unwrap();
        assert!(report.valid);
        assert_eq!(report.event_count, 5);
        assert_eq!(report.invalid_at, None);
    }

    /// Tests a tampered hash is localized to its sequence number.
    #[test]
    fn test_event_chain_detects_tampering() {
        let mut events = build_chain(5);
        events[2].event_hash = HashDigest::from_hex("00");
        let report = verify_event_chain(&events).unwrap();
        assert!(!report.valid);
        assert_eq!(report.invalid_at, Some(3));
    }

    /// Tests a payload mutation invalidates its link.
    #[test]
    fn test_event_chain_detects_payload_mutation() {
        let mut events = build_chain(3);
        events[1].payload = json!({"seq": 99});
        let report = verify_event_chain(&events).unwrap();
        assert!(!report.valid);
        assert_eq!(report.invalid_at, Some(2));
    }
}
