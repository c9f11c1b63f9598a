// intent-gate-core/tests/lifecycle.rs
// ============================================================================
// Module: Lifecycle Tests
// Description: Submission, dedupe, transitions, escalation resolution, and
//              ledger verification over the in-memory stores.
// ============================================================================
//! ## Overview
//! Exercises the governance flows end to end at the service layer: duplicate
//! collapse, cancel idempotence, decision application, escalation timeout
//! sweeps, and tamper detection.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeMap;

use intent_gate_core::EscalationDirective;
use intent_gate_core::EscalationStatus;
use intent_gate_core::HashDigest;
use intent_gate_core::IntentEventType;
use intent_gate_core::IntentStatus;
use intent_gate_core::IntentStore;
use intent_gate_core::PolicyId;
use intent_gate_core::QueueStage;
use intent_gate_core::RuleAction;
use intent_gate_core::RuleId;
use intent_gate_core::TenantId;
use intent_gate_core::TrustSnapshot;
use intent_gate_core::runtime::DecisionApplied;
use intent_gate_core::runtime::EscalationError;
use intent_gate_core::runtime::LifecycleError;
use intent_gate_core::runtime::OperationContext;
use intent_gate_core::runtime::PolicyDecision;
use intent_gate_core::runtime::Resolution;

use common::approver;
use common::harness;
use common::submission;
use common::tenant;

/// Builds an allow decision attributed to a policy.
fn allow_decision() -> PolicyDecision {
    PolicyDecision {
        action: RuleAction::Allow,
        reason: "rule:allow-public".to_string(),
        matched_policy_id: Some(PolicyId::new("policy-1")),
        matched_policy_version: Some(1),
        matched_rule_id: Some(RuleId::new("allow-public")),
        constraints: None,
        escalation: None,
        monitors: Vec::new(),
    }
}

/// Builds an escalate decision with a one-hour auto-deny window.
fn escalate_decision() -> PolicyDecision {
    PolicyDecision {
        action: RuleAction::Escalate,
        reason: "record-count-threshold".to_string(),
        matched_policy_id: Some(PolicyId::new("policy-1")),
        matched_policy_version: Some(1),
        matched_rule_id: Some(RuleId::new("large-export")),
        constraints: None,
        escalation: Some(EscalationDirective {
            to: "data-gov".to_string(),
            timeout_ms: 3_600_000,
            require_justification: false,
            auto_deny_on_timeout: true,
        }),
        monitors: Vec::new(),
    }
}

/// Builds a healthy trust snapshot.
fn snapshot(h: &common::Harness) -> TrustSnapshot {
    TrustSnapshot {
        trust_level: 3,
        trust_score: 0.9,
        attributes: BTreeMap::new(),
        degraded: false,
        captured_at: h.clock.now(),
    }
}

// ============================================================================
// SECTION: Submission and Dedupe
// ============================================================================

/// Tests submission creates a pending intent, one ledger event, and an
/// intake job.
#[test]
fn test_submit_creates_pending_intent() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("read public weather"), &op).unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.intent.status, IntentStatus::Pending);

    let events = h.lifecycle.events(&tenant(), &outcome.intent.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, IntentEventType::Submitted);
    assert_eq!(events[0].sequence_number, 1);

    assert_eq!(h.queue.on_stage(QueueStage::Intake).len(), 1);
}

/// Tests duplicate submissions collapse onto the original intent with a
/// single submitted event.
#[test]
fn test_duplicate_submission_returns_same_intent() {
    let h = harness();
    let op = OperationContext::system();
    let first = h.lifecycle.submit(&tenant(), submission("read public weather"), &op).unwrap();
    let second = h.lifecycle.submit(&tenant(), submission("read public weather"), &op).unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.intent.id, second.intent.id);

    let events = h.lifecycle.events(&tenant(), &first.intent.id).unwrap();
    assert_eq!(events.len(), 1, "dedupe must not append a second submitted event");
}

/// Tests an idempotency key collapses even after the dedupe TTL.
#[test]
fn test_idempotency_key_collapses() {
    let h = harness();
    let op = OperationContext::system();
    let mut request = submission("goal one");
    request.idempotency_key = Some("client-key-1".to_string());
    let first = h.lifecycle.submit(&tenant(), request.clone(), &op).unwrap();
    h.clock.advance_millis(60_000);
    request.goal = "goal one but edited".to_string();
    let second = h.lifecycle.submit(&tenant(), request, &op).unwrap();
    assert_eq!(first.intent.id, second.intent.id);
}

/// Tests different tenants never collapse onto each other.
#[test]
fn test_dedupe_is_tenant_scoped() {
    let h = harness();
    let op = OperationContext::system();
    let first = h.lifecycle.submit(&tenant(), submission("shared goal"), &op).unwrap();
    let second =
        h.lifecycle.submit(&TenantId::new("tenant-2"), submission("shared goal"), &op).unwrap();
    assert!(second.created);
    assert_ne!(first.intent.id, second.intent.id);
}

/// Tests a queue outage fails the submission fast and terminally.
#[test]
fn test_queue_outage_fails_fast() {
    let h = harness();
    let op = OperationContext::system();
    h.queue.set_unavailable(true);
    let err = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap_err();
    assert!(matches!(err, LifecycleError::QueueUnavailable(_)));
}

// ============================================================================
// SECTION: Cancel, Replay
// ============================================================================

/// Tests cancel succeeds once and conflicts on repeat.
#[test]
fn test_cancel_then_cancel_conflicts() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let cancelled =
        h.lifecycle.cancel(&tenant(), &outcome.intent.id, "changed my mind", &op).unwrap();
    assert_eq!(cancelled.status, IntentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("changed my mind"));

    let err = h.lifecycle.cancel(&tenant(), &outcome.intent.id, "again", &op).unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

/// Tests replay resets a denied intent to pending and re-enqueues intake.
#[test]
fn test_replay_denied_intent() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let id = outcome.intent.id.clone();
    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    let mut deny = allow_decision();
    deny.action = RuleAction::Deny;
    h.lifecycle.apply_decision(&tenant(), &id, &deny, false, &op).unwrap();

    let replayed = h.lifecycle.replay(&tenant(), &id, &op).unwrap();
    assert_eq!(replayed.status, IntentStatus::Pending);
    assert_eq!(h.queue.on_stage(QueueStage::Intake).len(), 2);

    let events = h.lifecycle.events(&tenant(), &id).unwrap();
    assert_eq!(events.last().unwrap().event_type, IntentEventType::Replayed);
}

/// Tests replay is rejected for non-replayable and soft-deleted intents.
#[test]
fn test_replay_guards() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let id = outcome.intent.id.clone();
    assert!(matches!(
        h.lifecycle.replay(&tenant(), &id, &op),
        Err(LifecycleError::InvalidState(_))
    ));

    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    let mut deny = allow_decision();
    deny.action = RuleAction::Deny;
    h.lifecycle.apply_decision(&tenant(), &id, &deny, false, &op).unwrap();
    h.lifecycle.delete(&tenant(), &id, &op).unwrap();
    assert!(matches!(
        h.lifecycle.replay(&tenant(), &id, &op),
        Err(LifecycleError::InvalidState(_))
    ));
}

/// Tests soft delete redacts context but preserves the ledger.
#[test]
fn test_delete_redacts_and_preserves_ledger() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let id = outcome.intent.id.clone();
    h.lifecycle.delete(&tenant(), &id, &op).unwrap();

    let intent = h.lifecycle.get(&tenant(), &id).unwrap();
    assert!(intent.deleted_at.is_some());
    assert_eq!(intent.context, serde_json::json!({"redacted": true}));

    let events = h.lifecycle.events(&tenant(), &id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, IntentEventType::Redacted);
    assert!(h.lifecycle.verify_chain(&tenant(), &id).unwrap().valid);
}

// ============================================================================
// SECTION: Decision Application
// ============================================================================

/// Tests the auto-approve path produces three chained events.
#[test]
fn test_auto_approve_flow() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("read public weather"), &op).unwrap();
    let id = outcome.intent.id.clone();

    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    let applied = h.lifecycle.apply_decision(&tenant(), &id, &allow_decision(), false, &op).unwrap();
    let DecisionApplied::Approved(intent) = applied else {
        panic!("expected approval");
    };
    assert_eq!(intent.status, IntentStatus::Approved);
    assert_eq!(intent.policy_version, Some(1));

    let events = h.lifecycle.events(&tenant(), &id).unwrap();
    let kinds: Vec<_> = events.iter().map(|event| event.event_type).collect();
    assert_eq!(
        kinds,
        vec![IntentEventType::Submitted, IntentEventType::Evaluating, IntentEventType::Approved]
    );
    assert!(h.lifecycle.verify_chain(&tenant(), &id).unwrap().valid);
    assert_eq!(h.queue.on_stage(QueueStage::Decision).len(), 1);
}

/// Tests terminal approval is at-most-once: a second application conflicts.
#[test]
fn test_terminal_transition_at_most_once() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let id = outcome.intent.id.clone();
    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    h.lifecycle.apply_decision(&tenant(), &id, &allow_decision(), false, &op).unwrap();
    assert!(h.lifecycle.apply_decision(&tenant(), &id, &allow_decision(), false, &op).is_err());
}

/// Tests a degraded snapshot demotes approval to escalation.
#[test]
fn test_degraded_snapshot_demotes_approval() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let id = outcome.intent.id.clone();
    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    let applied = h.lifecycle.apply_decision(&tenant(), &id, &allow_decision(), true, &op).unwrap();
    let DecisionApplied::Escalated { intent, escalation } = applied else {
        panic!("expected demotion to escalation");
    };
    assert_eq!(intent.status, IntentStatus::Escalated);
    assert_eq!(escalation.escalated_to, "governance");

    let (_, _, evaluations) = h.lifecycle.get_with_events(&tenant(), &id).unwrap();
    assert!(evaluations
        .iter()
        .any(|row| row.stage == intent_gate_core::EvaluationStage::TrustGate));
}

// ============================================================================
// SECTION: Escalation Resolution
// ============================================================================

/// Drives an intent to `escalated` and returns its ids.
fn escalate(h: &common::Harness) -> (intent_gate_core::IntentId, intent_gate_core::EscalationId) {
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("export records"), &op).unwrap();
    let id = outcome.intent.id.clone();
    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(h), &op).unwrap();
    let applied =
        h.lifecycle.apply_decision(&tenant(), &id, &escalate_decision(), false, &op).unwrap();
    let DecisionApplied::Escalated { escalation, .. } = applied else {
        panic!("expected escalation");
    };
    (id, escalation.id)
}

/// Tests the escalate-on-threshold flow creates a pending escalation with
/// the directive's deadline.
#[test]
fn test_escalation_created_pending() {
    let h = harness();
    let (intent_id, escalation_id) = escalate(&h);
    let escalation = h.escalations.get(&tenant(), &escalation_id).unwrap();
    assert_eq!(escalation.status, EscalationStatus::Pending);
    assert_eq!(escalation.intent_id, intent_id);
    assert_eq!(
        escalation.timeout_at,
        h.clock.now().plus_millis(3_600_000),
        "timeout_at must be now + directive timeout"
    );
}

/// Tests rejection denies the intent and a second resolution conflicts.
#[test]
fn test_reject_then_reject_conflicts() {
    let h = harness();
    let (intent_id, escalation_id) = escalate(&h);
    let resolver = approver(&["data-gov"]);
    let resolution = Resolution {
        notes: Some("not allowed".to_string()),
        trace_id: None,
    };
    let rejected =
        h.escalations.reject(&tenant(), &escalation_id, &resolver, resolution.clone()).unwrap();
    assert_eq!(rejected.status, EscalationStatus::Rejected);

    let intent = h.lifecycle.get(&tenant(), &intent_id).unwrap();
    assert_eq!(intent.status, IntentStatus::Denied);

    assert!(matches!(
        h.escalations.reject(&tenant(), &escalation_id, &resolver, resolution),
        Err(EscalationError::AlreadyResolved)
    ));
}

/// Tests acknowledge then approve moves the intent to approved.
#[test]
fn test_acknowledge_then_approve() {
    let h = harness();
    let (intent_id, escalation_id) = escalate(&h);
    let resolver = approver(&["data-gov"]);
    let acked = h.escalations.acknowledge(&tenant(), &escalation_id, &resolver, None).unwrap();
    assert_eq!(acked.status, EscalationStatus::Acknowledged);
    assert!(acked.acknowledged_at.is_some());

    let approved = h
        .escalations
        .approve(
            &tenant(),
            &escalation_id,
            &resolver,
            Resolution {
                notes: None,
                trace_id: None,
            },
        )
        .unwrap();
    assert_eq!(approved.status, EscalationStatus::Approved);
    assert_eq!(h.lifecycle.get(&tenant(), &intent_id).unwrap().status, IntentStatus::Approved);
}

/// Tests non-members cannot resolve.
#[test]
fn test_non_member_cannot_resolve() {
    let h = harness();
    let (_, escalation_id) = escalate(&h);
    let outsider = approver(&["finance-gov"]);
    assert!(matches!(
        h.escalations.approve(
            &tenant(),
            &escalation_id,
            &outsider,
            Resolution {
                notes: None,
                trace_id: None
            }
        ),
        Err(EscalationError::Forbidden)
    ));
}

/// Tests the timeout sweep boundary: strictly before the deadline nothing
/// sweeps; at the deadline the escalation times out and auto-denies.
#[test]
fn test_timeout_sweep_boundary_and_auto_deny() {
    let h = harness();
    let (intent_id, escalation_id) = escalate(&h);

    h.clock.advance_millis(3_599_999);
    let early = h.escalations.sweep_timeouts(100).unwrap();
    assert!(early.timed_out.is_empty(), "strictly before the deadline must not sweep");

    h.clock.advance_millis(1);
    let outcome = h.escalations.sweep_timeouts(100).unwrap();
    assert_eq!(outcome.timed_out.len(), 1);
    assert_eq!(outcome.timed_out[0].id, escalation_id);
    assert_eq!(outcome.notifications.len(), 1);

    let escalation = h.escalations.get(&tenant(), &escalation_id).unwrap();
    assert_eq!(escalation.status, EscalationStatus::Timeout);
    assert!(escalation.sla_breached);
    assert_eq!(h.lifecycle.get(&tenant(), &intent_id).unwrap().status, IntentStatus::Denied);
}

/// Tests only one active escalation may exist per intent.
#[test]
fn test_single_active_escalation_per_intent() {
    let h = harness();
    let op = OperationContext::system();
    let (intent_id, _) = escalate(&h);
    // A second decision application against the escalated intent conflicts
    // before it could ever create a second escalation.
    assert!(h
        .lifecycle
        .apply_decision(&tenant(), &intent_id, &escalate_decision(), false, &op)
        .is_err());
}

/// Tests cancelling an escalated intent cancels its escalation.
#[test]
fn test_cancel_escalated_intent_cancels_escalation() {
    let h = harness();
    let op = OperationContext::system();
    let (intent_id, escalation_id) = escalate(&h);
    h.lifecycle.cancel(&tenant(), &intent_id, "withdrawn", &op).unwrap();
    let escalation = h.escalations.get(&tenant(), &escalation_id).unwrap();
    assert_eq!(escalation.status, EscalationStatus::Cancelled);
}

// ============================================================================
// SECTION: Chain Verification
// ============================================================================

/// Tests tampering with one event is detected at its sequence and does not
/// affect other intents.
#[test]
fn test_tamper_detection_is_localized() {
    let h = harness();
    let op = OperationContext::system();
    let first = h.lifecycle.submit(&tenant(), submission("goal one"), &op).unwrap();
    let second = h.lifecycle.submit(&tenant(), submission("goal two"), &op).unwrap();
    let id = first.intent.id.clone();
    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    h.lifecycle.apply_decision(&tenant(), &id, &allow_decision(), false, &op).unwrap();

    h.store.tamper_event_hash(&id, 2, HashDigest::from_hex("deadbeef")).unwrap();

    let report = h.lifecycle.verify_chain(&tenant(), &id).unwrap();
    assert!(!report.valid);
    assert_eq!(report.invalid_at, Some(2));

    let other = h.lifecycle.verify_chain(&tenant(), &second.intent.id).unwrap();
    assert!(other.valid, "tampering must not affect other intents");
}

/// Tests verification before and after an append both hold, with the count
/// advancing by one.
#[test]
fn test_verify_before_and_after_append() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let id = outcome.intent.id.clone();
    let before = h.lifecycle.verify_chain(&tenant(), &id).unwrap();
    assert!(before.valid);

    h.lifecycle.begin_evaluation(&tenant(), &id, &snapshot(&h), &op).unwrap();
    let after = h.lifecycle.verify_chain(&tenant(), &id).unwrap();
    assert!(after.valid);
    assert_eq!(after.event_count, before.event_count + 1);
}

// ============================================================================
// SECTION: Tenant Isolation
// ============================================================================

/// Tests reads from a foreign tenant are not-found, never leaked.
#[test]
fn test_tenant_isolation_on_reads() {
    let h = harness();
    let op = OperationContext::system();
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    let foreign = TenantId::new("tenant-2");
    assert!(matches!(
        h.lifecycle.get(&foreign, &outcome.intent.id),
        Err(LifecycleError::NotFound(_))
    ));
    assert!(h.store.get_intent(&foreign, &outcome.intent.id).unwrap().is_none());
}
