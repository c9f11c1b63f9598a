// intent-gate-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Durable round-trips, compare-and-set semantics, append-only
//              triggers, and chain continuity.
// ============================================================================
//! ## Overview
//! Exercises the durable store against the same contracts the in-memory
//! store satisfies, plus storage-layer guarantees only a database can show:
//! append-only triggers and persistence across reopen.

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

use std::collections::BTreeMap;

use intent_gate_core::AuditActor;
use intent_gate_core::AuditCategory;
use intent_gate_core::AuditId;
use intent_gate_core::AuditOutcome;
use intent_gate_core::AuditSeverity;
use intent_gate_core::AuditStore;
use intent_gate_core::AuditTarget;
use intent_gate_core::EntityId;
use intent_gate_core::EscalationStore;
use intent_gate_core::Intent;
use intent_gate_core::IntentChange;
use intent_gate_core::IntentEventType;
use intent_gate_core::IntentFilter;
use intent_gate_core::IntentId;
use intent_gate_core::IntentStatus;
use intent_gate_core::IntentStore;
use intent_gate_core::PageRequest;
use intent_gate_core::PendingAuditRecord;
use intent_gate_core::PendingIntentEvent;
use intent_gate_core::PolicyStore;
use intent_gate_core::RevocationStore;
use intent_gate_core::SigningKeys;
use intent_gate_core::StoreError;
use intent_gate_core::TenantId;
use intent_gate_core::Timestamp;
use intent_gate_core::core::hashing::dedupe_hash;
use intent_gate_core::core::intent::verify_event_chain;
use intent_gate_store_sqlite::SqliteGovernanceStore;
use intent_gate_store_sqlite::SqliteStoreConfig;
use serde_json::json;

/// Opens an in-memory store for one test.
fn store() -> SqliteGovernanceStore {
    SqliteGovernanceStore::open_in_memory(SigningKeys::new(b"test-signing-key".to_vec())).unwrap()
}

/// Default test tenant.
fn tenant() -> TenantId {
    TenantId::new("tenant-1")
}

/// Builds a pending intent with the given id and goal.
fn intent(id: &str, goal: &str, at: i64) -> Intent {
    let context = json!({"scope": "test"});
    Intent {
        id: IntentId::new(id),
        tenant_id: tenant(),
        entity_id: EntityId::new("entity-1"),
        goal: goal.to_string(),
        intent_type: Some("read.public".to_string()),
        priority: 0,
        context: context.clone(),
        metadata: BTreeMap::new(),
        status: IntentStatus::Pending,
        trust_snapshot: None,
        trust_level: None,
        trust_score: None,
        policy_version: None,
        dedupe_hash: dedupe_hash("tenant-1", "entity-1", goal, &context).unwrap(),
        idempotency_key: None,
        cancellation_reason: None,
        created_at: Timestamp::from_unix_millis(at),
        updated_at: Timestamp::from_unix_millis(at),
        evaluated_at: None,
        decided_at: None,
        completed_at: None,
        deleted_at: None,
    }
}

/// Builds a submitted ledger event for an intent.
fn submitted_event(id: &str, at: i64) -> PendingIntentEvent {
    PendingIntentEvent::new(
        IntentId::new(id),
        tenant(),
        IntentEventType::Submitted,
        json!({"goal": "test"}),
        Timestamp::from_unix_millis(at),
    )
}

/// Builds an intent-category audit record.
fn audit(action: &str, at: i64) -> PendingAuditRecord {
    PendingAuditRecord {
        id: AuditId::generate(),
        tenant_id: tenant(),
        event_type: format!("intent.{action}"),
        event_category: AuditCategory::Intent,
        severity: AuditSeverity::Info,
        actor: AuditActor::system(),
        target: AuditTarget {
            target_type: "intent".to_string(),
            target_id: "i".to_string(),
        },
        action: action.to_string(),
        outcome: AuditOutcome::Success,
        before: None,
        after: None,
        trace_id: None,
        span_id: None,
        created_at: Timestamp::from_unix_millis(at),
    }
}

/// Submits one intent and returns it.
fn submit(store: &SqliteGovernanceStore, id: &str, goal: &str, at: i64) -> Intent {
    store
        .submit_intent(&intent(id, goal, at), submitted_event(id, at), audit("submitted", at))
        .unwrap()
        .intent
}

// ============================================================================
// SECTION: Round Trips
// ============================================================================

/// Tests an intent row survives a full encode/decode cycle.
#[test]
fn test_intent_round_trip() {
    let s = store();
    let submitted = submit(&s, "i-1", "read public weather", 1_000);
    let loaded = s.get_intent(&tenant(), &submitted.id).unwrap().unwrap();
    assert_eq!(loaded, submitted);
}

/// Tests duplicate active dedupe hashes are rejected with the original id.
#[test]
fn test_duplicate_dedupe_rejected() {
    let s = store();
    submit(&s, "i-1", "same goal", 1_000);
    let err = s
        .submit_intent(
            &intent("i-2", "same goal", 2_000),
            submitted_event("i-2", 2_000),
            audit("submitted", 2_000),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateIntent { existing } if existing.as_str() == "i-1"));
}

/// Tests the compare-and-set transition writes event and audit atomically
/// and rejects stale expectations.
#[test]
fn test_transition_cas() {
    let s = store();
    let submitted = submit(&s, "i-1", "goal", 1_000);
    let change = IntentChange {
        status: Some(IntentStatus::Evaluating),
        updated_at: Some(Timestamp::from_unix_millis(2_000)),
        evaluated_at: Some(Timestamp::from_unix_millis(2_000)),
        ..IntentChange::default()
    };
    let receipt = s
        .transition_intent(
            &tenant(),
            &submitted.id,
            IntentStatus::Pending,
            change.clone(),
            PendingIntentEvent::new(
                submitted.id.clone(),
                tenant(),
                IntentEventType::Evaluating,
                json!({}),
                Timestamp::from_unix_millis(2_000),
            ),
            audit("evaluating", 2_000),
        )
        .unwrap();
    assert_eq!(receipt.intent.status, IntentStatus::Evaluating);
    assert_eq!(receipt.event.sequence_number, 2);

    let stale = s.transition_intent(
        &tenant(),
        &submitted.id,
        IntentStatus::Pending,
        change,
        PendingIntentEvent::new(
            submitted.id.clone(),
            tenant(),
            IntentEventType::Evaluating,
            json!({}),
            Timestamp::from_unix_millis(3_000),
        ),
        audit("evaluating", 3_000),
    );
    assert!(matches!(stale, Err(StoreError::StatusConflict { .. })));
}

/// Tests the sealed ledger chain loaded from disk verifies.
#[test]
fn test_ledger_chain_verifies() {
    let s = store();
    let submitted = submit(&s, "i-1", "goal", 1_000);
    s.transition_intent(
        &tenant(),
        &submitted.id,
        IntentStatus::Pending,
        IntentChange {
            status: Some(IntentStatus::Evaluating),
            updated_at: Some(Timestamp::from_unix_millis(2_000)),
            ..IntentChange::default()
        },
        PendingIntentEvent::new(
            submitted.id.clone(),
            tenant(),
            IntentEventType::Evaluating,
            json!({}),
            Timestamp::from_unix_millis(2_000),
        ),
        audit("evaluating", 2_000),
    )
    .unwrap();
    let events = s.list_events(&tenant(), &submitted.id).unwrap();
    assert_eq!(events.len(), 2);
    assert!(verify_event_chain(&events).unwrap().valid);
}

// ============================================================================
// SECTION: Keyset Pagination
// ============================================================================

/// Tests keyset pagination walks the full set without overlap.
#[test]
fn test_keyset_pagination() {
    let s = store();
    for index in 0..7 {
        submit(&s, &format!("i-{index}"), &format!("goal {index}"), 1_000 + index);
    }
    let first = s
        .list_intents(
            &tenant(),
            &IntentFilter::default(),
            &PageRequest {
                cursor: None,
                limit: Some(3),
            },
        )
        .unwrap();
    assert_eq!(first.items.len(), 3);
    let second = s
        .list_intents(
            &tenant(),
            &IntentFilter::default(),
            &PageRequest {
                cursor: first.next.clone(),
                limit: Some(3),
            },
        )
        .unwrap();
    assert_eq!(second.items.len(), 3);
    let third = s
        .list_intents(
            &tenant(),
            &IntentFilter::default(),
            &PageRequest {
                cursor: second.next.clone(),
                limit: Some(3),
            },
        )
        .unwrap();
    assert_eq!(third.items.len(), 1);
    assert!(third.next.is_none());

    let mut seen: Vec<String> = first
        .items
        .iter()
        .chain(second.items.iter())
        .chain(third.items.iter())
        .map(|row| row.id.to_string())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 7, "pages must not overlap or skip");
}

// ============================================================================
// SECTION: Append-Only Enforcement
// ============================================================================

/// Tests audit and ledger rows reject updates and deletes at the storage
/// layer, not just through the API.
#[test]
fn test_append_only_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gate.db");
    let config = SqliteStoreConfig::new(&path);
    let s =
        SqliteGovernanceStore::open(&config, SigningKeys::new(b"test-signing-key".to_vec()))
            .unwrap();
    submit(&s, "i-1", "goal", 1_000);
    drop(s);

    // A second connection bypassing the store API still hits the triggers.
    let raw = rusqlite::Connection::open(&path).unwrap();
    let update = raw.execute("UPDATE audit_records SET action = 'tampered'", []);
    assert!(update.is_err(), "audit update must abort");
    let delete = raw.execute("DELETE FROM audit_records", []);
    assert!(delete.is_err(), "audit delete must abort");
    let event_update = raw.execute("UPDATE intent_events SET event_hash = 'deadbeef'", []);
    assert!(event_update.is_err(), "ledger update must abort");
}

/// Tests persistence across close and reopen on the same file.
#[test]
fn test_reopen_preserves_chains() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gate.db");
    let config = SqliteStoreConfig::new(&path);
    let keys = SigningKeys::new(b"test-signing-key".to_vec());
    {
        let s = SqliteGovernanceStore::open(&config, keys.clone()).unwrap();
        submit(&s, "i-1", "goal", 1_000);
    }
    let reopened = SqliteGovernanceStore::open(&config, keys).unwrap();
    let loaded = reopened.get_intent(&tenant(), &IntentId::new("i-1")).unwrap();
    assert!(loaded.is_some());
    let events = reopened.list_events(&tenant(), &IntentId::new("i-1")).unwrap();
    assert!(verify_event_chain(&events).unwrap().valid);
    assert_eq!(reopened.last_audit_sequence(&tenant()).unwrap(), 1);
}

// ============================================================================
// SECTION: Policies and Revocations
// ============================================================================

/// Tests publish atomically deprecates the previous published version.
#[test]
fn test_publish_deprecates_previous() {
    use intent_gate_core::Policy;
    use intent_gate_core::PolicyDefinition;
    use intent_gate_core::PolicyId;
    use intent_gate_core::PolicyStatus;
    use intent_gate_core::RuleAction;

    let s = store();
    let definition = PolicyDefinition {
        target: intent_gate_core::PolicyTarget::default(),
        priority: 0,
        rules: vec![],
        default_action: RuleAction::Allow,
        default_reason: None,
    };
    let checksum = definition.checksum().unwrap();
    for (id, version) in [("p-1", 1_i64), ("p-2", 2)] {
        let policy = Policy {
            id: PolicyId::new(id),
            tenant_id: tenant(),
            name: "gate".to_string(),
            namespace: intent_gate_core::NamespaceId::default_namespace(),
            version,
            status: PolicyStatus::Draft,
            definition: definition.clone(),
            checksum: checksum.clone(),
            created_at: Timestamp::from_unix_millis(1_000),
            updated_at: Timestamp::from_unix_millis(1_000),
        };
        s.create_policy(&policy, audit("policy", 1_000)).unwrap();
    }
    s.publish_policy(&tenant(), &PolicyId::new("p-1"), Timestamp::from_unix_millis(2_000), audit("policy", 2_000))
        .unwrap();
    s.publish_policy(&tenant(), &PolicyId::new("p-2"), Timestamp::from_unix_millis(3_000), audit("policy", 3_000))
        .unwrap();

    let published = s
        .published_policies(&tenant(), &intent_gate_core::NamespaceId::default_namespace())
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id.as_str(), "p-2");
    let deprecated = s.get_policy(&tenant(), &PolicyId::new("p-1")).unwrap().unwrap();
    assert_eq!(deprecated.status, PolicyStatus::Deprecated);
}

/// Tests revocation entries expire and garbage-collect.
#[test]
fn test_revocations_expire_and_purge() {
    let s = store();
    s.revoke_jti("jti-1", Timestamp::from_unix_millis(10_000)).unwrap();
    assert!(s.is_jti_revoked("jti-1", Timestamp::from_unix_millis(5_000)).unwrap());
    assert!(!s.is_jti_revoked("jti-1", Timestamp::from_unix_millis(10_000)).unwrap());
    assert_eq!(s.purge_expired_revocations(Timestamp::from_unix_millis(10_000)).unwrap(), 1);
    assert!(!s.is_jti_revoked("jti-1", Timestamp::from_unix_millis(5_000)).unwrap());
}

/// Tests escalation inserts enforce the single-active invariant.
#[test]
fn test_single_active_escalation_index() {
    use intent_gate_core::Escalation;
    use intent_gate_core::EscalationId;
    use intent_gate_core::EscalationStatus;
    use intent_gate_core::IntentTransition;

    let s = store();
    let submitted = submit(&s, "i-1", "goal", 1_000);
    s.transition_intent(
        &tenant(),
        &submitted.id,
        IntentStatus::Pending,
        IntentChange {
            status: Some(IntentStatus::Evaluating),
            updated_at: Some(Timestamp::from_unix_millis(2_000)),
            ..IntentChange::default()
        },
        PendingIntentEvent::new(
            submitted.id.clone(),
            tenant(),
            IntentEventType::Evaluating,
            json!({}),
            Timestamp::from_unix_millis(2_000),
        ),
        audit("evaluating", 2_000),
    )
    .unwrap();

    let escalation = Escalation {
        id: EscalationId::new("esc-1"),
        intent_id: submitted.id.clone(),
        tenant_id: tenant(),
        reason: "threshold".to_string(),
        reason_category: "policy".to_string(),
        escalated_to: "data-gov".to_string(),
        status: EscalationStatus::Pending,
        timeout_at: Timestamp::from_unix_millis(100_000),
        auto_deny_on_timeout: true,
        context: json!({}),
        acknowledged_at: None,
        resolved_by: None,
        resolved_at: None,
        resolution_notes: None,
        sla_breached: false,
        created_at: Timestamp::from_unix_millis(2_000),
        updated_at: Timestamp::from_unix_millis(2_000),
    };
    let transition = IntentTransition {
        expected: IntentStatus::Evaluating,
        change: IntentChange {
            status: Some(IntentStatus::Escalated),
            updated_at: Some(Timestamp::from_unix_millis(2_000)),
            ..IntentChange::default()
        },
        event: PendingIntentEvent::new(
            submitted.id.clone(),
            tenant(),
            IntentEventType::Escalated,
            json!({}),
            Timestamp::from_unix_millis(2_000),
        ),
    };
    s.insert_escalation(&escalation, transition.clone(), audit("escalated", 2_000)).unwrap();

    let mut duplicate = escalation;
    duplicate.id = EscalationId::new("esc-2");
    let err = s.insert_escalation(&duplicate, transition, audit("escalated", 3_000)).unwrap_err();
    assert!(matches!(err, StoreError::ActiveEscalationExists { .. }));
}
