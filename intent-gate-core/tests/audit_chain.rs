// intent-gate-core/tests/audit_chain.rs
// ============================================================================
// Module: Audit Chain Tests
// Description: Per-tenant audit sequencing, verification, and checkpoints.
// ============================================================================
//! ## Overview
//! Validates the per-tenant audit chain invariants: dense sequences, valid
//! recomputation, localized tamper detection, and incremental checkpoints.

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

use std::sync::Arc;

use intent_gate_core::AuditActor;
use intent_gate_core::AuditCategory;
use intent_gate_core::AuditId;
use intent_gate_core::AuditOutcome;
use intent_gate_core::AuditQuery;
use intent_gate_core::AuditSeverity;
use intent_gate_core::AuditStore;
use intent_gate_core::AuditTarget;
use intent_gate_core::HashDigest;
use intent_gate_core::ManualClock;
use intent_gate_core::PendingAuditRecord;
use intent_gate_core::SigningKeys;
use intent_gate_core::TenantId;
use intent_gate_core::Timestamp;
use intent_gate_core::runtime::AuditLogger;
use intent_gate_core::runtime::OperationContext;

use common::harness;
use common::submission;
use common::tenant;

/// Builds a pending audit record for the given tenant and action index.
fn record(tenant: &TenantId, index: u32) -> PendingAuditRecord {
    PendingAuditRecord {
        id: AuditId::generate(),
        tenant_id: tenant.clone(),
        event_type: "admin.test".to_string(),
        event_category: AuditCategory::Admin,
        severity: AuditSeverity::Info,
        actor: AuditActor::system(),
        target: AuditTarget {
            target_type: "tenant".to_string(),
            target_id: tenant.to_string(),
        },
        action: format!("test-{index}"),
        outcome: AuditOutcome::Success,
        before: None,
        after: None,
        trace_id: None,
        span_id: None,
        created_at: Timestamp::from_unix_millis(i64::from(index) * 1_000),
    }
}

/// Builds a logger over the harness store.
fn logger(
    h: &common::Harness,
) -> AuditLogger<intent_gate_core::InMemoryGovernanceStore, ManualClock> {
    AuditLogger::new(
        Arc::clone(&h.store),
        SigningKeys::new(b"test-signing-key".to_vec()),
        h.clock.clone(),
    )
}

/// Tests sequences are dense and the chain verifies.
#[test]
fn test_dense_sequence_and_valid_chain() {
    let h = harness();
    let log = logger(&h);
    for index in 0..10 {
        log.log(record(&tenant(), index)).unwrap();
    }
    let chain = h.store.audit_chain(&tenant(), 1, 100).unwrap();
    let sequences: Vec<u64> = chain.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());

    let report = log.verify_chain_integrity(&tenant(), None, None).unwrap();
    assert!(report.valid);
    assert_eq!(report.total_verified, 10);
}

/// Tests lifecycle operations co-commit audit records on the same chain.
#[test]
fn test_lifecycle_writes_audit_chain() {
    let h = harness();
    let op = OperationContext::system();
    let log = logger(&h);
    let outcome = h.lifecycle.submit(&tenant(), submission("goal"), &op).unwrap();
    h.lifecycle.cancel(&tenant(), &outcome.intent.id, "test", &op).unwrap();

    let report = log.verify_chain_integrity(&tenant(), None, None).unwrap();
    assert!(report.valid);
    assert!(report.total_verified >= 2, "submit and cancel must both audit");
}

/// Tests tamper detection reports the first broken sequence.
#[test]
fn test_tampered_record_detected() {
    let h = harness();
    let log = logger(&h);
    for index in 0..5 {
        log.log(record(&tenant(), index)).unwrap();
    }
    h.store.tamper_audit_hash(&tenant(), 3, HashDigest::from_hex("deadbeef")).unwrap();
    let report = log.verify_chain_integrity(&tenant(), None, None).unwrap();
    assert!(!report.valid);
    assert_eq!(report.first_invalid_sequence, Some(3));
}

/// Tests batches append atomically in input order.
#[test]
fn test_batch_append_order() {
    let h = harness();
    let log = logger(&h);
    let batch: Vec<_> = (0..4).map(|index| record(&tenant(), index)).collect();
    let sealed = log.log_batch(batch).unwrap();
    let sequences: Vec<u64> = sealed.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

/// Tests tenant chains are independent: writes to one never advance the
/// other.
#[test]
fn test_chains_are_per_tenant() {
    let h = harness();
    let log = logger(&h);
    let other = TenantId::new("tenant-2");
    log.log(record(&tenant(), 0)).unwrap();
    log.log(record(&other, 0)).unwrap();
    log.log(record(&tenant(), 1)).unwrap();

    assert_eq!(h.store.last_audit_sequence(&tenant()).unwrap(), 2);
    assert_eq!(h.store.last_audit_sequence(&other).unwrap(), 1);
    assert!(log.verify_chain_integrity(&other, None, None).unwrap().valid);
}

/// Tests queries are tenant-scoped and respect filters.
#[test]
fn test_query_filters() {
    let h = harness();
    let log = logger(&h);
    for index in 0..3 {
        log.log(record(&tenant(), index)).unwrap();
    }
    let mut error_record = record(&tenant(), 9);
    error_record.severity = AuditSeverity::Error;
    error_record.outcome = AuditOutcome::Failure;
    log.log(error_record).unwrap();

    let errors = log
        .query(
            &tenant(),
            &AuditQuery {
                min_severity: Some(AuditSeverity::Error),
                ..AuditQuery::default()
            },
        )
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].outcome, AuditOutcome::Failure);

    let foreign = log.query(&TenantId::new("tenant-2"), &AuditQuery::default()).unwrap();
    assert!(foreign.is_empty());
}

/// Tests stats aggregate by category, severity, and outcome.
#[test]
fn test_stats_aggregation() {
    let h = harness();
    let log = logger(&h);
    for index in 0..3 {
        log.log(record(&tenant(), index)).unwrap();
    }
    let stats = log
        .get_stats(
            &tenant(),
            Timestamp::from_unix_millis(0),
            Timestamp::from_unix_millis(i64::MAX),
        )
        .unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_category.get("admin"), Some(&3));
    assert_eq!(stats.by_outcome.get("success"), Some(&3));
}

/// Tests checkpoints advance to the head and resume verification from the
/// checkpointed prefix.
#[test]
fn test_checkpointing_resumes() {
    let h = harness();
    let log = logger(&h);
    for index in 0..6 {
        log.log(record(&tenant(), index)).unwrap();
    }
    let invalid = log.checkpoint_all().unwrap();
    assert!(invalid.is_empty());
    let checkpoint = h.store.latest_checkpoint(&tenant()).unwrap().unwrap();
    assert_eq!(checkpoint.up_to_sequence, 6);

    for index in 6..9 {
        log.log(record(&tenant(), index)).unwrap();
    }
    let invalid = log.checkpoint_all().unwrap();
    assert!(invalid.is_empty());
    let checkpoint = h.store.latest_checkpoint(&tenant()).unwrap().unwrap();
    assert_eq!(checkpoint.up_to_sequence, 9);
}

/// Tests a verification window bounded by start and limit.
#[test]
fn test_windowed_verification() {
    let h = harness();
    let log = logger(&h);
    for index in 0..8 {
        log.log(record(&tenant(), index)).unwrap();
    }
    let report = log.verify_chain_integrity(&tenant(), Some(3), Some(4)).unwrap();
    assert!(report.valid);
    assert_eq!(report.total_verified, 4);
}
