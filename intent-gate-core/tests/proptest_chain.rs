// intent-gate-core/tests/proptest_chain.rs
// ============================================================================
// Module: Chain Property Tests
// Description: Property-based checks for ledger chain sealing and
//              verification.
// ============================================================================
//! ## Overview
//! Properties: any sealed chain verifies; mutating any single link breaks
//! verification at (or before) that link; dedupe hashing is stable under
//! goal whitespace and key-order permutations.

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

use intent_gate_core::GENESIS_PREVIOUS_HASH;
use intent_gate_core::HashDigest;
use intent_gate_core::IntentEventType;
use intent_gate_core::IntentId;
use intent_gate_core::PendingIntentEvent;
use intent_gate_core::TenantId;
use intent_gate_core::Timestamp;
use intent_gate_core::core::hashing::dedupe_hash;
use intent_gate_core::core::intent::verify_event_chain;
use proptest::prelude::*;

/// Seals a chain of `payloads.len()` events.
fn build_chain(payloads: &[i64]) -> Vec<intent_gate_core::IntentEvent> {
    let intent_id = IntentId::new("intent-prop");
    let tenant_id = TenantId::new("tenant-prop");
    let mut previous = HashDigest::from_hex(GENESIS_PREVIOUS_HASH);
    let mut events = Vec::with_capacity(payloads.len());
    for (index, payload) in payloads.iter().enumerate() {
        let sequence = index as u64 + 1;
        let event = PendingIntentEvent::new(
            intent_id.clone(),
            tenant_id.clone(),
            IntentEventType::Evaluating,
            serde_json::json!({"value": payload}),
            Timestamp::from_unix_millis(sequence as i64),
        )
        .seal(sequence, previous.clone())
        .unwrap();
        previous = event.event_hash.clone();
        events.push(event);
    }
    events
}

proptest! {
    /// Any sealed chain verifies end to end.
    #[test]
    fn prop_sealed_chains_verify(payloads in prop::collection::vec(any::<i64>(), 1..32)) {
        let events = build_chain(&payloads);
        let report = verify_event_chain(&events).unwrap();
        prop_assert!(report.valid);
        prop_assert_eq!(report.event_count, payloads.len() as u64);
    }

    /// Mutating any single payload breaks verification at that link.
    #[test]
    fn prop_payload_mutation_detected(
        payloads in prop::collection::vec(any::<i64>(), 2..24),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut events = build_chain(&payloads);
        let index = victim.index(events.len());
        events[index].payload = serde_json::json!({"value": "tampered"});
        let report = verify_event_chain(&events).unwrap();
        prop_assert!(!report.valid);
        prop_assert_eq!(report.invalid_at, Some(index as u64 + 1));
    }

    /// Dedupe hashing ignores goal whitespace runs and casing.
    #[test]
    fn prop_dedupe_goal_normalization(words in prop::collection::vec("[a-z]{1,8}", 1..6)) {
        let goal = words.join(" ");
        let noisy = words.join("   ");
        let context = serde_json::json!({});
        let clean = dedupe_hash("t", "e", &goal, &context).unwrap();
        let spaced = dedupe_hash("t", "e", &noisy, &context).unwrap();
        let upper = dedupe_hash("t", "e", &goal.to_uppercase(), &context).unwrap();
        prop_assert_eq!(&clean, &spaced);
        prop_assert_eq!(&clean, &upper);
    }

    /// Dedupe hashing separates differing goals.
    #[test]
    fn prop_dedupe_separates_goals(a in "[a-z]{3,12}", b in "[a-z]{3,12}") {
        prop_assume!(a != b);
        let context = serde_json::json!({});
        let left = dedupe_hash("t", "e", &a, &context).unwrap();
        let right = dedupe_hash("t", "e", &b, &context).unwrap();
        prop_assert_ne!(left, right);
    }
}
