// system-tests/tests/functional.rs
// ============================================================================
// Module: Functional Scenarios
// Description: End-to-end governance flows over the running system.
// ============================================================================
//! ## Overview
//! Drives the documented scenarios through the HTTP surface with live
//! workers: auto-approve, deny-by-default, threshold escalation with
//! rejection and timeout, duplicate collapse, and cancellation.

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

use serde_json::Value;
use serde_json::json;
use system_tests::admin;
use system_tests::allow_policy;
use system_tests::principal;
use system_tests::spawn_system;
use system_tests::spawn_system_gated;

/// Auto-approve: a published allow rule approves the matching intent with
/// three ledger events and passing chain verification.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_auto_approve() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system.publish_policy(&gov, "allow-public-reads", allow_policy("read.public")).await;

    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(
            &user,
            json!({"goal": "read public weather", "intentType": "read.public"}),
        )
        .await;
    let intent = system.await_status(&user, &id, "approved").await;
    assert_eq!(intent["policy_version"], 1);

    let events = system.get(&format!("/api/v1/intents/{id}/events"), &user).await;
    let body: Value = events.json().await.unwrap();
    let kinds: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["intent.submitted", "intent.evaluating", "intent.approved"]);

    let verify = system.get(&format!("/api/v1/intents/{id}/verify"), &user).await;
    let verification: Value = verify.json().await.unwrap();
    assert_eq!(verification["verification"]["valid"], true);
    assert_eq!(verification["verification"]["event_count"], 3);

    // Evaluation trace covers the snapshot, basis, policy, and decision
    // stages.
    let full = system
        .get(&format!("/api/v1/intents/{id}?include=events,evaluations"), &user)
        .await;
    let full: Value = full.json().await.unwrap();
    let stages: Vec<&str> = full["evaluations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["stage"].as_str().unwrap())
        .collect();
    assert!(stages.contains(&"trust-snapshot"));
    assert!(stages.contains(&"policy"));
    assert!(stages.contains(&"decision"));
}

/// Deny by default: no rule fires, the policy default denies with the
/// documented reason, and the chain stays valid.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_deny_by_default() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system.publish_policy(&gov, "allow-public-reads", allow_policy("read.public")).await;

    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(
            &user,
            json!({"goal": "move all the money", "intentType": "write.finance"}),
        )
        .await;
    let _ = system.await_status(&user, &id, "denied").await;

    let events = system.get(&format!("/api/v1/intents/{id}/events"), &user).await;
    let body: Value = events.json().await.unwrap();
    let denied = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .find(|event| event["event_type"] == "intent.denied")
        .unwrap();
    assert_eq!(denied["payload"]["reason"], "default-action");

    let verify = system.get(&format!("/api/v1/intents/{id}/verify"), &user).await;
    let verification: Value = verify.json().await.unwrap();
    assert_eq!(verification["verification"]["valid"], true);
}

/// Threshold escalation then rejection: the intent escalates, a member of
/// the target group rejects, and the intent lands denied.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_escalate_then_reject() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system
        .publish_policy(
            &gov,
            "export-guard",
            json!({
                "rules": [{
                    "id": "large-export",
                    "priority": 0,
                    "when": {"field": "intent.context.recordCount", "op": "gt", "value": 10_000},
                    "then": {
                        "action": "escalate",
                        "reason": "record-count-threshold",
                        "escalation": {
                            "to": "data-gov",
                            "timeoutMs": 3_600_000,
                            "autoDenyOnTimeout": true
                        }
                    }
                }],
                "defaultAction": "allow"
            }),
        )
        .await;

    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(
            &user,
            json!({
                "goal": "export customer records",
                "intentType": "data.export",
                "context": {"recordCount": 50_000}
            }),
        )
        .await;
    let _ = system.await_status(&user, &id, "escalated").await;

    let approver = principal("tenant-a", "approver-1", "jti-a1", &["approver"], &["data-gov"]);
    let escalation = system.await_escalation(&approver).await;
    assert_eq!(escalation["status"], "pending");
    assert_eq!(escalation["intent_id"], id.as_str());
    let escalation_id = escalation["id"].as_str().unwrap();

    let rejected = system
        .post(
            &format!("/api/v1/escalations/{escalation_id}/reject"),
            &approver,
            &json!({"notes": "not while the audit is open"}),
        )
        .await;
    assert_eq!(rejected.status(), 200);
    let _ = system.await_status(&user, &id, "denied").await;

    // A second resolution conflicts.
    let again = system
        .post(
            &format!("/api/v1/escalations/{escalation_id}/reject"),
            &approver,
            &json!({}),
        )
        .await;
    assert_eq!(again.status(), 409);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["error"]["code"], "ESCALATION_ALREADY_RESOLVED");
}

/// Escalation timeout: an unresolved escalation with auto-deny times out on
/// the scheduler tick and denies the intent.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_escalation_timeout_auto_denies() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system
        .publish_policy(
            &gov,
            "export-guard",
            json!({
                "rules": [{
                    "id": "large-export",
                    "priority": 0,
                    "when": {"field": "intent.context.recordCount", "op": "gt", "value": 10_000},
                    "then": {
                        "action": "escalate",
                        "escalation": {
                            "to": "data-gov",
                            "timeoutMs": 250,
                            "autoDenyOnTimeout": true
                        }
                    }
                }],
                "defaultAction": "allow"
            }),
        )
        .await;

    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(
            &user,
            json!({
                "goal": "export customer records",
                "intentType": "data.export",
                "context": {"recordCount": 50_000}
            }),
        )
        .await;
    let _ = system.await_status(&user, &id, "escalated").await;
    // The sweep runs on a 100ms cadence; the 250ms deadline passes shortly.
    let _ = system.await_status(&user, &id, "denied").await;

    let approver = principal("tenant-a", "approver-1", "jti-a1", &["approver"], &["data-gov"]);
    let escalation = system.await_escalation(&approver).await;
    assert_eq!(escalation["status"], "timeout");
    assert_eq!(escalation["sla_breached"], true);
}

/// Duplicate submission: the second identical call returns the same intent
/// and the ledger holds exactly one submitted event.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_duplicate_submission() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system.publish_policy(&gov, "allow-public-reads", allow_policy("read.public")).await;

    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let body = json!({"goal": "read public weather", "intentType": "read.public"});
    let first = system.submit_intent(&user, body.clone()).await;
    let second = system.submit_intent(&user, body).await;
    assert_eq!(first, second, "duplicate submissions must collapse");

    let events = system.get(&format!("/api/v1/intents/{first}/events"), &user).await;
    let body: Value = events.json().await.unwrap();
    let submitted = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|event| event["event_type"] == "intent.submitted")
        .count();
    assert_eq!(submitted, 1);
}

/// Cancel during evaluation: the evaluate stage is parked on a hold before
/// its terminal write, so cancellation always wins the race. The intent
/// lands `cancelled` with an evaluation row at stage `cancelled`, a second
/// cancel answers 409, and no decision event ever lands.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_cancel_during_evaluation() {
    let (system, hold) = spawn_system_gated().await;
    let gov = admin("tenant-a");
    // An allow policy that would approve this intent if the cancel lost.
    system.publish_policy(&gov, "allow-public-reads", allow_policy("read.public")).await;
    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(&user, json!({"goal": "read public weather", "intentType": "read.public"}))
        .await;

    // The worker reaches `evaluating`, then parks on the hold before the
    // decision write; with zero permits it cannot decide yet.
    let _ = system.await_status(&user, &id, "evaluating").await;
    let cancel = system
        .post(&format!("/api/v1/intents/{id}/cancel"), &user, &json!({"reason": "withdrawn"}))
        .await;
    assert_eq!(cancel.status(), 200);

    // Release the worker: its checkpoint must observe the cancellation and
    // abort instead of deciding.
    hold.add_permits(1);
    let intent = system.await_status(&user, &id, "cancelled").await;
    assert_eq!(intent["cancellation_reason"], "withdrawn");

    let row = system.await_evaluation_stage(&user, &id, "cancelled").await;
    assert_eq!(row["result"]["abortedStage"], "decision");

    let again = system
        .post(&format!("/api/v1/intents/{id}/cancel"), &user, &json!({"reason": "again"}))
        .await;
    assert_eq!(again.status(), 409);

    let events = system.get(&format!("/api/v1/intents/{id}/events"), &user).await;
    let body: Value = events.json().await.unwrap();
    for event in body["events"].as_array().unwrap() {
        assert_ne!(event["event_type"], "intent.approved");
        assert_ne!(event["event_type"], "intent.denied");
    }

    let verify = system.get(&format!("/api/v1/intents/{id}/verify"), &user).await;
    let verification: Value = verify.json().await.unwrap();
    assert_eq!(verification["verification"]["valid"], true);
}

/// Replay: a denied intent replays to pending and re-decides under the
/// current policy set.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_replay_denied() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system.publish_policy(&gov, "allow-public-reads", allow_policy("read.public")).await;

    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(&user, json!({"goal": "write thing", "intentType": "write.other"}))
        .await;
    let _ = system.await_status(&user, &id, "denied").await;

    // Publish an earlier-priority allow, then replay: the new decision
    // approves before the read policy's default deny is consulted.
    system
        .publish_policy(
            &gov,
            "allow-writes",
            json!({
                "priority": -1,
                "rules": [{
                    "id": "allow-writes",
                    "priority": 0,
                    "when": {"field": "intent.type", "op": "eq", "value": "write.other"},
                    "then": {"action": "allow"}
                }],
                "defaultAction": "monitor"
            }),
        )
        .await;
    let replayed = system.post(&format!("/api/v1/intents/{id}/replay"), &gov, &json!({})).await;
    assert_eq!(replayed.status(), 200);
    let _ = system.await_status(&user, &id, "approved").await;

    let events = system.get(&format!("/api/v1/intents/{id}/events"), &user).await;
    let body: Value = events.json().await.unwrap();
    let kinds: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event_type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"intent.replayed"));

    let verify = system.get(&format!("/api/v1/intents/{id}/verify"), &user).await;
    let verification: Value = verify.json().await.unwrap();
    assert_eq!(verification["verification"]["valid"], true);
}

/// Boundary checks: goal and priority limits reject at the edge.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_validation_boundaries() {
    let system = spawn_system().await;
    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);

    let max_goal = "g".repeat(1024);
    let ok = system
        .post("/api/v1/intents", &user, &json!({"goal": max_goal, "intentType": "read.public"}))
        .await;
    assert_eq!(ok.status(), 202);

    let long_goal = "g".repeat(1025);
    let too_long = system
        .post("/api/v1/intents", &user, &json!({"goal": long_goal}))
        .await;
    assert_eq!(too_long.status(), 422);

    let bad_priority = system
        .post("/api/v1/intents", &user, &json!({"goal": "x", "priority": 10}))
        .await;
    assert_eq!(bad_priority.status(), 422);

    let negative_priority = system
        .post("/api/v1/intents", &user, &json!({"goal": "x", "priority": -1}))
        .await;
    assert_eq!(negative_priority.status(), 422);
}

/// Soft delete: 204, redacted context, ledger preserved.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_soft_delete_redacts() {
    let system = spawn_system().await;
    let gov = admin("tenant-a");
    system.publish_policy(&gov, "allow-public-reads", allow_policy("read.public")).await;
    let user = principal("tenant-a", "entity-1", "jti-u1", &[], &[]);
    let id = system
        .submit_intent(
            &user,
            json!({
                "goal": "read public weather",
                "intentType": "read.public",
                "context": {"secret": "s3cr3t"}
            }),
        )
        .await;
    let _ = system.await_status(&user, &id, "approved").await;

    let deleted = system.delete(&format!("/api/v1/intents/{id}"), &gov).await;
    assert_eq!(deleted.status(), 204);

    // Soft-deleted intents may not be replayed.
    let replay = system.post(&format!("/api/v1/intents/{id}/replay"), &gov, &json!({})).await;
    assert_eq!(replay.status(), 400);
}
