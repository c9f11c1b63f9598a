// system-tests/src/lib.rs
// ============================================================================
// Module: System Test Harness
// Description: Spins the full pipeline (server, workers, scheduler) against
//              a file-backed database for end-to-end scenarios.
// Purpose: Provide the shared fixture and HTTP helpers for scenario suites.
// Dependencies: intent-gate-{config,server}, reqwest, tempfile, tokio
// ============================================================================

//! ## Overview
//! Each test boots the real system: `SQLite` store on a temp file, the
//! in-process queue with live workers, the scheduler on a fast cadence, and
//! the HTTP server on an ephemeral port. Requests authenticate with the
//! trusted principal-envelope header the transport layer would inject.

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
    clippy::missing_panics_doc,
    reason = "Test harness; panic-based assertions are permitted."
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use intent_gate_config::IntentGateConfig;
use intent_gate_server::AppState;
use intent_gate_server::PRINCIPAL_HEADER;
use intent_gate_server::SystemHooks;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

/// Running system under test.
pub struct TestSystem {
    /// Base URL of the HTTP server.
    pub base: String,
    /// Shared HTTP client.
    pub client: reqwest::Client,
    /// Path to the backing database file.
    pub db_path: PathBuf,
    /// Shared handler state for direct assertions.
    pub state: Arc<AppState>,
    /// Temp directory keeping the database alive.
    _dir: TempDir,
}

/// Boots the full system with fast scheduler cadences.
pub async fn spawn_system() -> TestSystem {
    spawn_system_with_rate_limit(600).await
}

/// Boots the full system with a custom per-tenant submission rate limit.
pub async fn spawn_system_with_rate_limit(submit_rate_limit: u32) -> TestSystem {
    boot(submit_rate_limit, SystemHooks::default()).await
}

/// Boots the full system with the evaluate stage parked on a hold.
///
/// The worker will not write a decision until the returned hold receives a
/// permit, so suites can race cancellation against a pending decision on a
/// guaranteed path.
pub async fn spawn_system_gated() -> (TestSystem, Arc<tokio::sync::Semaphore>) {
    let hold = Arc::new(tokio::sync::Semaphore::new(0));
    let system = boot(
        600,
        SystemHooks {
            evaluation_hold: Some(Arc::clone(&hold)),
        },
    )
    .await;
    (system, hold)
}

/// Boots the server, workers, and scheduler over a temp-file database.
async fn boot(submit_rate_limit: u32, hooks: SystemHooks) -> TestSystem {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("intent-gate.db");
    let raw = format!(
        r#"
[signing]
default_key_base64 = "c3lzdGVtLXRlc3Qtc2lnbmluZy1rZXk="

[server]
bind_addr = "127.0.0.1:0"

[store]
path = "{}"

[scheduler]
sweep_interval_ms = 100
cleanup_interval_ms = 60000
checkpoint_interval_ms = 60000

[lifecycle]
dedupe_ttl_ms = 10000
submit_rate_limit = {submit_rate_limit}
"#,
        db_path.display()
    );
    let config = IntentGateConfig::from_toml(&raw).unwrap();
    let system = intent_gate_server::build_system_with_hooks(&config, hooks).unwrap();
    let router = intent_gate_server::app(Arc::clone(&system.state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum_serve(listener, router).await;
    });
    TestSystem {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        db_path,
        state: system.state,
        _dir: dir,
    }
}

/// Serves the router on the listener (extracted for the spawn above).
async fn axum_serve(
    listener: tokio::net::TcpListener,
    router: axum::Router,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

/// Builds a principal-envelope header value.
#[must_use]
pub fn principal(tenant: &str, sub: &str, jti: &str, roles: &[&str], groups: &[&str]) -> String {
    json!({
        "sub": sub,
        "tenant_id": tenant,
        "jti": jti,
        "iat": 1_000,
        "exp": i64::MAX,
        "roles": roles,
        "groups": groups,
    })
    .to_string()
}

/// Admin principal for the given tenant.
#[must_use]
pub fn admin(tenant: &str) -> String {
    principal(tenant, "admin-1", "jti-admin", &["admin"], &[])
}

impl TestSystem {
    /// Sends a GET with the given principal envelope.
    pub async fn get(&self, path: &str, envelope: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base))
            .header(PRINCIPAL_HEADER, envelope)
            .send()
            .await
            .unwrap()
    }

    /// Sends a POST with the given principal envelope and JSON body.
    pub async fn post(&self, path: &str, envelope: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base))
            .header(PRINCIPAL_HEADER, envelope)
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Sends a DELETE with the given principal envelope.
    pub async fn delete(&self, path: &str, envelope: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{path}", self.base))
            .header(PRINCIPAL_HEADER, envelope)
            .send()
            .await
            .unwrap()
    }

    /// Publishes a policy: create as draft, then publish.
    pub async fn publish_policy(&self, envelope: &str, name: &str, definition: Value) -> String {
        let created = self
            .post(
                "/api/v1/policies",
                envelope,
                &json!({"name": name, "definition": definition}),
            )
            .await;
        assert_eq!(created.status(), 201, "policy create failed");
        let body: Value = created.json().await.unwrap();
        let id = body["policy"]["id"].as_str().unwrap().to_string();
        let published =
            self.post(&format!("/api/v1/policies/{id}/publish"), envelope, &json!({})).await;
        assert_eq!(published.status(), 200, "policy publish failed");
        id
    }

    /// Submits an intent and returns its identifier.
    pub async fn submit_intent(&self, envelope: &str, body: Value) -> String {
        let response = self.post("/api/v1/intents", envelope, &body).await;
        assert!(
            response.status() == 202 || response.status() == 200,
            "submit failed: {}",
            response.status()
        );
        let body: Value = response.json().await.unwrap();
        body["intent"]["id"].as_str().unwrap().to_string()
    }

    /// Polls an intent until its status matches, or panics after ~5s.
    pub async fn await_status(&self, envelope: &str, id: &str, wanted: &str) -> Value {
        for _ in 0..250 {
            let response = self.get(&format!("/api/v1/intents/{id}"), envelope).await;
            assert_eq!(response.status(), 200);
            let body: Value = response.json().await.unwrap();
            if body["intent"]["status"] == wanted {
                return body["intent"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("intent {id} never reached status {wanted}");
    }

    /// Polls the intent's evaluation trace until a row at `stage` appears.
    pub async fn await_evaluation_stage(&self, envelope: &str, id: &str, stage: &str) -> Value {
        for _ in 0..250 {
            let response = self
                .get(&format!("/api/v1/intents/{id}?include=evaluations"), envelope)
                .await;
            assert_eq!(response.status(), 200);
            let body: Value = response.json().await.unwrap();
            let row = body["evaluations"]
                .as_array()
                .and_then(|rows| rows.iter().find(|row| row["stage"] == stage));
            if let Some(row) = row {
                return row.clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("intent {id} never recorded evaluation stage {stage}");
    }

    /// Returns the single escalation for the tenant, polling until present.
    pub async fn await_escalation(&self, envelope: &str) -> Value {
        for _ in 0..250 {
            let response = self.get("/api/v1/escalations", envelope).await;
            assert_eq!(response.status(), 200);
            let body: Value = response.json().await.unwrap();
            if let Some(first) = body["items"].as_array().and_then(|items| items.first()) {
                return first.clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no escalation appeared");
    }
}

/// Allow-everything policy definition for one intent type.
#[must_use]
pub fn allow_policy(intent_type: &str) -> Value {
    json!({
        "rules": [{
            "id": "allow-typed",
            "priority": 0,
            "when": {"field": "intent.type", "op": "eq", "value": intent_type},
            "then": {"action": "allow", "reason": "typed-allow"}
        }],
        "defaultAction": "deny",
        "defaultReason": "default-action"
    })
}
