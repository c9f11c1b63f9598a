// intent-gate-server/src/routes/mod.rs
// ============================================================================
// Module: API Routes
// Description: Router assembly and operational endpoints.
// Purpose: Mount the versioned governance API and the health/readiness/
//          metrics/scheduler surfaces.
// Dependencies: axum, crate::{auth, error, state}
// ============================================================================

//! ## Overview
//! Every governance route lives under `/api/v1` and runs the same edge
//! sequence: extract principal, token checks, role table, then the handler.
//! Operational endpoints are unauthenticated by design; the fronting
//! transport restricts their exposure.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod admin;
pub mod audit;
pub mod escalations;
pub mod intents;
pub mod policies;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use intent_gate_core::AuditStore;
use intent_gate_core::FastStore;
use serde_json::json;

use crate::state::AppState;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/intents", post(intents::submit).get(intents::list))
        .route("/intents/{id}", get(intents::fetch).delete(intents::remove))
        .route("/intents/{id}/cancel", post(intents::cancel))
        .route("/intents/{id}/replay", post(intents::replay))
        .route("/intents/{id}/verify", get(intents::verify))
        .route("/intents/{id}/events", get(intents::events))
        .route("/escalations", get(escalations::list))
        .route("/escalations/{id}", get(escalations::fetch))
        .route("/escalations/{id}/acknowledge", post(escalations::acknowledge))
        .route("/escalations/{id}/approve", post(escalations::approve))
        .route("/escalations/{id}/reject", post(escalations::reject))
        .route("/policies", post(policies::create).get(policies::list))
        .route(
            "/policies/{id}",
            get(policies::fetch).put(policies::update).delete(policies::remove),
        )
        .route("/policies/{id}/publish", post(policies::publish))
        .route("/policies/{id}/deprecate", post(policies::deprecate))
        .route("/policies/{id}/archive", post(policies::archive))
        .route("/audit", get(audit::query))
        .route("/audit/stats", get(audit::stats))
        .route("/audit/verify", post(audit::verify))
        .route("/audit/target/{target_type}/{target_id}", get(audit::for_target))
        .route("/audit/trace/{trace_id}", get(audit::by_trace))
        .route("/audit/{id}", get(audit::fetch))
        .route("/auth/logout", post(admin::logout))
        .route("/admin/users/{user_id}/revoke-tokens", post(admin::revoke_user_tokens))
        .route("/admin/dead-letters", get(admin::dead_letters))
        .route("/admin/dead-letters/{job_id}/retry", post(admin::retry_dead_letter))
        .route("/admin/cleanup", post(admin::run_cleanup));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/scheduler", get(scheduler))
        .layer(axum::middleware::from_fn(request_log))
        .with_state(state)
}

/// Structured request log line for every handled request.
async fn request_log(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = std::time::Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request"
    );
    response
}

// ============================================================================
// SECTION: Operational Endpoints
// ============================================================================

/// Liveness: self-check only.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Readiness: bounded checks of the store, fast store, and queue.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Probe the dependencies; networked backends must not hang the probe.
    let probe = tokio::time::timeout(Duration::from_millis(500), async {
        let store_ok =
            state.store.last_audit_sequence(&intent_gate_core::TenantId::new("__probe")).is_ok();
        let fast_ok = state.fast.counter("__probe").is_ok();
        (store_ok, fast_ok)
    })
    .await;
    let (store_ok, fast_ok) = probe.unwrap_or((false, false));
    let depths = state.queue.depths();

    let checks = json!({
        "store": if store_ok { "ready" } else { "unhealthy" },
        "fastStore": if fast_ok { "ready" } else { "unhealthy" },
        "queue": {
            "status": "ready",
            "intake": depths.intake,
            "evaluate": depths.evaluate,
            "decision": depths.decision,
            "deadLetter": depths.dead_letter,
        },
    });
    let all_ok = store_ok && fast_ok;
    let overall = if all_ok { "ready" } else { "unhealthy" };
    let status = if all_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({"status": overall, "checks": checks})))
}

/// Prometheus exposition.
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.set_queue_depths(state.queue.depths());
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Scheduler leader state and task list.
async fn scheduler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state
        .scheduler_status
        .lock()
        .map_or_else(|_| intent_gate_runtime::SchedulerStatus::default(), |status| status.clone());
    Json(json!({"scheduler": status}))
}
