// intent-gate-server/src/routes/admin.rs
// ============================================================================
// Module: Admin Routes
// Description: Token revocation, dead-letter operations, and manual
//              cleanup handlers.
// Purpose: Expose operator actions under `/api/v1/auth` and
//          `/api/v1/admin`.
// Dependencies: axum, intent-gate-core, crate::{auth, error, state}
// ============================================================================

//! ## Overview
//! Logout revokes the caller's JTI until its expiry; the admin revoke-all
//! path sets the user's revoke-before cutoff. Both write auth-category
//! audit records. Dead-letter retry and run-now cleanup are admin-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::Response;
use intent_gate_core::AuditCategory;
use intent_gate_core::AuditId;
use intent_gate_core::AuditOutcome;
use intent_gate_core::AuditSeverity;
use intent_gate_core::AuditTarget;
use intent_gate_core::JobId;
use intent_gate_core::JobQueue;
use intent_gate_core::PendingAuditRecord;
use intent_gate_core::PrincipalId;
use intent_gate_core::QueueError;
use intent_gate_core::RevocationStore;
use intent_gate_core::runtime::Operation;
use serde_json::json;

use crate::auth::AuthedRequest;
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an auth-category audit record.
fn auth_audit(
    state: &AppState,
    authed: &AuthedRequest,
    event_type: &str,
    action: &str,
    target_id: &str,
) -> PendingAuditRecord {
    PendingAuditRecord {
        id: AuditId::generate(),
        tenant_id: authed.principal.tenant_id.clone(),
        event_type: event_type.to_string(),
        event_category: AuditCategory::Auth,
        severity: AuditSeverity::Info,
        actor: authed.actor(),
        target: AuditTarget {
            target_type: "token".to_string(),
            target_id: target_id.to_string(),
        },
        action: action.to_string(),
        outcome: AuditOutcome::Success,
        before: None,
        after: None,
        trace_id: authed.trace_id.clone(),
        span_id: None,
        created_at: state.clock_now(),
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// POST /api/v1/auth/logout: revoke the current token's JTI until expiry.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // Logout is open to any authenticated principal.
    let authed = authenticate(&state, &headers, Operation::IntentRead)?;
    let jti = authed
        .principal
        .jti
        .clone()
        .ok_or_else(|| ApiError::unauthorized("token has no jti claim to revoke"))?;
    state
        .store
        .revoke_jti(&jti, authed.principal.exp)
        .map_err(|err| ApiError::internal(&err))?;
    state
        .audit
        .log(auth_audit(&state, &authed, "token.revoked", "logout", &jti))?;
    Ok(Json(json!({"revoked": true})).into_response())
}

/// POST /api/v1/admin/users/{user_id}/revoke-tokens: revoke-all for a user.
pub async fn revoke_user_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AdminRevokeTokens)?;
    let now = state.clock_now();
    state
        .store
        .set_revoke_before(&PrincipalId::new(user_id.clone()), now)
        .map_err(|err| ApiError::internal(&err))?;
    state.audit.log(auth_audit(
        &state,
        &authed,
        "token.user_all_revoked",
        "revoke_all",
        &user_id,
    ))?;
    Ok(Json(json!({"userId": user_id, "revokeBefore": now.as_unix_millis()})).into_response())
}

/// GET /api/v1/admin/dead-letters: list dead-lettered jobs.
pub async fn dead_letters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let _authed = authenticate(&state, &headers, Operation::AdminRetryDeadLetter)?;
    Ok(Json(json!({"items": state.queue.dead_letters()})).into_response())
}

/// POST /api/v1/admin/dead-letters/{job_id}/retry: re-enqueue on the
/// original stage.
pub async fn retry_dead_letter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let _authed = authenticate(&state, &headers, Operation::AdminRetryDeadLetter)?;
    state.queue.retry_dead_letter(&JobId::new(job_id.clone())).map_err(|err| match err {
        QueueError::DeadLetterNotFound(_) => {
            ApiError::not_found("DEAD_LETTER_NOT_FOUND", format!("dead-letter job {job_id}"))
        }
        QueueError::Unavailable(message) => ApiError::internal(&message),
    })?;
    Ok(Json(json!({"retried": job_id})).into_response())
}

/// POST /api/v1/admin/cleanup: run retention cleanup outside the schedule.
pub async fn run_cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let _authed = authenticate(&state, &headers, Operation::AdminRunCleanup)?;
    state.scheduler.run_cleanup(state.clock_now());
    Ok(Json(json!({"cleanup": "completed"})).into_response())
}
