// intent-gate-server/src/routes/audit.rs
// ============================================================================
// Module: Audit Routes
// Description: Audit query and chain verification handlers.
// Purpose: Expose the audit logger under `/api/v1/audit`.
// Dependencies: axum, intent-gate-core, crate::{auth, error, state}
// ============================================================================

//! ## Overview
//! Reads require the auditor (or admin) role; chain verification is
//! admin-only. Every query is tenant-scoped through the principal; there is
//! no cross-tenant read path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::Response;
use intent_gate_core::AuditCategory;
use intent_gate_core::AuditId;
use intent_gate_core::AuditOutcome;
use intent_gate_core::AuditQuery;
use intent_gate_core::AuditSeverity;
use intent_gate_core::Timestamp;
use intent_gate_core::TraceId;
use intent_gate_core::runtime::Operation;
use serde::Deserialize;
use serde_json::json;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Audit query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct QueryParams {
    /// Category filter.
    pub category: Option<AuditCategory>,
    /// Event type filter.
    pub event_type: Option<String>,
    /// Minimum severity filter.
    pub min_severity: Option<AuditSeverity>,
    /// Outcome filter.
    pub outcome: Option<AuditOutcome>,
    /// Actor identifier filter.
    pub actor_id: Option<String>,
    /// Inclusive lower bound, epoch milliseconds.
    pub from: Option<i64>,
    /// Exclusive upper bound, epoch milliseconds.
    pub until: Option<i64>,
    /// Maximum records, clamped to 100.
    pub limit: Option<u32>,
    /// Keyset cursor: records strictly below this sequence.
    pub before_sequence: Option<u64>,
}

/// Stats query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StatsParams {
    /// Inclusive lower bound, epoch milliseconds.
    pub from: Option<i64>,
    /// Exclusive upper bound, epoch milliseconds.
    pub until: Option<i64>,
}

/// Verification request body.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct VerifyBody {
    /// First sequence to verify; defaults to 1.
    pub start_sequence: Option<u64>,
    /// Maximum links to verify; defaults to the chain head.
    pub limit: Option<u64>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// GET /api/v1/audit: filtered query, newest first.
pub async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AuditRead)?;
    let filter = AuditQuery {
        event_category: params.category,
        event_type: params.event_type,
        min_severity: params.min_severity,
        outcome: params.outcome,
        actor_id: params.actor_id,
        from: params.from.map(Timestamp::from_unix_millis),
        until: params.until.map(Timestamp::from_unix_millis),
        limit: params.limit,
        before_sequence: params.before_sequence,
    };
    let records = state.audit.query(&authed.principal.tenant_id, &filter)?;
    Ok(Json(json!({"items": records})).into_response())
}

/// GET /api/v1/audit/{id}: fetch by identifier.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AuditRead)?;
    let record = state
        .audit
        .find_by_id(&authed.principal.tenant_id, &AuditId::new(id.clone()))?
        .ok_or_else(|| ApiError::not_found("AUDIT_NOT_FOUND", format!("audit record {id}")))?;
    Ok(Json(json!({"record": record})).into_response())
}

/// GET /api/v1/audit/target/{target_type}/{target_id}: records for one
/// resource.
pub async fn for_target(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((target_type, target_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AuditRead)?;
    let records =
        state.audit.get_for_target(&authed.principal.tenant_id, &target_type, &target_id)?;
    Ok(Json(json!({"items": records})).into_response())
}

/// GET /api/v1/audit/trace/{trace_id}: records correlated by trace.
pub async fn by_trace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trace_id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AuditRead)?;
    let records =
        state.audit.get_by_trace(&authed.principal.tenant_id, &TraceId::new(trace_id))?;
    Ok(Json(json!({"items": records})).into_response())
}

/// GET /api/v1/audit/stats: aggregates over a time range.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<StatsParams>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AuditRead)?;
    let stats = state.audit.get_stats(
        &authed.principal.tenant_id,
        params.from.map_or(Timestamp::from_unix_millis(0), Timestamp::from_unix_millis),
        params.until.map_or(Timestamp::from_unix_millis(i64::MAX), Timestamp::from_unix_millis),
    )?;
    Ok(Json(json!({"stats": stats})).into_response())
}

/// POST /api/v1/audit/verify: admin chain verification.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::AuditVerify)?;
    let report = state.audit.verify_chain_integrity(
        &authed.principal.tenant_id,
        body.start_sequence,
        body.limit,
    )?;
    Ok(Json(json!({"verification": report})).into_response())
}
