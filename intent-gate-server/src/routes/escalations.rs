// intent-gate-server/src/routes/escalations.rs
// ============================================================================
// Module: Escalation Routes
// Description: Escalation reads and human resolution handlers.
// Purpose: Expose the escalation service under `/api/v1/escalations`.
// Dependencies: axum, intent-gate-core, crate::{auth, error, state}
// ============================================================================

//! ## Overview
//! Resolution membership (tenant match plus `escalated_to` membership or an
//! admin role) is enforced inside the escalation service; the edge here only
//! runs the coarse role table.

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
use intent_gate_core::Cursor;
use intent_gate_core::EscalationFilter;
use intent_gate_core::EscalationId;
use intent_gate_core::EscalationStatus;
use intent_gate_core::PageRequest;
use intent_gate_core::Timestamp;
use intent_gate_core::runtime::Operation;
use intent_gate_core::runtime::Resolution;
use serde::Deserialize;
use serde_json::json;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Resolution request body.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResolutionBody {
    /// Resolver notes.
    pub notes: Option<String>,
}

/// List query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ListQuery {
    /// Status filter.
    pub status: Option<EscalationStatus>,
    /// Addressee filter.
    pub escalated_to: Option<String>,
    /// Cursor: created-at milliseconds of the previous page's last row.
    pub cursor_created_at: Option<i64>,
    /// Cursor: id of the previous page's last row.
    pub cursor_id: Option<String>,
    /// Page size, clamped to 100.
    pub limit: Option<u32>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// GET /api/v1/escalations: list with keyset pagination.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::EscalationRead)?;
    let filter = EscalationFilter {
        status: query.status,
        escalated_to: query.escalated_to.clone(),
    };
    let cursor = match (query.cursor_created_at, query.cursor_id.as_ref()) {
        (Some(created_at), Some(id)) => Some(Cursor {
            created_at: Timestamp::from_unix_millis(created_at),
            id: id.clone(),
        }),
        _ => None,
    };
    let page = state.escalations.list(
        &authed.principal.tenant_id,
        &filter,
        &PageRequest {
            cursor,
            limit: query.limit,
        },
    )?;
    Ok(Json(json!({"items": page.items, "next": page.next})).into_response())
}

/// GET /api/v1/escalations/{id}: fetch.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::EscalationRead)?;
    let escalation =
        state.escalations.get(&authed.principal.tenant_id, &EscalationId::new(id))?;
    Ok(Json(json!({"escalation": escalation})).into_response())
}

/// POST /api/v1/escalations/{id}/acknowledge: claim for SLA attribution.
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::EscalationResolve)?;
    let escalation = state.escalations.acknowledge(
        &authed.principal.tenant_id,
        &EscalationId::new(id),
        &authed.principal,
        authed.trace_id,
    )?;
    state.metrics.escalation("acknowledged");
    Ok(Json(json!({"escalation": escalation})).into_response())
}

/// POST /api/v1/escalations/{id}/approve: approve; the intent follows.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ResolutionBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::EscalationResolve)?;
    let escalation = state.escalations.approve(
        &authed.principal.tenant_id,
        &EscalationId::new(id),
        &authed.principal,
        Resolution {
            notes: body.notes,
            trace_id: authed.trace_id,
        },
    )?;
    state.metrics.escalation("approved");
    state.metrics.decision("allow");
    Ok(Json(json!({"escalation": escalation})).into_response())
}

/// POST /api/v1/escalations/{id}/reject: reject; the intent is denied.
pub async fn reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ResolutionBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::EscalationResolve)?;
    let escalation = state.escalations.reject(
        &authed.principal.tenant_id,
        &EscalationId::new(id),
        &authed.principal,
        Resolution {
            notes: body.notes,
            trace_id: authed.trace_id,
        },
    )?;
    state.metrics.escalation("rejected");
    state.metrics.decision("deny");
    Ok(Json(json!({"escalation": escalation})).into_response())
}
