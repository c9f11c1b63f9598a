// intent-gate-server/src/routes/intents.rs
// ============================================================================
// Module: Intent Routes
// Description: Submission, reads, cancel, delete, replay, and ledger
//              verification handlers.
// Purpose: Expose the lifecycle service under `/api/v1/intents`.
// Dependencies: axum, intent-gate-core, crate::{auth, error, state}
// ============================================================================

//! ## Overview
//! Handlers stay thin: authenticate, authorize, translate the wire shape,
//! call the lifecycle service, map the result. Submission answers `202` for
//! newly created intents and `200` for deduplicated repeats, both carrying
//! the governing record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use intent_gate_core::Cursor;
use intent_gate_core::EntityId;
use intent_gate_core::IntentFilter;
use intent_gate_core::IntentId;
use intent_gate_core::IntentStatus;
use intent_gate_core::PageRequest;
use intent_gate_core::Timestamp;
use intent_gate_core::runtime::LifecycleError;
use intent_gate_core::runtime::Operation;
use intent_gate_core::runtime::OperationContext;
use intent_gate_core::runtime::SubmitRequest;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Submission request body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SubmitBody {
    /// Submitting entity; defaults to the principal subject.
    pub entity_id: Option<String>,
    /// Free-text goal.
    pub goal: String,
    /// Optional intent type tag.
    pub intent_type: Option<String>,
    /// Priority 0..=9.
    pub priority: Option<i64>,
    /// Submission context mapping.
    pub context: Option<Value>,
    /// Submitter metadata mapping.
    pub metadata: Option<BTreeMap<String, Value>>,
    /// Optional idempotency key.
    pub idempotency_key: Option<String>,
}

/// Cancellation request body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CancelBody {
    /// Cancellation reason.
    pub reason: String,
}

/// List query parameters (keyset pagination).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ListQuery {
    /// Status filter.
    pub status: Option<IntentStatus>,
    /// Submitting entity filter.
    pub entity_id: Option<String>,
    /// Intent type filter.
    pub intent_type: Option<String>,
    /// Cursor: created-at milliseconds of the previous page's last row.
    pub cursor_created_at: Option<i64>,
    /// Cursor: id of the previous page's last row.
    pub cursor_id: Option<String>,
    /// Page size, clamped to 100.
    pub limit: Option<u32>,
}

/// Fetch query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchQuery {
    /// Comma-separated includes: `events`, `evaluations`.
    pub include: Option<String>,
}

/// Builds the page request from query cursors.
fn page_request(query: &ListQuery) -> PageRequest {
    let cursor = match (query.cursor_created_at, query.cursor_id.as_ref()) {
        (Some(created_at), Some(id)) => Some(Cursor {
            created_at: Timestamp::from_unix_millis(created_at),
            id: id.clone(),
        }),
        _ => None,
    };
    PageRequest {
        cursor,
        limit: query.limit,
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// POST /api/v1/intents: submit an intent.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentSubmit)?;
    let tenant = authed.principal.tenant_id.clone();
    let request = SubmitRequest {
        entity_id: body
            .entity_id
            .map_or_else(|| EntityId::new(authed.principal.sub.as_str()), EntityId::new),
        goal: body.goal,
        intent_type: body.intent_type,
        priority: body.priority,
        context: body.context.unwrap_or_else(|| json!({})),
        metadata: body.metadata.unwrap_or_default(),
        idempotency_key: body.idempotency_key,
    };
    let op = OperationContext {
        actor: authed.actor(),
        trace_id: authed.trace_id,
    };
    let outcome = match state.lifecycle.submit(&tenant, request, &op) {
        Ok(outcome) => outcome,
        Err(err) => {
            state.metrics.submission("rejected");
            return Err(err.into());
        }
    };
    let status = if outcome.created {
        state.metrics.submission("created");
        StatusCode::ACCEPTED
    } else {
        state.metrics.submission("deduped");
        StatusCode::OK
    };
    Ok((status, Json(json!({"intent": outcome.intent}))).into_response())
}

/// GET /api/v1/intents: list with keyset pagination.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentRead)?;
    let filter = IntentFilter {
        status: query.status,
        entity_id: query.entity_id.clone().map(EntityId::new),
        intent_type: query.intent_type.clone(),
        include_deleted: false,
    };
    let page = state
        .lifecycle
        .list(&authed.principal.tenant_id, &filter, &page_request(&query))?;
    Ok(Json(json!({"items": page.items, "next": page.next})).into_response())
}

/// GET /api/v1/intents/{id}: fetch, optionally with ledger and traces.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<FetchQuery>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentRead)?;
    let tenant = &authed.principal.tenant_id;
    let id = IntentId::new(id);
    let includes: Vec<&str> =
        query.include.as_deref().map_or_else(Vec::new, |raw| raw.split(',').collect());
    if includes.is_empty() {
        let intent = state.lifecycle.get(tenant, &id)?;
        return Ok(Json(json!({"intent": intent})).into_response());
    }
    let (intent, events, evaluations) = state.lifecycle.get_with_events(tenant, &id)?;
    let mut body = json!({"intent": intent});
    if includes.contains(&"events") {
        body["events"] = serde_json::to_value(events).unwrap_or(Value::Null);
    }
    if includes.contains(&"evaluations") {
        body["evaluations"] = serde_json::to_value(evaluations).unwrap_or(Value::Null);
    }
    Ok(Json(body).into_response())
}

/// POST /api/v1/intents/{id}/cancel: cooperative cancellation.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentCancel)?;
    let op = OperationContext {
        actor: authed.actor(),
        trace_id: authed.trace_id,
    };
    let intent = state.lifecycle.cancel(
        &authed.principal.tenant_id,
        &IntentId::new(id),
        &body.reason,
        &op,
    )?;
    Ok(Json(json!({"intent": intent})).into_response())
}

/// DELETE /api/v1/intents/{id}: soft delete and redact.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentDelete)?;
    let op = OperationContext {
        actor: authed.actor(),
        trace_id: authed.trace_id,
    };
    state.lifecycle.delete(&authed.principal.tenant_id, &IntentId::new(id), &op)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /api/v1/intents/{id}/replay: reset failed/denied to pending.
pub async fn replay(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentReplay)?;
    let op = OperationContext {
        actor: authed.actor(),
        trace_id: authed.trace_id,
    };
    let intent = state
        .lifecycle
        .replay(&authed.principal.tenant_id, &IntentId::new(id), &op)
        .map_err(|err| match err {
            // Replay's invalid-state contract is a 400, unlike cancel's 409.
            LifecycleError::InvalidState(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_STATE", message)
            }
            other => other.into(),
        })?;
    Ok(Json(json!({"intent": intent})).into_response())
}

/// GET /api/v1/intents/{id}/verify: ledger chain integrity.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentRead)?;
    let report = state.lifecycle.verify_chain(&authed.principal.tenant_id, &IntentId::new(id))?;
    Ok(Json(json!({"verification": report})).into_response())
}

/// GET /api/v1/intents/{id}/events: full ledger.
pub async fn events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::IntentRead)?;
    let events = state.lifecycle.events(&authed.principal.tenant_id, &IntentId::new(id))?;
    Ok(Json(json!({"events": events})).into_response())
}
