// intent-gate-server/src/routes/policies.rs
// ============================================================================
// Module: Policy Routes
// Description: Policy authoring lifecycle handlers.
// Purpose: Expose the policy service under `/api/v1/policies`.
// Dependencies: axum, intent-gate-core, crate::{auth, error, state}
// ============================================================================

//! ## Overview
//! Writes require the policy-writer (or admin) role; reads are open to any
//! tenant principal. Definitions validate on the way in, so malformed
//! condition trees never reach the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use intent_gate_core::NamespaceId;
use intent_gate_core::PolicyDefinition;
use intent_gate_core::PolicyId;
use intent_gate_core::runtime::CreatePolicyRequest;
use intent_gate_core::runtime::Operation;
use intent_gate_core::runtime::PolicyOperationContext;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthedRequest;
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Policy creation body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateBody {
    /// Policy name.
    pub name: String,
    /// Routing namespace; defaults to `default`.
    pub namespace: Option<String>,
    /// Declarative definition.
    pub definition: PolicyDefinition,
}

/// Policy update body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateBody {
    /// Replacement definition.
    pub definition: PolicyDefinition,
}

/// List query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQuery {
    /// Namespace filter.
    pub namespace: Option<String>,
}

/// Builds the policy operation context from an authenticated request.
fn op_context(authed: &AuthedRequest) -> PolicyOperationContext {
    PolicyOperationContext {
        actor: authed.actor(),
        trace_id: authed.trace_id.clone(),
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// POST /api/v1/policies: create a draft version.
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyWrite)?;
    let policy = state.policies.create(
        &authed.principal.tenant_id,
        CreatePolicyRequest {
            name: body.name,
            namespace: body.namespace.map(NamespaceId::new),
            definition: body.definition,
        },
        &op_context(&authed),
    )?;
    Ok((StatusCode::CREATED, Json(json!({"policy": policy}))).into_response())
}

/// GET /api/v1/policies: list, optionally by namespace.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyRead)?;
    let namespace = query.namespace.map(NamespaceId::new);
    let policies = state.policies.list(&authed.principal.tenant_id, namespace.as_ref())?;
    Ok(Json(json!({"items": policies})).into_response())
}

/// GET /api/v1/policies/{id}: fetch.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyRead)?;
    let policy = state.policies.get(&authed.principal.tenant_id, &PolicyId::new(id))?;
    Ok(Json(json!({"policy": policy})).into_response())
}

/// PUT /api/v1/policies/{id}: replace a draft's definition.
pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyWrite)?;
    let policy = state.policies.update(
        &authed.principal.tenant_id,
        &PolicyId::new(id),
        body.definition,
        &op_context(&authed),
    )?;
    Ok(Json(json!({"policy": policy})).into_response())
}

/// DELETE /api/v1/policies/{id}: delete a draft.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyWrite)?;
    state.policies.delete(&authed.principal.tenant_id, &PolicyId::new(id), &op_context(&authed))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /api/v1/policies/{id}/publish: publish a draft.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyWrite)?;
    let policy = state.policies.publish(
        &authed.principal.tenant_id,
        &PolicyId::new(id),
        &op_context(&authed),
    )?;
    Ok(Json(json!({"policy": policy})).into_response())
}

/// POST /api/v1/policies/{id}/deprecate: retire from evaluation.
pub async fn deprecate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyWrite)?;
    let policy = state.policies.deprecate(
        &authed.principal.tenant_id,
        &PolicyId::new(id),
        &op_context(&authed),
    )?;
    Ok(Json(json!({"policy": policy})).into_response())
}

/// POST /api/v1/policies/{id}/archive: retain for history only.
pub async fn archive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authed = authenticate(&state, &headers, Operation::PolicyWrite)?;
    let policy = state.policies.archive(
        &authed.principal.tenant_id,
        &PolicyId::new(id),
        &op_context(&authed),
    )?;
    Ok(Json(json!({"policy": policy})).into_response())
}
