// intent-gate-server/src/auth.rs
// ============================================================================
// Module: API Edge Authentication
// Description: Principal envelope extraction and uniform authorization.
// Purpose: Turn the transport's trusted headers into a validated principal
//          and evaluate the declarative operation table before any handler
//          logic runs.
// Dependencies: axum, intent-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The fronting transport verifies credentials cryptographically and injects
//! the principal envelope as a trusted header. The edge here validates the
//! envelope shape, runs token checks (expiry, revoked JTI, revoke-all
//! cutoff), then evaluates the operation-to-role table. Failed auth is
//! audited with a failure outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use intent_gate_core::AuditActor;
use intent_gate_core::Principal;
use intent_gate_core::TraceId;
use intent_gate_core::runtime::AuthorizeOptions;
use intent_gate_core::runtime::Operation;
use intent_gate_core::runtime::check_operation;
use intent_gate_core::runtime::check_token;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Headers
// ============================================================================

/// Trusted header carrying the JSON principal envelope.
pub const PRINCIPAL_HEADER: &str = "x-intent-principal";

/// Optional trace propagation header.
pub const TRACE_HEADER: &str = "x-trace-id";

// ============================================================================
// SECTION: Authentication
// ============================================================================

/// Authenticated request context handed to handlers.
#[derive(Debug, Clone)]
pub struct AuthedRequest {
    /// Validated principal.
    pub principal: Principal,
    /// Trace identifier when the transport propagated one.
    pub trace_id: Option<TraceId>,
}

impl AuthedRequest {
    /// Returns the audit actor for this principal.
    #[must_use]
    pub fn actor(&self) -> AuditActor {
        AuditActor {
            actor_type: "user".to_string(),
            actor_id: self.principal.sub.to_string(),
            ip: None,
            user_agent: None,
        }
    }
}

/// Extracts and validates the principal, then authorizes the operation.
///
/// # Errors
///
/// Returns `401` for missing/invalid/revoked tokens and `403` when the role
/// table rejects the operation.
pub fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    operation: Operation,
) -> Result<AuthedRequest, ApiError> {
    let raw = headers
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing principal envelope"))?;
    let principal: Principal = serde_json::from_str(raw)
        .map_err(|err| ApiError::unauthorized(format!("invalid principal envelope: {err}")))?;

    let now = state.clock_now();
    let options = AuthorizeOptions {
        require_jti: state.options.require_jti,
    };
    let token_check = check_token(&principal, state.store.as_ref(), options, now);
    state.metrics.revocation_check(token_check.is_ok());
    token_check.map_err(ApiError::from)?;
    check_operation(&principal, operation)?;

    let trace_id = headers
        .get(TRACE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(TraceId::new);
    Ok(AuthedRequest {
        principal,
        trace_id,
    })
}
