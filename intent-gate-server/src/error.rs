// intent-gate-server/src/error.rs
// ============================================================================
// Module: API Error Envelope
// Description: Canonical error codes and response mapping.
// Purpose: Map internal error kinds onto the stable wire envelope
//          `{"error": {"code", "message", "details?"}}`.
// Dependencies: axum, intent-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Every failure leaving the API carries a machine-readable code from the
//! canonical set. Rate and quota rejections additionally carry a
//! `Retry-After` header. Internal detail never leaks: storage and hashing
//! failures map to an opaque internal error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use intent_gate_core::runtime::AuditLogError;
use intent_gate_core::runtime::AuthorizeError;
use intent_gate_core::runtime::EscalationError;
use intent_gate_core::runtime::LifecycleError;
use intent_gate_core::runtime::PolicyServiceError;
use serde_json::Value;
use serde_json::json;
use tracing::error;

// ============================================================================
// SECTION: API Error
// ============================================================================

/// API error carrying the canonical code and HTTP status.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// Canonical error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    pub details: Option<Value>,
    /// Retry-After seconds for rate rejections.
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Builds an error with no details.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Builds the opaque internal error, logging the cause.
    #[must_use]
    pub fn internal(cause: &dyn std::fmt::Display) -> Self {
        error!(error = %cause, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "internal error")
    }

    /// Builds the unauthenticated error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// Builds the forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// Builds a not-found error with the given code.
    #[must_use]
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(message) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "VALIDATION_ERROR",
                message,
                details: None,
                retry_after_secs: None,
            },
            LifecycleError::RateLimited { retry_after_secs } => Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                code: "INTENT_RATE_LIMIT",
                message: "submission rate limit exceeded".to_string(),
                details: None,
                retry_after_secs: Some(retry_after_secs),
            },
            LifecycleError::Locked => Self::new(
                StatusCode::CONFLICT,
                "INTENT_LOCKED",
                "duplicate submission in flight",
            ),
            LifecycleError::NotFound(id) => {
                Self::not_found("INTENT_NOT_FOUND", format!("intent not found: {id}"))
            }
            LifecycleError::InvalidState(message) => {
                Self::new(StatusCode::CONFLICT, "INVALID_STATE", message)
            }
            LifecycleError::QueueUnavailable(message) => {
                error!(error = %message, "queue unavailable");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "QUEUE_UNAVAILABLE",
                    "submission pipeline unavailable; retry",
                )
            }
            LifecycleError::Store(cause) => Self::internal(&cause),
            LifecycleError::Fast(cause) => Self::internal(&cause),
            LifecycleError::Hashing(cause) => Self::internal(&cause),
        }
    }
}

impl From<EscalationError> for ApiError {
    fn from(err: EscalationError) -> Self {
        match err {
            EscalationError::NotFound(id) => {
                Self::not_found("ESCALATION_NOT_FOUND", format!("escalation not found: {id}"))
            }
            EscalationError::AlreadyResolved => Self::new(
                StatusCode::CONFLICT,
                "ESCALATION_ALREADY_RESOLVED",
                "escalation already reached a terminal status",
            ),
            EscalationError::Forbidden => {
                Self::forbidden("resolver is not a member of the escalation target")
            }
            EscalationError::Store(cause) => Self::internal(&cause),
            EscalationError::Fast(cause) => Self::internal(&cause),
        }
    }
}

impl From<PolicyServiceError> for ApiError {
    fn from(err: PolicyServiceError) -> Self {
        match err {
            PolicyServiceError::NotFound(id) => {
                Self::not_found("POLICY_NOT_FOUND", format!("policy not found: {id}"))
            }
            PolicyServiceError::NotDraft => Self::new(
                StatusCode::CONFLICT,
                "POLICY_NOT_DRAFT",
                "operation requires a draft policy",
            ),
            PolicyServiceError::Validation(cause) => Self {
                status: StatusCode::BAD_REQUEST,
                code: "POLICY_VALIDATION_ERROR",
                message: cause.to_string(),
                details: None,
                retry_after_secs: None,
            },
            PolicyServiceError::Checksum(cause) => Self::internal(&cause),
            PolicyServiceError::Store(cause) => Self::internal(&cause),
        }
    }
}

impl From<AuthorizeError> for ApiError {
    fn from(err: AuthorizeError) -> Self {
        match err {
            AuthorizeError::TokenRevoked | AuthorizeError::TokenSuperseded => {
                Self::new(StatusCode::UNAUTHORIZED, "TOKEN_REVOKED", err.to_string())
            }
            AuthorizeError::TokenExpired => {
                Self::new(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", err.to_string())
            }
            AuthorizeError::TokenMissingJti => {
                Self::new(StatusCode::UNAUTHORIZED, "TOKEN_INVALID", err.to_string())
            }
            AuthorizeError::Forbidden(operation) => {
                Self::forbidden(format!("operation {operation} forbidden"))
            }
            AuthorizeError::Store(cause) => Self::internal(&cause),
        }
    }
}

impl From<AuditLogError> for ApiError {
    fn from(err: AuditLogError) -> Self {
        Self::internal(&err)
    }
}
