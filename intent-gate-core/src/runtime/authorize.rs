// intent-gate-core/src/runtime/authorize.rs
// ============================================================================
// Module: Intent Gate Authorization
// Description: Declarative operation-to-role table and token revocation
//              checks consumed by the API edge.
// Purpose: Evaluate every inbound call uniformly instead of per-route.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! One table maps each operation to the roles allowed to perform it; the API
//! edge evaluates it uniformly after the transport has authenticated the
//! principal. Token checks run first: a revoked JTI or an issue time before
//! the user's revoke-all cutoff rejects the call before any role logic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Principal;
use crate::core::ROLE_ADMIN;
use crate::core::ROLE_APPROVER;
use crate::core::ROLE_AUDITOR;
use crate::core::ROLE_POLICY_WRITER;
use crate::core::ROLE_TENANT_ADMIN;
use crate::core::Timestamp;
use crate::interfaces::RevocationStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Closed set of authorized operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Submit an intent.
    IntentSubmit,
    /// Read intents, events, evaluations, and chain verification.
    IntentRead,
    /// Cancel an intent.
    IntentCancel,
    /// Soft-delete an intent.
    IntentDelete,
    /// Replay a failed or denied intent.
    IntentReplay,
    /// Read escalations.
    EscalationRead,
    /// Acknowledge, approve, or reject an escalation.
    EscalationResolve,
    /// Read policies.
    PolicyRead,
    /// Create, update, publish, deprecate, archive, or delete policies.
    PolicyWrite,
    /// Read the audit log.
    AuditRead,
    /// Run audit chain verification.
    AuditVerify,
    /// Revoke all tokens for a user.
    AdminRevokeTokens,
    /// Retry a dead-letter job.
    AdminRetryDeadLetter,
    /// Trigger cleanup outside the schedule.
    AdminRunCleanup,
    /// Read scheduler state.
    SchedulerRead,
}

impl Operation {
    /// Returns a stable label for audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IntentSubmit => "intent.submit",
            Self::IntentRead => "intent.read",
            Self::IntentCancel => "intent.cancel",
            Self::IntentDelete => "intent.delete",
            Self::IntentReplay => "intent.replay",
            Self::EscalationRead => "escalation.read",
            Self::EscalationResolve => "escalation.resolve",
            Self::PolicyRead => "policy.read",
            Self::PolicyWrite => "policy.write",
            Self::AuditRead => "audit.read",
            Self::AuditVerify => "audit.verify",
            Self::AdminRevokeTokens => "admin.revoke_tokens",
            Self::AdminRetryDeadLetter => "admin.retry_dead_letter",
            Self::AdminRunCleanup => "admin.run_cleanup",
            Self::SchedulerRead => "scheduler.read",
        }
    }

    /// Returns the roles allowed to perform the operation. An empty slice
    /// means any authenticated principal in the tenant.
    #[must_use]
    pub const fn required_roles(self) -> &'static [&'static str] {
        match self {
            Self::IntentSubmit | Self::IntentRead | Self::IntentCancel | Self::PolicyRead => &[],
            Self::IntentDelete | Self::IntentReplay => &[ROLE_ADMIN, ROLE_TENANT_ADMIN],
            Self::EscalationRead | Self::EscalationResolve => {
                &[ROLE_ADMIN, ROLE_TENANT_ADMIN, ROLE_APPROVER]
            }
            Self::PolicyWrite => &[ROLE_ADMIN, ROLE_TENANT_ADMIN, ROLE_POLICY_WRITER],
            Self::AuditRead => &[ROLE_ADMIN, ROLE_TENANT_ADMIN, ROLE_AUDITOR],
            Self::AuditVerify
            | Self::AdminRevokeTokens
            | Self::AdminRetryDeadLetter
            | Self::AdminRunCleanup
            | Self::SchedulerRead => &[ROLE_ADMIN, ROLE_TENANT_ADMIN],
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authorization errors.
#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// Token identifier is revoked.
    #[error("token revoked")]
    TokenRevoked,
    /// Token was issued before the user's revoke-all cutoff.
    #[error("token issued before revocation cutoff")]
    TokenSuperseded,
    /// Token expiry has passed.
    #[error("token expired")]
    TokenExpired,
    /// Production mode requires a JTI claim.
    #[error("token missing jti claim")]
    TokenMissingJti,
    /// Principal lacks the required role.
    #[error("operation {0} forbidden for principal roles")]
    Forbidden(&'static str),
    /// Revocation store failure; fail closed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Authorization gate configuration.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizeOptions {
    /// Whether a JTI claim is required (production default).
    pub require_jti: bool,
}

impl Default for AuthorizeOptions {
    fn default() -> Self {
        Self { require_jti: true }
    }
}

/// Validates the principal's token against expiry and revocation state.
///
/// # Errors
///
/// Returns the first failing [`AuthorizeError`]; a store failure also
/// rejects (fail closed).
pub fn check_token<R: RevocationStore + ?Sized>(
    principal: &Principal,
    revocations: &R,
    options: AuthorizeOptions,
    now: Timestamp,
) -> Result<(), AuthorizeError> {
    if now >= principal.exp {
        return Err(AuthorizeError::TokenExpired);
    }
    match principal.jti.as_deref() {
        Some(jti) => {
            if revocations.is_jti_revoked(jti, now)? {
                return Err(AuthorizeError::TokenRevoked);
            }
        }
        None if options.require_jti => return Err(AuthorizeError::TokenMissingJti),
        None => {}
    }
    if let Some(cutoff) = revocations.revoke_before(&principal.sub)?
        && principal.iat < cutoff
    {
        return Err(AuthorizeError::TokenSuperseded);
    }
    Ok(())
}

/// Evaluates the role table for an operation.
///
/// # Errors
///
/// Returns [`AuthorizeError::Forbidden`] when the principal lacks every
/// allowed role.
pub fn check_operation(principal: &Principal, operation: Operation) -> Result<(), AuthorizeError> {
    let required = operation.required_roles();
    if required.is_empty() || principal.has_any_role(required) {
        return Ok(());
    }
    Err(AuthorizeError::Forbidden(operation.as_str()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PrincipalId;
    use crate::core::TenantId;

    /// Builds a principal with the given roles.
    fn principal(roles: &[&str]) -> Principal {
        Principal {
            sub: PrincipalId::new("user-1"),
            tenant_id: TenantId::new("t-1"),
            jti: Some("jti-1".to_string()),
            iat: Timestamp::from_unix_millis(1_000),
            exp: Timestamp::from_unix_millis(100_000),
            roles: roles.iter().map(|role| (*role).to_string()).collect(),
            groups: Vec::new(),
        }
    }

    /// Tests open operations admit role-less principals while guarded ones
    /// reject them.
    #[test]
    fn test_role_table() {
        let plain = principal(&[]);
        assert!(check_operation(&plain, Operation::IntentSubmit).is_ok());
        assert!(check_operation(&plain, Operation::PolicyRead).is_ok());
        assert!(matches!(
            check_operation(&plain, Operation::PolicyWrite),
            Err(AuthorizeError::Forbidden(_))
        ));
        let writer = principal(&[ROLE_POLICY_WRITER]);
        assert!(check_operation(&writer, Operation::PolicyWrite).is_ok());
        assert!(matches!(
            check_operation(&writer, Operation::AdminRevokeTokens),
            Err(AuthorizeError::Forbidden(_))
        ));
        let admin = principal(&[ROLE_ADMIN]);
        assert!(check_operation(&admin, Operation::AdminRevokeTokens).is_ok());
    }
}
