// intent-gate-core/src/core/principal.rs
// ============================================================================
// Module: Intent Gate Principal Model
// Description: Authenticated caller envelope consumed by the core.
// Purpose: Carry verified subject, tenant, token, and role claims from the
//          transport layer into authorization decisions.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The surrounding transport verifies credentials cryptographically and hands
//! the core this envelope. The core trusts the envelope's claims and enforces
//! authorization (roles, tenant isolation, token revocation) on top of them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Role Labels
// ============================================================================

/// Platform-wide administrator role.
pub const ROLE_ADMIN: &str = "admin";

/// Tenant-scoped administrator role.
pub const ROLE_TENANT_ADMIN: &str = "tenant:admin";

/// Policy authoring role.
pub const ROLE_POLICY_WRITER: &str = "policy_writer";

/// Escalation approver role.
pub const ROLE_APPROVER: &str = "approver";

/// Audit reader role.
pub const ROLE_AUDITOR: &str = "auditor";

// ============================================================================
// SECTION: Principal
// ============================================================================

/// Authenticated caller envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier.
    pub sub: PrincipalId,
    /// Tenant the principal belongs to.
    pub tenant_id: TenantId,
    /// Token identifier used for revocation checks; required in production.
    pub jti: Option<String>,
    /// Token issue time.
    pub iat: Timestamp,
    /// Token expiry time.
    pub exp: Timestamp,
    /// Granted roles.
    pub roles: Vec<String>,
    /// Group memberships.
    pub groups: Vec<String>,
}

impl Principal {
    /// Returns true when the principal holds the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|granted| granted == role)
    }

    /// Returns true when the principal holds any of the given roles.
    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    /// Returns true when the principal is an administrator (platform or
    /// tenant scope).
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_any_role(&[ROLE_ADMIN, ROLE_TENANT_ADMIN])
    }

    /// Returns true when the principal is addressed by an escalation target:
    /// direct subject match, role match, or group membership.
    #[must_use]
    pub fn is_member_of(&self, target: &str) -> bool {
        self.sub.as_str() == target
            || self.has_role(target)
            || self.groups.iter().any(|group| group == target)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a principal with the given roles and groups.
    fn principal(roles: &[&str], groups: &[&str]) -> Principal {
        Principal {
            sub: PrincipalId::new("user-1"),
            tenant_id: TenantId::new("t-1"),
            jti: Some("jti-1".to_string()),
            iat: Timestamp::from_unix_millis(0),
            exp: Timestamp::from_unix_millis(3_600_000),
            roles: roles.iter().map(|role| (*role).to_string()).collect(),
            groups: groups.iter().map(|group| (*group).to_string()).collect(),
        }
    }

    /// Tests escalation membership covers subject, role, and group targets.
    #[test]
    fn test_membership_forms() {
        let caller = principal(&[ROLE_APPROVER], &["data-gov"]);
        assert!(caller.is_member_of("user-1"));
        assert!(caller.is_member_of(ROLE_APPROVER));
        assert!(caller.is_member_of("data-gov"));
        assert!(!caller.is_member_of("finance-gov"));
    }

    /// Tests admin detection covers platform and tenant scope.
    #[test]
    fn test_admin_roles() {
        assert!(principal(&[ROLE_ADMIN], &[]).is_admin());
        assert!(principal(&[ROLE_TENANT_ADMIN], &[]).is_admin());
        assert!(!principal(&[ROLE_POLICY_WRITER], &[]).is_admin());
    }
}
