// intent-gate-core/src/runtime/policy.rs
// ============================================================================
// Module: Intent Gate Policy Service
// Description: Policy authoring lifecycle: create, update, publish,
//              deprecate, archive, delete.
// Purpose: Enforce versioning and immutability invariants and keep the
//          evaluator cache coherent with policy mutations.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Policies version monotonically per `(tenant, namespace, name)`. Drafts are
//! editable; publishing freezes the definition and atomically deprecates the
//! previously published version, keeping at most one live policy per tuple.
//! Every mutation invalidates the evaluator cache for its namespace; the
//! cache TTL bounds staleness even when invalidation is lost.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::AuditActor;
use crate::core::AuditCategory;
use crate::core::AuditOutcome;
use crate::core::AuditSeverity;
use crate::core::AuditTarget;
use crate::core::Clock;
use crate::core::NamespaceId;
use crate::core::PendingAuditRecord;
use crate::core::Policy;
use crate::core::PolicyDefinition;
use crate::core::PolicyId;
use crate::core::PolicyStatus;
use crate::core::PolicyValidationError;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::identifiers::AuditId;
use crate::interfaces::AuditStore;
use crate::interfaces::PolicyStore;
use crate::interfaces::StoreError;
use crate::runtime::evaluator::CompiledPolicy;
use crate::runtime::evaluator::PolicyCache;
use crate::runtime::evaluator::PolicyCacheError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy service errors.
#[derive(Debug, Error)]
pub enum PolicyServiceError {
    /// Policy does not exist in the caller's tenant.
    #[error("policy not found: {0}")]
    NotFound(PolicyId),
    /// Mutation requires draft status.
    #[error("policy is not a draft")]
    NotDraft,
    /// Definition failed validation.
    #[error(transparent)]
    Validation(#[from] PolicyValidationError),
    /// Checksum computation failed.
    #[error("policy checksum error: {0}")]
    Checksum(String),
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Policy creation payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePolicyRequest {
    /// Policy name.
    pub name: String,
    /// Routing namespace; defaults to `default`.
    pub namespace: Option<NamespaceId>,
    /// Declarative definition.
    pub definition: PolicyDefinition,
}

/// Caller identity for audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOperationContext {
    /// Acting principal.
    pub actor: AuditActor,
    /// Trace identifier propagated from the transport.
    pub trace_id: Option<TraceId>,
}

// ============================================================================
// SECTION: Policy Service
// ============================================================================

/// Service owning policy authoring transitions.
pub struct PolicyService<S, C> {
    /// Storage backend.
    store: Arc<S>,
    /// Evaluator cache kept coherent with mutations.
    cache: Arc<PolicyCache>,
    /// Clock seam.
    clock: C,
}

impl<S, C> PolicyService<S, C>
where
    S: PolicyStore + AuditStore,
    C: Clock,
{
    /// Creates a policy service.
    pub const fn new(store: Arc<S>, cache: Arc<PolicyCache>, clock: C) -> Self {
        Self { store, cache, clock }
    }

    /// Creates a new draft policy at the next version of its tuple.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::Validation`] for malformed definitions.
    pub fn create(
        &self,
        tenant: &TenantId,
        request: CreatePolicyRequest,
        op: &PolicyOperationContext,
    ) -> Result<Policy, PolicyServiceError> {
        request.definition.validate()?;
        let now = self.clock.now();
        let namespace = request.namespace.unwrap_or_else(NamespaceId::default_namespace);
        let version =
            self.store.latest_policy_version(tenant, &namespace, &request.name)? + 1;
        let checksum =
            request.definition.checksum().map_err(PolicyServiceError::Checksum)?;
        let policy = Policy {
            id: PolicyId::generate(),
            tenant_id: tenant.clone(),
            name: request.name,
            namespace,
            version,
            status: PolicyStatus::Draft,
            definition: request.definition,
            checksum,
            created_at: now,
            updated_at: now,
        };
        let audit = self.audit(tenant, &policy.id, "policy.created", "create", op, now);
        self.store.create_policy(&policy, audit)?;
        Ok(policy)
    }

    /// Replaces a draft's definition.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::NotDraft`] for published, deprecated, or
    /// archived policies (immutability invariant).
    pub fn update(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        definition: PolicyDefinition,
        op: &PolicyOperationContext,
    ) -> Result<Policy, PolicyServiceError> {
        definition.validate()?;
        let mut policy = self.get(tenant, id)?;
        if policy.status != PolicyStatus::Draft {
            return Err(PolicyServiceError::NotDraft);
        }
        let now = self.clock.now();
        policy.checksum = definition.checksum().map_err(PolicyServiceError::Checksum)?;
        policy.definition = definition;
        policy.updated_at = now;
        let audit = self.audit(tenant, id, "policy.updated", "update", op, now);
        self.store.update_policy(&policy, audit)?;
        self.cache.invalidate(tenant, &policy.namespace);
        Ok(policy)
    }

    /// Publishes a draft, deprecating the previously published version of
    /// the same tuple atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::NotDraft`] when the policy is not a
    /// draft.
    pub fn publish(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        op: &PolicyOperationContext,
    ) -> Result<Policy, PolicyServiceError> {
        let now = self.clock.now();
        let audit = self.audit(tenant, id, "policy.published", "publish", op, now);
        let policy = self
            .store
            .publish_policy(tenant, id, now, audit)
            .map_err(map_not_draft)?;
        self.cache.invalidate(tenant, &policy.namespace);
        Ok(policy)
    }

    /// Deprecates a published policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::Store`] with a status conflict when the
    /// policy is not published.
    pub fn deprecate(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        op: &PolicyOperationContext,
    ) -> Result<Policy, PolicyServiceError> {
        let now = self.clock.now();
        let audit = self.audit(tenant, id, "policy.deprecated", "deprecate", op, now);
        let policy = self.store.set_policy_status(
            tenant,
            id,
            &[PolicyStatus::Published],
            PolicyStatus::Deprecated,
            now,
            audit,
        )?;
        self.cache.invalidate(tenant, &policy.namespace);
        Ok(policy)
    }

    /// Archives a draft, published, or deprecated policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::Store`] when the transition fails.
    pub fn archive(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        op: &PolicyOperationContext,
    ) -> Result<Policy, PolicyServiceError> {
        let now = self.clock.now();
        let audit = self.audit(tenant, id, "policy.archived", "archive", op, now);
        let policy = self.store.set_policy_status(
            tenant,
            id,
            &[PolicyStatus::Draft, PolicyStatus::Published, PolicyStatus::Deprecated],
            PolicyStatus::Archived,
            now,
            audit,
        )?;
        self.cache.invalidate(tenant, &policy.namespace);
        Ok(policy)
    }

    /// Deletes a draft policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::NotDraft`] for non-draft policies.
    pub fn delete(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        op: &PolicyOperationContext,
    ) -> Result<(), PolicyServiceError> {
        let policy = self.get(tenant, id)?;
        if policy.status != PolicyStatus::Draft {
            return Err(PolicyServiceError::NotDraft);
        }
        let now = self.clock.now();
        let audit = self.audit(tenant, id, "policy.deleted", "delete", op, now);
        self.store.delete_policy(tenant, id, audit)?;
        self.cache.invalidate(tenant, &policy.namespace);
        Ok(())
    }

    /// Loads a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::NotFound`] when absent in the tenant.
    pub fn get(&self, tenant: &TenantId, id: &PolicyId) -> Result<Policy, PolicyServiceError> {
        self.store
            .get_policy(tenant, id)?
            .ok_or_else(|| PolicyServiceError::NotFound(id.clone()))
    }

    /// Lists policies, optionally filtered by namespace.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyServiceError::Store`] when loading fails.
    pub fn list(
        &self,
        tenant: &TenantId,
        namespace: Option<&NamespaceId>,
    ) -> Result<Vec<Policy>, PolicyServiceError> {
        Ok(self.store.list_policies(tenant, namespace)?)
    }

    /// Returns compiled published policies through the evaluator cache.
    ///
    /// # Errors
    ///
    /// Propagates load and compile failures; evaluation callers fail closed
    /// on them.
    pub fn published_compiled(
        &self,
        tenant: &TenantId,
        namespace: &NamespaceId,
        now: Timestamp,
    ) -> Result<Arc<Vec<CompiledPolicy>>, PolicyCacheError<StoreError>> {
        self.cache.published(tenant, namespace, now, || {
            self.store.published_policies(tenant, namespace)
        })
    }

    /// Builds a policy-category audit record.
    fn audit(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        event_type: &str,
        action: &str,
        op: &PolicyOperationContext,
        now: Timestamp,
    ) -> PendingAuditRecord {
        PendingAuditRecord {
            id: AuditId::generate(),
            tenant_id: tenant.clone(),
            event_type: event_type.to_string(),
            event_category: AuditCategory::Policy,
            severity: AuditSeverity::Info,
            actor: op.actor.clone(),
            target: AuditTarget {
                target_type: "policy".to_string(),
                target_id: id.to_string(),
            },
            action: action.to_string(),
            outcome: AuditOutcome::Success,
            before: None,
            after: None,
            trace_id: op.trace_id.clone(),
            span_id: None,
            created_at: now,
        }
    }
}

/// Maps a publish status conflict onto the draft-required error.
fn map_not_draft(err: StoreError) -> PolicyServiceError {
    match err {
        StoreError::StatusConflict { .. } => PolicyServiceError::NotDraft,
        other => PolicyServiceError::Store(other),
    }
}
