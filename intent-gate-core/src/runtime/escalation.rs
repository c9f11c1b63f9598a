// intent-gate-core/src/runtime/escalation.rs
// ============================================================================
// Module: Intent Gate Escalation Service
// Description: Human-approval resolution and SLA timeout sweeps.
// Purpose: Drive escalation transitions and propagate resolutions onto the
//          underlying intent atomically.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! Resolution authorization lives here, next to the transitions it guards:
//! a resolver must share the escalation's tenant and be addressed by its
//! `escalated_to` target (directly, by role, or by group) or hold an admin
//! role. Every transition commits its audit record (and, when the intent
//! moves, the intent's ledger event) in the same store transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::AuditActor;
use crate::core::AuditCategory;
use crate::core::AuditOutcome;
use crate::core::AuditSeverity;
use crate::core::AuditTarget;
use crate::core::Clock;
use crate::core::DeliveryKind;
use crate::core::DeliveryRecord;
use crate::core::Escalation;
use crate::core::EscalationId;
use crate::core::EscalationStatus;
use crate::core::IntentEventType;
use crate::core::IntentStatus;
use crate::core::JobId;
use crate::core::NamespaceId;
use crate::core::PendingAuditRecord;
use crate::core::PendingIntentEvent;
use crate::core::Principal;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::identifiers::AuditId;
use crate::interfaces::AuditStore;
use crate::interfaces::EscalationChange;
use crate::interfaces::EscalationFilter;
use crate::interfaces::EscalationStore;
use crate::interfaces::FastStore;
use crate::interfaces::FastStoreError;
use crate::interfaces::IntentChange;
use crate::interfaces::IntentStore;
use crate::interfaces::IntentTransition;
use crate::interfaces::Job;
use crate::interfaces::JobQueue;
use crate::interfaces::Page;
use crate::interfaces::PageRequest;
use crate::interfaces::QueueStage;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Escalation service errors.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// Escalation does not exist in the caller's tenant.
    #[error("escalation not found: {0}")]
    NotFound(EscalationId),
    /// Escalation already reached a terminal status.
    #[error("escalation already resolved")]
    AlreadyResolved,
    /// Resolver is not addressed by the escalation target.
    #[error("resolver is not a member of the escalation target")]
    Forbidden,
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Fast-store failure.
    #[error(transparent)]
    Fast(#[from] FastStoreError),
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Resolution payload for approve/reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resolver notes.
    pub notes: Option<String>,
    /// Trace identifier propagated from the transport.
    pub trace_id: Option<TraceId>,
}

/// Result of one scheduler timeout sweep.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Escalations moved to `timeout`.
    pub timed_out: Vec<Escalation>,
    /// Delivery records the caller should hand to the notification sink.
    pub notifications: Vec<DeliveryRecord>,
}

// ============================================================================
// SECTION: Escalation Service
// ============================================================================

/// Service owning escalation transitions.
pub struct EscalationService<S, Q, F, C> {
    /// Storage backend.
    store: Arc<S>,
    /// Pipeline queue for executor hand-off on approval.
    queue: Arc<Q>,
    /// Fast shared state for the in-flight budget.
    fast: Arc<F>,
    /// Clock seam.
    clock: C,
}

impl<S, Q, F, C> EscalationService<S, Q, F, C>
where
    S: IntentStore + EscalationStore + AuditStore,
    Q: JobQueue,
    F: FastStore,
    C: Clock,
{
    /// Creates an escalation service.
    pub const fn new(store: Arc<S>, queue: Arc<Q>, fast: Arc<F>, clock: C) -> Self {
        Self {
            store,
            queue,
            fast,
            clock,
        }
    }

    /// Loads an escalation.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::NotFound`] when absent in the tenant.
    pub fn get(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
    ) -> Result<Escalation, EscalationError> {
        self.store
            .get_escalation(tenant, id)?
            .ok_or_else(|| EscalationError::NotFound(id.clone()))
    }

    /// Lists escalations with keyset pagination.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Store`] when loading fails.
    pub fn list(
        &self,
        tenant: &TenantId,
        filter: &EscalationFilter,
        page: &PageRequest,
    ) -> Result<Page<Escalation>, EscalationError> {
        Ok(self.store.list_escalations(tenant, filter, page)?)
    }

    /// Acknowledges a pending escalation, recording SLA attribution.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Forbidden`] for non-members and
    /// [`EscalationError::AlreadyResolved`] when terminal.
    pub fn acknowledge(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        resolver: &Principal,
        trace_id: Option<TraceId>,
    ) -> Result<Escalation, EscalationError> {
        let escalation = self.get(tenant, id)?;
        authorize_resolver(resolver, &escalation)?;
        let now = self.clock.now();
        let ledger_event = PendingIntentEvent::new(
            escalation.intent_id.clone(),
            tenant.clone(),
            IntentEventType::EscalationAcknowledged,
            json!({"escalationId": id.as_str(), "by": resolver.sub.as_str()}),
            now,
        );
        let audit = self.audit(
            tenant,
            id,
            "escalation.acknowledged",
            "acknowledge",
            AuditSeverity::Info,
            resolver_actor(resolver),
            trace_id,
            now,
        );
        let change = EscalationChange {
            status: Some(EscalationStatus::Acknowledged),
            updated_at: Some(now),
            acknowledged_at: Some(now),
            ..EscalationChange::default()
        };
        let receipt = self
            .store
            .transition_escalation(
                tenant,
                id,
                &[EscalationStatus::Pending],
                change,
                Some(ledger_event),
                None,
                audit,
            )
            .map_err(map_resolution_conflict)?;
        Ok(receipt.escalation)
    }

    /// Approves an escalation; the intent moves `escalated -> approved` in
    /// the same transaction and is handed to the executor queue.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Forbidden`] for non-members and
    /// [`EscalationError::AlreadyResolved`] on a second resolution.
    pub fn approve(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        resolver: &Principal,
        resolution: Resolution,
    ) -> Result<Escalation, EscalationError> {
        let escalation = self.resolve_guard(tenant, id, resolver)?;
        let now = self.clock.now();
        let intent_event = PendingIntentEvent::new(
            escalation.intent_id.clone(),
            tenant.clone(),
            IntentEventType::Approved,
            json!({
                "escalationId": id.as_str(),
                "resolvedBy": resolver.sub.as_str(),
                "notes": resolution.notes,
            }),
            now,
        );
        let audit = self.audit(
            tenant,
            id,
            "escalation.approved",
            "approve",
            AuditSeverity::Info,
            resolver_actor(resolver),
            resolution.trace_id.clone(),
            now,
        );
        let receipt = self
            .store
            .transition_escalation(
                tenant,
                id,
                &[EscalationStatus::Pending, EscalationStatus::Acknowledged],
                self.resolution_change(EscalationStatus::Approved, resolver, &resolution, &escalation, now),
                None,
                Some(IntentTransition {
                    expected: IntentStatus::Escalated,
                    change: IntentChange {
                        status: Some(IntentStatus::Approved),
                        updated_at: Some(now),
                        decided_at: Some(now),
                        ..IntentChange::default()
                    },
                    event: intent_event,
                }),
                audit,
            )
            .map_err(map_resolution_conflict)?;
        let job = Job {
            id: JobId::generate(),
            intent_id: escalation.intent_id.clone(),
            tenant_id: tenant.clone(),
            namespace: NamespaceId::default_namespace(),
            attempt: 1,
        };
        // Executor hand-off; failure here is not fatal to the resolution.
        let _ = self.queue.enqueue(QueueStage::Decision, job);
        Ok(receipt.escalation)
    }

    /// Rejects an escalation; the intent moves `escalated -> denied` in the
    /// same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Forbidden`] for non-members and
    /// [`EscalationError::AlreadyResolved`] on a second resolution.
    pub fn reject(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        resolver: &Principal,
        resolution: Resolution,
    ) -> Result<Escalation, EscalationError> {
        let escalation = self.resolve_guard(tenant, id, resolver)?;
        let now = self.clock.now();
        let intent_event = PendingIntentEvent::new(
            escalation.intent_id.clone(),
            tenant.clone(),
            IntentEventType::Denied,
            json!({
                "escalationId": id.as_str(),
                "resolvedBy": resolver.sub.as_str(),
                "notes": resolution.notes,
            }),
            now,
        );
        let audit = self.audit(
            tenant,
            id,
            "escalation.rejected",
            "reject",
            AuditSeverity::Info,
            resolver_actor(resolver),
            resolution.trace_id.clone(),
            now,
        );
        let receipt = self
            .store
            .transition_escalation(
                tenant,
                id,
                &[EscalationStatus::Pending, EscalationStatus::Acknowledged],
                self.resolution_change(EscalationStatus::Rejected, resolver, &resolution, &escalation, now),
                None,
                Some(IntentTransition {
                    expected: IntentStatus::Escalated,
                    change: IntentChange {
                        status: Some(IntentStatus::Denied),
                        updated_at: Some(now),
                        decided_at: Some(now),
                        ..IntentChange::default()
                    },
                    event: intent_event,
                }),
                audit,
            )
            .map_err(map_resolution_conflict)?;
        self.release_inflight(tenant)?;
        Ok(receipt.escalation)
    }

    /// Scheduler sweep: resolves every due escalation to `timeout`, denying
    /// the intent when the triggering rule set `auto_deny_on_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Store`] when the sweep query fails;
    /// per-escalation races are skipped, not failed.
    pub fn sweep_timeouts(&self, limit: u32) -> Result<SweepOutcome, EscalationError> {
        let now = self.clock.now();
        let due = self.store.due_escalations(now, limit)?;
        let mut outcome = SweepOutcome::default();
        for escalation in due {
            let tenant = escalation.tenant_id.clone();
            let ledger_event = PendingIntentEvent::new(
                escalation.intent_id.clone(),
                tenant.clone(),
                IntentEventType::EscalationTimedOut,
                json!({"escalationId": escalation.id.as_str()}),
                now,
            );
            let audit = self.audit(
                &tenant,
                &escalation.id,
                "escalation.timeout",
                "timeout_sweep",
                AuditSeverity::Warning,
                AuditActor::system(),
                None,
                now,
            );
            let change = EscalationChange {
                status: Some(EscalationStatus::Timeout),
                updated_at: Some(now),
                resolved_at: Some(now),
                sla_breached: Some(true),
                ..EscalationChange::default()
            };
            let intent_transition = if escalation.auto_deny_on_timeout {
                Some(IntentTransition {
                    expected: IntentStatus::Escalated,
                    change: IntentChange {
                        status: Some(IntentStatus::Denied),
                        updated_at: Some(now),
                        decided_at: Some(now),
                        ..IntentChange::default()
                    },
                    event: PendingIntentEvent::new(
                        escalation.intent_id.clone(),
                        tenant.clone(),
                        IntentEventType::Denied,
                        json!({"reason": "escalation-timeout"}),
                        now,
                    ),
                })
            } else {
                None
            };
            let auto_denied = intent_transition.is_some();
            match self.store.transition_escalation(
                &tenant,
                &escalation.id,
                &[EscalationStatus::Pending, EscalationStatus::Acknowledged],
                change,
                Some(ledger_event),
                intent_transition,
                audit,
            ) {
                Ok(receipt) => {
                    if auto_denied {
                        self.release_inflight(&tenant)?;
                    }
                    outcome.notifications.push(DeliveryRecord {
                        kind: DeliveryKind::EscalationTimedOut,
                        tenant_id: tenant,
                        intent_id: receipt.escalation.intent_id.clone(),
                        recipient: receipt.escalation.escalated_to.clone(),
                        subject: "Escalation timed out".to_string(),
                        body: json!({
                            "escalationId": receipt.escalation.id.as_str(),
                            "autoDenied": auto_denied,
                        }),
                        created_at: now,
                    });
                    outcome.timed_out.push(receipt.escalation);
                }
                // A resolver won the race between the due query and the
                // write; the escalation is no longer ours to time out.
                Err(StoreError::StatusConflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Loads and authorizes a resolution attempt.
    fn resolve_guard(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        resolver: &Principal,
    ) -> Result<Escalation, EscalationError> {
        let escalation = self.get(tenant, id)?;
        authorize_resolver(resolver, &escalation)?;
        if escalation.status.is_terminal() {
            return Err(EscalationError::AlreadyResolved);
        }
        Ok(escalation)
    }

    /// Builds the change set for a human resolution.
    fn resolution_change(
        &self,
        status: EscalationStatus,
        resolver: &Principal,
        resolution: &Resolution,
        escalation: &Escalation,
        now: Timestamp,
    ) -> EscalationChange {
        EscalationChange {
            status: Some(status),
            updated_at: Some(now),
            resolved_by: Some(resolver.sub.clone()),
            resolved_at: Some(now),
            resolution_notes: resolution.notes.clone(),
            sla_breached: Some(now > escalation.timeout_at),
            ..EscalationChange::default()
        }
    }

    /// Releases one unit of the tenant's in-flight budget.
    fn release_inflight(&self, tenant: &TenantId) -> Result<(), EscalationError> {
        let _ = self.fast.decrement(&format!("inflight:{tenant}"))?;
        Ok(())
    }

    /// Builds an escalation-category audit record.
    #[allow(clippy::too_many_arguments, reason = "Audit fields are independently varied by callers.")]
    fn audit(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        event_type: &str,
        action: &str,
        severity: AuditSeverity,
        actor: AuditActor,
        trace_id: Option<TraceId>,
        now: Timestamp,
    ) -> PendingAuditRecord {
        PendingAuditRecord {
            id: AuditId::generate(),
            tenant_id: tenant.clone(),
            event_type: event_type.to_string(),
            event_category: AuditCategory::Escalation,
            severity,
            actor,
            target: AuditTarget {
                target_type: "escalation".to_string(),
                target_id: id.to_string(),
            },
            action: action.to_string(),
            outcome: AuditOutcome::Success,
            before: None,
            after: None,
            trace_id,
            span_id: None,
            created_at: now,
        }
    }
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// Authorizes a resolver against an escalation target.
fn authorize_resolver(
    resolver: &Principal,
    escalation: &Escalation,
) -> Result<(), EscalationError> {
    if resolver.tenant_id != escalation.tenant_id {
        return Err(EscalationError::Forbidden);
    }
    if resolver.is_admin() || resolver.is_member_of(&escalation.escalated_to) {
        return Ok(());
    }
    Err(EscalationError::Forbidden)
}

/// Builds the audit actor for a human resolver.
fn resolver_actor(resolver: &Principal) -> AuditActor {
    AuditActor {
        actor_type: "user".to_string(),
        actor_id: resolver.sub.to_string(),
        ip: None,
        user_agent: None,
    }
}

/// Maps a store compare-and-set conflict onto the resolution error.
fn map_resolution_conflict(err: StoreError) -> EscalationError {
    match err {
        StoreError::StatusConflict { .. } => EscalationError::AlreadyResolved,
        other => EscalationError::Store(other),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::IntentId;
    use crate::core::PrincipalId;

    /// Builds a pending escalation addressed to `data-gov`.
    fn escalation() -> Escalation {
        Escalation {
            id: EscalationId::new("esc-1"),
            intent_id: IntentId::new("i-1"),
            tenant_id: TenantId::new("t-1"),
            reason: "threshold".to_string(),
            reason_category: "policy".to_string(),
            escalated_to: "data-gov".to_string(),
            status: EscalationStatus::Pending,
            timeout_at: Timestamp::from_unix_millis(10_000),
            auto_deny_on_timeout: true,
            context: json!({}),
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            sla_breached: false,
            created_at: Timestamp::from_unix_millis(0),
            updated_at: Timestamp::from_unix_millis(0),
        }
    }

    /// Builds a principal in the given tenant with the given groups.
    fn principal(tenant: &str, groups: &[&str], roles: &[&str]) -> Principal {
        Principal {
            sub: PrincipalId::new("user-1"),
            tenant_id: TenantId::new(tenant),
            jti: None,
            iat: Timestamp::from_unix_millis(0),
            exp: Timestamp::from_unix_millis(1),
            roles: roles.iter().map(|role| (*role).to_string()).collect(),
            groups: groups.iter().map(|group| (*group).to_string()).collect(),
        }
    }

    /// Tests group membership authorizes resolution.
    #[test]
    fn test_member_resolves() {
        assert!(authorize_resolver(&principal("t-1", &["data-gov"], &[]), &escalation()).is_ok());
    }

    /// Tests cross-tenant resolvers are rejected even with admin roles.
    #[test]
    fn test_cross_tenant_rejected() {
        let foreign = principal("t-2", &["data-gov"], &["admin"]);
        assert!(matches!(
            authorize_resolver(&foreign, &escalation()),
            Err(EscalationError::Forbidden)
        ));
    }

    /// Tests same-tenant admins resolve without membership.
    #[test]
    fn test_admin_resolves_without_membership() {
        assert!(authorize_resolver(&principal("t-1", &[], &["admin"]), &escalation()).is_ok());
    }

    /// Tests non-members are rejected.
    #[test]
    fn test_non_member_rejected() {
        assert!(matches!(
            authorize_resolver(&principal("t-1", &["other"], &[]), &escalation()),
            Err(EscalationError::Forbidden)
        ));
    }
}
