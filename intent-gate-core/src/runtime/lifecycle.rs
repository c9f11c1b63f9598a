// intent-gate-core/src/runtime/lifecycle.rs
// ============================================================================
// Module: Intent Gate Lifecycle Service
// Description: Submission, deduplication, state-machine transitions, and
//              ledger verification for intents.
// Purpose: Own the single canonical execution path for every intent state
//          change so invariance and auditability hold across API surfaces.
// Dependencies: crate::{core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! The lifecycle service is the only writer of intent state. Every transition
//! is a compare-and-set paired with a ledger event and an audit record in one
//! store transaction; an audit failure aborts the operation. Workers drive
//! the evaluation stages through the same service, so at-most-once terminal
//! transitions hold regardless of retries or crashes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::AuditActor;
use crate::core::AuditCategory;
use crate::core::AuditOutcome;
use crate::core::AuditSeverity;
use crate::core::AuditTarget;
use crate::core::ChainVerification;
use crate::core::Clock;
use crate::core::EntityId;
use crate::core::Escalation;
use crate::core::EscalationDirective;
use crate::core::EscalationStatus;
use crate::core::EvaluationRecord;
use crate::core::EvaluationStage;
use crate::core::HashError;
use crate::core::Intent;
use crate::core::IntentEvent;
use crate::core::IntentEventType;
use crate::core::IntentId;
use crate::core::IntentStatus;
use crate::core::JobId;
use crate::core::NamespaceId;
use crate::core::PendingAuditRecord;
use crate::core::PendingIntentEvent;
use crate::core::RuleAction;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::TrustSnapshot;
use crate::core::hashing::dedupe_hash;
use crate::core::identifiers::AuditId;
use crate::core::identifiers::EscalationId;
use crate::core::intent::MAX_CONTEXT_BYTES;
use crate::core::intent::MAX_GOAL_CHARS;
use crate::core::intent::MAX_PRIORITY;
use crate::core::intent::verify_event_chain;
use crate::interfaces::AuditStore;
use crate::interfaces::EscalationChange;
use crate::interfaces::EscalationStore;
use crate::interfaces::FastStore;
use crate::interfaces::FastStoreError;
use crate::interfaces::IntentChange;
use crate::interfaces::IntentFilter;
use crate::interfaces::IntentStore;
use crate::interfaces::IntentTransition;
use crate::interfaces::Job;
use crate::interfaces::JobQueue;
use crate::interfaces::Page;
use crate::interfaces::PageRequest;
use crate::interfaces::QueueStage;
use crate::interfaces::StoreError;
use crate::runtime::evaluator::PolicyDecision;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Lifecycle service configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// TTL of the dedupe lock taken at submission.
    pub dedupe_ttl_ms: i64,
    /// Dotted context paths replaced on soft delete; empty redacts the whole
    /// context.
    pub redaction_paths: Vec<String>,
    /// Routing table from intent type to namespace.
    pub namespace_routes: BTreeMap<String, NamespaceId>,
    /// Per-tenant in-flight intent cap.
    pub tenant_concurrency_cap: u32,
    /// Delay applied to jobs enqueued above the concurrency cap.
    pub over_cap_delay_ms: u64,
    /// Per-tenant submissions allowed per rate window.
    pub submit_rate_limit: u32,
    /// Submission rate window in milliseconds.
    pub submit_rate_window_ms: i64,
    /// Whether a degraded trust snapshot blocks direct approval.
    pub degraded_blocks_approval: bool,
    /// Escalation target used when a degraded approval is demoted.
    pub degraded_escalation_to: String,
    /// Escalation timeout used when a degraded approval is demoted.
    pub degraded_escalation_timeout_ms: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            dedupe_ttl_ms: 10_000,
            redaction_paths: Vec::new(),
            namespace_routes: BTreeMap::new(),
            tenant_concurrency_cap: 32,
            over_cap_delay_ms: 1_000,
            submit_rate_limit: 60,
            submit_rate_window_ms: 60_000,
            degraded_blocks_approval: true,
            degraded_escalation_to: "governance".to_string(),
            degraded_escalation_timeout_ms: 3_600_000,
        }
    }
}

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// Intent submission payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    /// Submitting entity.
    pub entity_id: EntityId,
    /// Free-text goal.
    pub goal: String,
    /// Optional intent type tag.
    pub intent_type: Option<String>,
    /// Priority 0..=9; defaults to 0.
    pub priority: Option<i64>,
    /// Submission context mapping.
    pub context: Value,
    /// Submitter metadata mapping.
    pub metadata: BTreeMap<String, Value>,
    /// Optional client-supplied idempotency key.
    pub idempotency_key: Option<String>,
}

/// Caller identity threaded into audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Acting principal or system.
    pub actor: AuditActor,
    /// Trace identifier propagated from the transport.
    pub trace_id: Option<TraceId>,
}

impl OperationContext {
    /// Builds the system operation context used by workers and the
    /// scheduler.
    #[must_use]
    pub fn system() -> Self {
        Self {
            actor: AuditActor::system(),
            trace_id: None,
        }
    }
}

/// Submission outcome: a newly created intent or the deduplicated original.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// The governing intent record.
    pub intent: Intent,
    /// True when this call created the record.
    pub created: bool,
}

/// Outcome of applying a policy decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionApplied {
    /// Intent approved; executor hand-off enqueued.
    Approved(Intent),
    /// Intent denied.
    Denied(Intent),
    /// Escalation created; notification due.
    Escalated {
        /// Updated intent row.
        intent: Intent,
        /// Created escalation row.
        escalation: Escalation,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lifecycle service errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Caller mistake; never retried.
    #[error("validation error: {0}")]
    Validation(String),
    /// Per-tenant submission budget exhausted.
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait.
        retry_after_secs: u64,
    },
    /// Dedupe lock held by a concurrent submission whose record is not yet
    /// visible.
    #[error("duplicate submission in flight")]
    Locked,
    /// Intent does not exist in the caller's tenant.
    #[error("intent not found: {0}")]
    NotFound(IntentId),
    /// Operation not permitted from the intent's current status.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// Queue cannot accept work; submission fails fast.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Fast-store failure.
    #[error(transparent)]
    Fast(#[from] FastStoreError),
    /// Canonicalization failure.
    #[error(transparent)]
    Hashing(#[from] HashError),
}

// ============================================================================
// SECTION: Lifecycle Service
// ============================================================================

/// Orchestrator owning the intent state machine.
pub struct LifecycleService<S, Q, F, C> {
    /// Storage backend.
    store: Arc<S>,
    /// Pipeline queue.
    queue: Arc<Q>,
    /// Fast shared state.
    fast: Arc<F>,
    /// Clock seam.
    clock: C,
    /// Service configuration.
    config: LifecycleConfig,
}

impl<S, Q, F, C> LifecycleService<S, Q, F, C>
where
    S: IntentStore + EscalationStore + AuditStore,
    Q: JobQueue,
    F: FastStore,
    C: Clock,
{
    /// Creates a lifecycle service.
    pub fn new(store: Arc<S>, queue: Arc<Q>, fast: Arc<F>, clock: C, config: LifecycleConfig) -> Self {
        Self {
            store,
            queue,
            fast,
            clock,
            config,
        }
    }

    /// Returns the configured namespace for an intent type.
    #[must_use]
    pub fn route_namespace(&self, intent_type: Option<&str>) -> NamespaceId {
        intent_type
            .and_then(|tag| self.config.namespace_routes.get(tag).cloned())
            .unwrap_or_else(NamespaceId::default_namespace)
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Submits an intent: validate, dedupe, persist, enqueue intake.
    ///
    /// Identical in-flight submissions collapse onto the original record.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] for payload defects,
    /// [`LifecycleError::RateLimited`] when the tenant budget is exhausted,
    /// [`LifecycleError::Locked`] when a concurrent duplicate holds the
    /// dedupe lock, and [`LifecycleError::QueueUnavailable`] when intake
    /// cannot be enqueued.
    pub fn submit(
        &self,
        tenant: &TenantId,
        request: SubmitRequest,
        op: &OperationContext,
    ) -> Result<SubmitOutcome, LifecycleError> {
        let now = self.clock.now();
        let priority = validate_submission(&request)?;

        if let Some(key) = request.idempotency_key.as_deref()
            && let Some(existing) = self.store.find_by_idempotency_key(tenant, key)?
        {
            return Ok(SubmitOutcome {
                intent: existing,
                created: false,
            });
        }

        let rate = self.fast.rate_check(
            &format!("rate:submit:{tenant}"),
            self.config.submit_rate_limit,
            self.config.submit_rate_window_ms,
            now,
        )?;
        if !rate.allowed {
            return Err(LifecycleError::RateLimited {
                retry_after_secs: rate.retry_after_secs,
            });
        }

        let digest = dedupe_hash(
            tenant.as_str(),
            request.entity_id.as_str(),
            &request.goal,
            &request.context,
        )?;
        let lock_key = format!("dedupe:{tenant}:{digest}");
        if !self.fast.try_lock(&lock_key, self.config.dedupe_ttl_ms, now)? {
            if let Some(existing) = self.store.find_active_dedupe(tenant, &digest)? {
                return Ok(SubmitOutcome {
                    intent: existing,
                    created: false,
                });
            }
            return Err(LifecycleError::Locked);
        }

        let intent = Intent {
            id: IntentId::generate(),
            tenant_id: tenant.clone(),
            entity_id: request.entity_id,
            goal: request.goal,
            intent_type: request.intent_type,
            priority,
            context: request.context,
            metadata: request.metadata,
            status: IntentStatus::Pending,
            trust_snapshot: None,
            trust_level: None,
            trust_score: None,
            policy_version: None,
            dedupe_hash: digest,
            idempotency_key: request.idempotency_key,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            evaluated_at: None,
            decided_at: None,
            completed_at: None,
            deleted_at: None,
        };

        let event = PendingIntentEvent::new(
            intent.id.clone(),
            tenant.clone(),
            IntentEventType::Submitted,
            json!({
                "entityId": intent.entity_id.as_str(),
                "intentType": intent.intent_type,
                "priority": intent.priority,
            }),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            &intent.id,
            "intent.submitted",
            "submit",
            AuditSeverity::Info,
            AuditOutcome::Success,
            op,
            now,
        );

        let receipt = match self.store.submit_intent(&intent, event, audit) {
            Ok(receipt) => receipt,
            Err(StoreError::DuplicateIntent { existing }) => {
                self.fast.unlock(&lock_key)?;
                let original = self
                    .store
                    .get_intent(tenant, &existing)?
                    .ok_or(LifecycleError::NotFound(existing))?;
                return Ok(SubmitOutcome {
                    intent: original,
                    created: false,
                });
            }
            Err(err) => {
                self.fast.unlock(&lock_key)?;
                return Err(err.into());
            }
        };

        let inflight = self.fast.increment(&format!("inflight:{tenant}"))?;
        let job = Job {
            id: JobId::generate(),
            intent_id: receipt.intent.id.clone(),
            tenant_id: tenant.clone(),
            namespace: self.route_namespace(receipt.intent.intent_type.as_deref()),
            attempt: 1,
        };
        let enqueue_result = if inflight > i64::from(self.config.tenant_concurrency_cap) {
            self.queue.enqueue_delayed(QueueStage::Intake, job, self.config.over_cap_delay_ms)
        } else {
            self.queue.enqueue(QueueStage::Intake, job)
        };
        if let Err(err) = enqueue_result {
            // No partial in-flight state: fail the intent terminally so the
            // dedupe key frees and the submitter can retry or replay.
            self.fail_intent(tenant, &receipt.intent.id, IntentStatus::Pending, "queue-unavailable", op)?;
            self.fast.unlock(&lock_key)?;
            return Err(LifecycleError::QueueUnavailable(err.to_string()));
        }

        Ok(SubmitOutcome {
            intent: receipt.intent,
            created: true,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Loads an intent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when absent in the tenant.
    pub fn get(&self, tenant: &TenantId, id: &IntentId) -> Result<Intent, LifecycleError> {
        self.store
            .get_intent(tenant, id)?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    /// Loads an intent with its ledger and evaluation traces.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when absent in the tenant.
    pub fn get_with_events(
        &self,
        tenant: &TenantId,
        id: &IntentId,
    ) -> Result<(Intent, Vec<IntentEvent>, Vec<EvaluationRecord>), LifecycleError> {
        let intent = self.get(tenant, id)?;
        let events = self.store.list_events(tenant, id)?;
        let evaluations = self.store.list_evaluations(tenant, id)?;
        Ok((intent, events, evaluations))
    }

    /// Lists intents with keyset pagination.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] when loading fails.
    pub fn list(
        &self,
        tenant: &TenantId,
        filter: &IntentFilter,
        page: &PageRequest,
    ) -> Result<Page<Intent>, LifecycleError> {
        Ok(self.store.list_intents(tenant, filter, page)?)
    }

    /// Loads the ledger for an intent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when absent in the tenant.
    pub fn events(
        &self,
        tenant: &TenantId,
        id: &IntentId,
    ) -> Result<Vec<IntentEvent>, LifecycleError> {
        let _ = self.get(tenant, id)?;
        Ok(self.store.list_events(tenant, id)?)
    }

    // ------------------------------------------------------------------
    // Cancellation, deletion, replay
    // ------------------------------------------------------------------

    /// Cancels an intent from `pending`, `evaluating`, or `escalated`.
    ///
    /// In-flight workers observe the cancel marker at their next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] when the intent is not
    /// cancellable (a second cancel lands here).
    pub fn cancel(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        reason: &str,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        let now = self.clock.now();
        self.fast.set_marker(&format!("cancel:{tenant}:{id}"), 3_600_000, now)?;

        // CAS with a bounded retry: a worker may move the intent between our
        // read and the write.
        for _ in 0..3 {
            let intent = self.get(tenant, id)?;
            if !intent.status.is_cancellable() {
                return Err(LifecycleError::InvalidState("intent is not cancellable"));
            }
            let event = PendingIntentEvent::new(
                id.clone(),
                tenant.clone(),
                IntentEventType::Cancelled,
                json!({"reason": reason, "from": intent.status.as_str()}),
                now,
            );
            let audit = self.audit_intent(
                tenant,
                id,
                "intent.cancelled",
                "cancel",
                AuditSeverity::Info,
                AuditOutcome::Success,
                op,
                now,
            );
            let change = IntentChange {
                status: Some(IntentStatus::Cancelled),
                updated_at: Some(now),
                decided_at: Some(now),
                cancellation_reason: Some(reason.to_string()),
                ..IntentChange::default()
            };
            match self.store.transition_intent(tenant, id, intent.status, change, event, audit) {
                Ok(receipt) => {
                    self.cancel_active_escalation(tenant, id, op, now)?;
                    self.release_inflight(tenant)?;
                    return Ok(receipt.intent);
                }
                Err(StoreError::StatusConflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Err(LifecycleError::InvalidState("intent is not cancellable"))
    }

    /// Soft-deletes an intent: redacts context per the configured path list,
    /// sets `deleted_at`, keeps the ledger and audit chain.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when absent in the tenant.
    pub fn delete(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        op: &OperationContext,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        let intent = self.get(tenant, id)?;
        let redacted = redact_context(&intent.context, &self.config.redaction_paths);
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Redacted,
            json!({"paths": self.config.redaction_paths}),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            id,
            "intent.redacted",
            "delete",
            AuditSeverity::Info,
            AuditOutcome::Success,
            op,
            now,
        );
        self.store.redact_intent(tenant, id, now, redacted, event, audit)?;
        Ok(())
    }

    /// Replays a `failed` or `denied` intent: resets it to `pending` and
    /// re-enqueues intake. Soft-deleted intents cannot be replayed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] when replay is not permitted.
    pub fn replay(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        let now = self.clock.now();
        let intent = self.get(tenant, id)?;
        if intent.deleted_at.is_some() {
            return Err(LifecycleError::InvalidState("soft-deleted intents cannot be replayed"));
        }
        if !intent.status.is_replayable() {
            return Err(LifecycleError::InvalidState("only failed or denied intents can be replayed"));
        }
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Replayed,
            json!({"from": intent.status.as_str()}),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            id,
            "intent.replayed",
            "replay",
            AuditSeverity::Info,
            AuditOutcome::Success,
            op,
            now,
        );
        let change = IntentChange {
            status: Some(IntentStatus::Pending),
            updated_at: Some(now),
            ..IntentChange::default()
        };
        let receipt =
            self.store.transition_intent(tenant, id, intent.status, change, event, audit)?;

        let _ = self.fast.increment(&format!("inflight:{tenant}"))?;
        let job = Job {
            id: JobId::generate(),
            intent_id: id.clone(),
            tenant_id: tenant.clone(),
            namespace: self.route_namespace(receipt.intent.intent_type.as_deref()),
            attempt: 1,
        };
        self.queue
            .enqueue(QueueStage::Intake, job)
            .map_err(|err| LifecycleError::QueueUnavailable(err.to_string()))?;
        Ok(receipt.intent)
    }

    // ------------------------------------------------------------------
    // Worker-facing transitions
    // ------------------------------------------------------------------

    /// Compare-and-set status update used by workers and executors.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] when the lifecycle graph
    /// forbids `expected -> next`, and propagates the store's conflict when
    /// the compare-and-set loses a race.
    pub fn update_status(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        expected: IntentStatus,
        next: IntentStatus,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        if !expected.can_transition_to(next) {
            return Err(LifecycleError::InvalidState("transition not permitted by lifecycle graph"));
        }
        let now = self.clock.now();
        let event_type = ledger_event_for(next)
            .ok_or(LifecycleError::InvalidState("status has no ledger event"))?;
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            event_type,
            json!({"from": expected.as_str(), "to": next.as_str()}),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            id,
            event_type.as_str(),
            "update_status",
            AuditSeverity::Info,
            AuditOutcome::Success,
            op,
            now,
        );
        let change = IntentChange {
            status: Some(next),
            updated_at: Some(now),
            decided_at: if next.is_terminal() { Some(now) } else { None },
            completed_at: if next == IntentStatus::Completed { Some(now) } else { None },
            ..IntentChange::default()
        };
        let receipt = self.store.transition_intent(tenant, id, expected, change, event, audit)?;
        if next.is_terminal() {
            self.release_inflight(tenant)?;
        }
        Ok(receipt.intent)
    }

    /// Intake transition: `pending -> evaluating`, freezing the trust
    /// snapshot onto the intent.
    ///
    /// # Errors
    ///
    /// Propagates the store conflict when the intent left `pending`.
    pub fn begin_evaluation(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        snapshot: &TrustSnapshot,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        let now = self.clock.now();
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Evaluating,
            json!({"degraded": snapshot.degraded, "trustLevel": snapshot.trust_level}),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            id,
            "intent.evaluating",
            "begin_evaluation",
            AuditSeverity::Info,
            AuditOutcome::Success,
            op,
            now,
        );
        let change = IntentChange {
            status: Some(IntentStatus::Evaluating),
            updated_at: Some(now),
            evaluated_at: Some(now),
            trust_snapshot: Some(serde_json::to_value(snapshot).unwrap_or(Value::Null)),
            trust_level: Some(snapshot.trust_level),
            trust_score: Some(snapshot.trust_score),
            ..IntentChange::default()
        };
        let receipt = self
            .store
            .transition_intent(tenant, id, IntentStatus::Pending, change, event, audit)?;
        Ok(receipt.intent)
    }

    /// Applies a policy decision to an `evaluating` intent.
    ///
    /// A degraded snapshot demotes direct approval to escalation when the
    /// trust gate is enabled; the demotion is recorded at stage
    /// `trust-gate`.
    ///
    /// # Errors
    ///
    /// Propagates the store conflict when the intent left `evaluating`.
    pub fn apply_decision(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        decision: &PolicyDecision,
        degraded: bool,
        op: &OperationContext,
    ) -> Result<DecisionApplied, LifecycleError> {
        let now = self.clock.now();
        let gated = self.apply_trust_gate(tenant, id, decision, degraded, now)?;
        match gated.action {
            RuleAction::Allow | RuleAction::Limit => {
                self.approve(tenant, id, &gated, now, op).map(DecisionApplied::Approved)
            }
            RuleAction::Deny | RuleAction::Terminate => {
                self.deny(tenant, id, &gated, now, op).map(DecisionApplied::Denied)
            }
            RuleAction::Escalate => self.escalate(tenant, id, &gated, now, op),
            RuleAction::Monitor => {
                // The evaluator never returns a bare monitor outcome; treat a
                // stray one as a policy error and fail closed.
                let denied = PolicyDecision::policy_error();
                self.deny(tenant, id, &denied, now, op).map(DecisionApplied::Denied)
            }
        }
    }

    /// Fails an intent from an expected status (worker error paths).
    ///
    /// # Errors
    ///
    /// Propagates the store conflict when the compare-and-set loses.
    pub fn fail_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        expected: IntentStatus,
        reason: &str,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        let now = self.clock.now();
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Failed,
            json!({"reason": reason}),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            id,
            "intent.failed",
            "fail",
            AuditSeverity::Error,
            AuditOutcome::Failure,
            op,
            now,
        );
        let change = IntentChange {
            status: Some(IntentStatus::Failed),
            updated_at: Some(now),
            decided_at: Some(now),
            ..IntentChange::default()
        };
        let receipt = self.store.transition_intent(tenant, id, expected, change, event, audit)?;
        self.release_inflight(tenant)?;
        Ok(receipt.intent)
    }

    /// Records an evaluation trace row.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] when the append fails.
    pub fn record_evaluation(&self, record: &EvaluationRecord) -> Result<(), LifecycleError> {
        Ok(self.store.append_evaluation(record)?)
    }

    /// Returns true when a cancel marker is set for the intent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Fast`] when the fast store fails.
    pub fn cancel_requested(&self, tenant: &TenantId, id: &IntentId) -> Result<bool, LifecycleError> {
        Ok(self.fast.marker_set(&format!("cancel:{tenant}:{id}"), self.clock.now())?)
    }

    /// Records the cooperative-cancellation trace row for an aborted stage.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] when the append fails.
    pub fn record_cancellation_observed(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        stage: &str,
    ) -> Result<(), LifecycleError> {
        self.record_evaluation(&EvaluationRecord {
            intent_id: id.clone(),
            tenant_id: tenant.clone(),
            stage: EvaluationStage::Cancelled,
            result: json!({"abortedStage": stage}),
            duration_ms: 0,
            policy_id: None,
            policy_version: None,
            created_at: self.clock.now(),
        })
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Recomputes the ledger chain for an intent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when absent in the tenant.
    pub fn verify_chain(
        &self,
        tenant: &TenantId,
        id: &IntentId,
    ) -> Result<ChainVerification, LifecycleError> {
        let _ = self.get(tenant, id)?;
        let events = self.store.list_events(tenant, id)?;
        Ok(verify_event_chain(&events)?)
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Demotes a degraded approval to escalation when the trust gate is on.
    fn apply_trust_gate(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        decision: &PolicyDecision,
        degraded: bool,
        now: Timestamp,
    ) -> Result<PolicyDecision, LifecycleError> {
        let promotes = matches!(decision.action, RuleAction::Allow | RuleAction::Limit);
        if !(degraded && promotes && self.config.degraded_blocks_approval) {
            return Ok(decision.clone());
        }
        self.record_evaluation(&EvaluationRecord {
            intent_id: id.clone(),
            tenant_id: tenant.clone(),
            stage: EvaluationStage::TrustGate,
            result: json!({
                "demoted": "escalate",
                "originalAction": decision.action.as_str(),
                "reason": "degraded-trust-snapshot",
            }),
            duration_ms: 0,
            policy_id: decision.matched_policy_id.clone(),
            policy_version: decision.matched_policy_version,
            created_at: now,
        })?;
        let mut demoted = decision.clone();
        demoted.action = RuleAction::Escalate;
        demoted.reason = "degraded-trust-snapshot".to_string();
        demoted.escalation = Some(EscalationDirective {
            to: self.config.degraded_escalation_to.clone(),
            timeout_ms: self.config.degraded_escalation_timeout_ms,
            require_justification: false,
            auto_deny_on_timeout: false,
        });
        Ok(demoted)
    }

    /// Terminal approval transition plus executor hand-off.
    fn approve(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        decision: &PolicyDecision,
        now: Timestamp,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Approved,
            decision_payload(decision),
            now,
        );
        let audit = self.audit_intent(
            tenant,
            id,
            "intent.approved",
            "decide",
            AuditSeverity::Info,
            AuditOutcome::Success,
            op,
            now,
        );
        let change = IntentChange {
            status: Some(IntentStatus::Approved),
            updated_at: Some(now),
            decided_at: Some(now),
            policy_version: decision.matched_policy_version,
            ..IntentChange::default()
        };
        let receipt = self
            .store
            .transition_intent(tenant, id, IntentStatus::Evaluating, change, event, audit)?;
        let job = Job {
            id: JobId::generate(),
            intent_id: id.clone(),
            tenant_id: tenant.clone(),
            namespace: self.route_namespace(receipt.intent.intent_type.as_deref()),
            attempt: 1,
        };
        // Executor hand-off; failure here is not fatal to the decision.
        let _ = self.queue.enqueue(QueueStage::Decision, job);
        Ok(receipt.intent)
    }

    /// Terminal denial transition.
    fn deny(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        decision: &PolicyDecision,
        now: Timestamp,
        op: &OperationContext,
    ) -> Result<Intent, LifecycleError> {
        let severity = if decision.reason == "policy-error" {
            AuditSeverity::Error
        } else {
            AuditSeverity::Info
        };
        let outcome = if decision.reason == "policy-error" {
            AuditOutcome::Failure
        } else {
            AuditOutcome::Success
        };
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Denied,
            decision_payload(decision),
            now,
        );
        let audit =
            self.audit_intent(tenant, id, "intent.denied", "decide", severity, outcome, op, now);
        let change = IntentChange {
            status: Some(IntentStatus::Denied),
            updated_at: Some(now),
            decided_at: Some(now),
            policy_version: decision.matched_policy_version,
            ..IntentChange::default()
        };
        let receipt = self
            .store
            .transition_intent(tenant, id, IntentStatus::Evaluating, change, event, audit)?;
        self.release_inflight(tenant)?;
        Ok(receipt.intent)
    }

    /// Creates the escalation and transitions `evaluating -> escalated`.
    fn escalate(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        decision: &PolicyDecision,
        now: Timestamp,
        op: &OperationContext,
    ) -> Result<DecisionApplied, LifecycleError> {
        let directive = decision.escalation.clone().ok_or(LifecycleError::InvalidState(
            "escalate decision without a directive",
        ))?;
        let intent = self.get(tenant, id)?;
        let escalation = Escalation {
            id: EscalationId::generate(),
            intent_id: id.clone(),
            tenant_id: tenant.clone(),
            reason: decision.reason.clone(),
            reason_category: decision
                .matched_rule_id
                .as_ref()
                .map_or_else(|| "policy".to_string(), |rule| format!("rule:{rule}")),
            escalated_to: directive.to.clone(),
            status: EscalationStatus::Pending,
            timeout_at: now.plus_millis(directive.timeout_ms),
            auto_deny_on_timeout: directive.auto_deny_on_timeout,
            context: json!({
                "goal": intent.goal,
                "intentType": intent.intent_type,
                "policyId": decision.matched_policy_id,
                "ruleId": decision.matched_rule_id,
            }),
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            sla_breached: false,
            created_at: now,
            updated_at: now,
        };
        let event = PendingIntentEvent::new(
            id.clone(),
            tenant.clone(),
            IntentEventType::Escalated,
            json!({
                "escalationId": escalation.id.as_str(),
                "escalatedTo": escalation.escalated_to,
                "timeoutAt": escalation.timeout_at.as_unix_millis(),
                "reason": escalation.reason,
            }),
            now,
        );
        let audit = PendingAuditRecord {
            id: AuditId::generate(),
            tenant_id: tenant.clone(),
            event_type: "escalation.created".to_string(),
            event_category: AuditCategory::Escalation,
            severity: AuditSeverity::Info,
            actor: op.actor.clone(),
            target: AuditTarget {
                target_type: "escalation".to_string(),
                target_id: escalation.id.to_string(),
            },
            action: "escalate".to_string(),
            outcome: AuditOutcome::Success,
            before: None,
            after: None,
            trace_id: op.trace_id.clone(),
            span_id: None,
            created_at: now,
        };
        let transition = IntentTransition {
            expected: IntentStatus::Evaluating,
            change: IntentChange {
                status: Some(IntentStatus::Escalated),
                updated_at: Some(now),
                policy_version: decision.matched_policy_version,
                ..IntentChange::default()
            },
            event,
        };
        let receipt = self.store.insert_escalation(&escalation, transition, audit)?;
        let intent = receipt.intent.unwrap_or(intent);
        Ok(DecisionApplied::Escalated {
            intent,
            escalation: receipt.escalation,
        })
    }

    /// Cancels the active escalation of a cancelled intent, when one exists.
    fn cancel_active_escalation(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        op: &OperationContext,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        let Some(active) = self.store.active_escalation_for_intent(tenant, id)? else {
            return Ok(());
        };
        let audit = PendingAuditRecord {
            id: AuditId::generate(),
            tenant_id: tenant.clone(),
            event_type: "escalation.cancelled".to_string(),
            event_category: AuditCategory::Escalation,
            severity: AuditSeverity::Info,
            actor: op.actor.clone(),
            target: AuditTarget {
                target_type: "escalation".to_string(),
                target_id: active.id.to_string(),
            },
            action: "cancel".to_string(),
            outcome: AuditOutcome::Success,
            before: None,
            after: None,
            trace_id: op.trace_id.clone(),
            span_id: None,
            created_at: now,
        };
        let change = EscalationChange {
            status: Some(EscalationStatus::Cancelled),
            updated_at: Some(now),
            resolved_at: Some(now),
            ..EscalationChange::default()
        };
        self.store.transition_escalation(
            tenant,
            &active.id,
            &[EscalationStatus::Pending, EscalationStatus::Acknowledged],
            change,
            None,
            None,
            audit,
        )?;
        Ok(())
    }

    /// Releases one unit of the tenant's in-flight budget.
    fn release_inflight(&self, tenant: &TenantId) -> Result<(), LifecycleError> {
        let _ = self.fast.decrement(&format!("inflight:{tenant}"))?;
        Ok(())
    }

    /// Builds an intent-category audit record.
    #[allow(clippy::too_many_arguments, reason = "Audit fields are independently varied by callers.")]
    fn audit_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        event_type: &str,
        action: &str,
        severity: AuditSeverity,
        outcome: AuditOutcome,
        op: &OperationContext,
        now: Timestamp,
    ) -> PendingAuditRecord {
        PendingAuditRecord {
            id: AuditId::generate(),
            tenant_id: tenant.clone(),
            event_type: event_type.to_string(),
            event_category: AuditCategory::Intent,
            severity,
            actor: op.actor.clone(),
            target: AuditTarget {
                target_type: "intent".to_string(),
                target_id: id.to_string(),
            },
            action: action.to_string(),
            outcome,
            before: None,
            after: None,
            trace_id: op.trace_id.clone(),
            span_id: None,
            created_at: now,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates submission limits and returns the effective priority.
fn validate_submission(request: &SubmitRequest) -> Result<u8, LifecycleError> {
    if request.goal.trim().is_empty() {
        return Err(LifecycleError::Validation("goal must not be empty".to_string()));
    }
    let goal_chars = request.goal.chars().count();
    if goal_chars > MAX_GOAL_CHARS {
        return Err(LifecycleError::Validation(format!(
            "goal exceeds {MAX_GOAL_CHARS} characters ({goal_chars})"
        )));
    }
    let priority = request.priority.unwrap_or(0);
    if !(0..=i64::from(MAX_PRIORITY)).contains(&priority) {
        return Err(LifecycleError::Validation(format!(
            "priority must be between 0 and {MAX_PRIORITY}"
        )));
    }
    let context_bytes = crate::core::hashing::canonical_json_bytes(&request.context)
        .map_err(|err| LifecycleError::Validation(err.to_string()))?
        .len();
    if context_bytes > MAX_CONTEXT_BYTES {
        return Err(LifecycleError::Validation(format!(
            "context exceeds {MAX_CONTEXT_BYTES} bytes ({context_bytes})"
        )));
    }
    #[allow(clippy::cast_possible_truncation, reason = "Range-checked above.")]
    Ok(priority as u8)
}

/// Maps a status to the ledger event its transition writes.
const fn ledger_event_for(status: IntentStatus) -> Option<IntentEventType> {
    match status {
        IntentStatus::Evaluating => Some(IntentEventType::Evaluating),
        IntentStatus::Approved => Some(IntentEventType::Approved),
        IntentStatus::Denied => Some(IntentEventType::Denied),
        IntentStatus::Escalated => Some(IntentEventType::Escalated),
        IntentStatus::Executing => Some(IntentEventType::Executing),
        IntentStatus::Completed => Some(IntentEventType::Completed),
        IntentStatus::Failed => Some(IntentEventType::Failed),
        IntentStatus::Cancelled => Some(IntentEventType::Cancelled),
        IntentStatus::Pending => None,
    }
}

/// Builds the ledger payload for a decision event.
fn decision_payload(decision: &PolicyDecision) -> Value {
    json!({
        "action": decision.action.as_str(),
        "reason": decision.reason,
        "policyId": decision.matched_policy_id,
        "policyVersion": decision.matched_policy_version,
        "ruleId": decision.matched_rule_id,
        "constraints": decision.constraints,
    })
}

/// Redacts a context document along the configured dotted paths; an empty
/// path list redacts the whole document.
#[must_use]
pub fn redact_context(context: &Value, paths: &[String]) -> Value {
    if paths.is_empty() {
        return json!({"redacted": true});
    }
    let mut redacted = context.clone();
    for path in paths {
        redact_path(&mut redacted, path);
    }
    redacted
}

/// Replaces the value at a dotted path with a redaction placeholder.
fn redact_path(value: &mut Value, path: &str) {
    let mut segments = path.split('.').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        let Some(object) = current.as_object_mut() else {
            return;
        };
        if segments.peek().is_none() {
            if object.contains_key(segment) {
                object.insert(segment.to_string(), Value::String("[redacted]".to_string()));
            }
            return;
        }
        let Some(next) = object.get_mut(segment) else {
            return;
        };
        current = next;
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::*;

    /// Tests whole-context redaction with an empty path list.
    #[test]
    fn test_redact_whole_context() {
        let context = json!({"secret": "s3cr3t", "public": 1});
        assert_eq!(redact_context(&context, &[]), json!({"redacted": true}));
    }

    /// Tests path-targeted redaction leaves other fields intact.
    #[test]
    fn test_redact_paths() {
        let context = json!({"customer": {"ssn": "123-45-6789", "name": "ok"}, "count": 2});
        let redacted = redact_context(&context, &["customer.ssn".to_string()]);
        assert_eq!(redacted["customer"]["ssn"], json!("[redacted]"));
        assert_eq!(redacted["customer"]["name"], json!("ok"));
        assert_eq!(redacted["count"], json!(2));
    }

    /// Tests missing redaction paths are ignored.
    #[test]
    fn test_redact_missing_path_is_noop() {
        let context = json!({"a": 1});
        let redacted = redact_context(&context, &["b.c".to_string()]);
        assert_eq!(redacted, context);
    }

    /// Tests submission validation boundaries for goal, priority, and
    /// context size.
    #[test]
    fn test_validate_submission_boundaries() {
        let base = SubmitRequest {
            entity_id: EntityId::new("e-1"),
            goal: "g".repeat(MAX_GOAL_CHARS),
            intent_type: None,
            priority: Some(9),
            context: json!({}),
            metadata: BTreeMap::new(),
            idempotency_key: None,
        };
        assert!(validate_submission(&base).is_ok());

        let mut long_goal = base.clone();
        long_goal.goal = "g".repeat(MAX_GOAL_CHARS + 1);
        assert!(matches!(validate_submission(&long_goal), Err(LifecycleError::Validation(_))));

        let mut bad_priority = base.clone();
        bad_priority.priority = Some(10);
        assert!(matches!(validate_submission(&bad_priority), Err(LifecycleError::Validation(_))));

        let mut negative_priority = base.clone();
        negative_priority.priority = Some(-1);
        assert!(matches!(
            validate_submission(&negative_priority),
            Err(LifecycleError::Validation(_))
        ));

        let mut big_context = base;
        big_context.context = json!({"blob": "x".repeat(MAX_CONTEXT_BYTES)});
        assert!(matches!(validate_submission(&big_context), Err(LifecycleError::Validation(_))));
    }

    /// Tests every non-pending status maps to a ledger event.
    #[test]
    fn test_ledger_event_mapping() {
        assert_eq!(ledger_event_for(IntentStatus::Pending), None);
        assert_eq!(ledger_event_for(IntentStatus::Approved), Some(IntentEventType::Approved));
        assert_eq!(ledger_event_for(IntentStatus::Completed), Some(IntentEventType::Completed));
    }
}
