// intent-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Intent Gate Interfaces
// Description: Backend-agnostic interfaces for storage, fast state, queues,
//              trust, and notification delivery.
// Purpose: Define the contract surfaces used by the Intent Gate runtime.
// Dependencies: crate::core, async-trait, serde
// ============================================================================

//! ## Overview
//! Interfaces define how Intent Gate integrates with external systems without
//! embedding backend-specific details. Storage traits are synchronous and
//! transactional per call: methods that pair a domain write with ledger and
//! audit appends must commit all of them atomically or none. Implementations
//! must be deterministic and fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::AuditStats;
use crate::core::ChainCheckpoint;
use crate::core::DeliveryRecord;
use crate::core::Escalation;
use crate::core::EscalationId;
use crate::core::EscalationStatus;
use crate::core::EvaluationRecord;
use crate::core::HashDigest;
use crate::core::HistorySummary;
use crate::core::HashError;
use crate::core::Intent;
use crate::core::IntentEvent;
use crate::core::IntentId;
use crate::core::IntentStatus;
use crate::core::JobId;
use crate::core::NamespaceId;
use crate::core::PendingAuditRecord;
use crate::core::PendingIntentEvent;
use crate::core::Policy;
use crate::core::PolicyId;
use crate::core::PolicyStatus;
use crate::core::PrincipalId;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::TrustSnapshot;
use crate::core::identifiers::EntityId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage layer errors shared by every store trait.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Record serialization failed.
    #[error("store serialization error: {0}")]
    Serialization(String),
    /// Canonical hashing or signing failed while sealing a chain link.
    #[error("store hashing error: {0}")]
    Hashing(String),
    /// Requested record does not exist in the caller's tenant.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind label.
        kind: &'static str,
        /// Requested identifier.
        id: String,
    },
    /// A non-terminal intent with the same dedupe hash already exists.
    #[error("duplicate in-flight intent: {existing}")]
    DuplicateIntent {
        /// Identifier of the existing intent.
        existing: IntentId,
    },
    /// A non-terminal escalation already exists for the intent.
    #[error("active escalation already exists: {existing}")]
    ActiveEscalationExists {
        /// Identifier of the existing escalation.
        existing: EscalationId,
    },
    /// Compare-and-set precondition failed.
    #[error("status conflict: expected {expected}, found {actual}")]
    StatusConflict {
        /// Expected status label.
        expected: String,
        /// Status found in the store.
        actual: String,
    },
    /// Version uniqueness violated.
    #[error("version conflict: {0}")]
    VersionConflict(String),
    /// A mutation targeted an append-only table.
    #[error("append-only violation: {0}")]
    AppendOnly(String),
    /// Stored data failed integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Payload exceeded configured size limits.
    #[error("store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// Invalid argument or stored data.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Backend-specific failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<HashError> for StoreError {
    fn from(err: HashError) -> Self {
        Self::Hashing(err.to_string())
    }
}

// ============================================================================
// SECTION: Pagination
// ============================================================================

/// Keyset cursor over `(created_at desc, id desc)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// `created_at` of the last record on the previous page.
    pub created_at: Timestamp,
    /// Identifier of the last record on the previous page.
    pub id: String,
}

/// Page request with an optional cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Resume-after cursor.
    pub cursor: Option<Cursor>,
    /// Maximum records requested; stores clamp to the page cap.
    pub limit: Option<u32>,
}

/// Maximum page size served by any list operation.
pub const MAX_PAGE_SIZE: u32 = 100;

impl PageRequest {
    /// Returns the effective limit clamped to [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results plus the continuation cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Page items in `(created_at desc, id desc)` order.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` at the end.
    pub next: Option<Cursor>,
}

// ============================================================================
// SECTION: Intent Store
// ============================================================================

/// Filter for intent listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFilter {
    /// Status filter.
    pub status: Option<IntentStatus>,
    /// Submitting entity filter.
    pub entity_id: Option<EntityId>,
    /// Intent type filter.
    pub intent_type: Option<String>,
    /// Include soft-deleted intents; off by default.
    pub include_deleted: bool,
}

/// Field updates applied with a status compare-and-set.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentChange {
    /// New status.
    pub status: Option<IntentStatus>,
    /// New update time.
    pub updated_at: Option<Timestamp>,
    /// Evaluation start time.
    pub evaluated_at: Option<Timestamp>,
    /// Decision time.
    pub decided_at: Option<Timestamp>,
    /// Completion time.
    pub completed_at: Option<Timestamp>,
    /// Trust snapshot captured at intake.
    pub trust_snapshot: Option<Value>,
    /// Trust level extracted from the snapshot.
    pub trust_level: Option<i64>,
    /// Trust score extracted from the snapshot.
    pub trust_score: Option<f64>,
    /// Deciding policy version.
    pub policy_version: Option<i64>,
    /// Cancellation reason.
    pub cancellation_reason: Option<String>,
}

/// Receipt returned by writes that seal chain links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Updated intent row.
    pub intent: Intent,
    /// Sealed ledger event.
    pub event: IntentEvent,
    /// Sealed audit record.
    pub audit: AuditRecord,
}

/// Persistent intent storage.
///
/// Methods that accept a [`PendingIntentEvent`] and [`PendingAuditRecord`]
/// must seal and commit them in the same transaction as the domain write; an
/// audit append failure aborts the whole operation.
pub trait IntentStore: Send + Sync {
    /// Inserts a new pending intent with its sequence-1 ledger event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateIntent`] when a non-terminal intent with
    /// the same `(tenant, dedupe_hash)` exists, and [`StoreError`] for other
    /// failures.
    fn submit_intent(
        &self,
        intent: &Intent,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<WriteReceipt, StoreError>;

    /// Loads an intent by identifier within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_intent(&self, tenant: &TenantId, id: &IntentId) -> Result<Option<Intent>, StoreError>;

    /// Finds a non-terminal intent by dedupe hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_active_dedupe(
        &self,
        tenant: &TenantId,
        dedupe_hash: &HashDigest,
    ) -> Result<Option<Intent>, StoreError>;

    /// Finds an intent by client-supplied idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_by_idempotency_key(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<Intent>, StoreError>;

    /// Lists intents with keyset pagination on `(created_at desc, id desc)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_intents(
        &self,
        tenant: &TenantId,
        filter: &IntentFilter,
        page: &PageRequest,
    ) -> Result<Page<Intent>, StoreError>;

    /// Applies a compare-and-set transition with its ledger event and audit
    /// record in one transaction.
    ///
    /// The store enforces only the compare-and-set; lifecycle-graph legality
    /// is the service's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StatusConflict`] when the stored status differs
    /// from `expected`, and [`StoreError`] for other failures.
    fn transition_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        expected: IntentStatus,
        change: IntentChange,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<WriteReceipt, StoreError>;

    /// Soft-deletes an intent: sets `deleted_at`, replaces context and
    /// metadata with their redacted forms, appends the redaction event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the intent is missing or the write fails.
    fn redact_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        deleted_at: Timestamp,
        redacted_context: Value,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<WriteReceipt, StoreError>;

    /// Loads the full ledger for an intent in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_events(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Vec<IntentEvent>, StoreError>;

    /// Appends an evaluation trace row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append_evaluation(&self, record: &EvaluationRecord) -> Result<(), StoreError>;

    /// Loads evaluation trace rows for an intent in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_evaluations(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Vec<EvaluationRecord>, StoreError>;

    /// Hard-removes soft-deleted intents whose `deleted_at` is before the
    /// cutoff. Ledger events and audit records are retained.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the purge fails.
    fn purge_soft_deleted(&self, before: Timestamp) -> Result<u64, StoreError>;

    /// Summarizes an entity's recent activity since the cutoff for the
    /// evaluation context's `history` section.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn history_summary(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
        since: Timestamp,
    ) -> Result<HistorySummary, StoreError>;
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Persistent policy storage.
pub trait PolicyStore: Send + Sync {
    /// Inserts a new policy version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when the
    /// `(tenant, namespace, name, version)` tuple exists, and [`StoreError`]
    /// for other failures.
    fn create_policy(
        &self,
        policy: &Policy,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError>;

    /// Replaces a draft policy's definition in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the policy is missing or the write fails.
    fn update_policy(
        &self,
        policy: &Policy,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError>;

    /// Loads a policy by identifier within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_policy(&self, tenant: &TenantId, id: &PolicyId) -> Result<Option<Policy>, StoreError>;

    /// Lists policies, optionally filtered by namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_policies(
        &self,
        tenant: &TenantId,
        namespace: Option<&NamespaceId>,
    ) -> Result<Vec<Policy>, StoreError>;

    /// Returns the highest existing version for `(tenant, namespace, name)`,
    /// or 0 when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn latest_policy_version(
        &self,
        tenant: &TenantId,
        namespace: &NamespaceId,
        name: &str,
    ) -> Result<i64, StoreError>;

    /// Publishes a draft, atomically deprecating any previously published
    /// version of the same `(tenant, namespace, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StatusConflict`] when the policy is not a draft,
    /// and [`StoreError`] for other failures.
    fn publish_policy(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        updated_at: Timestamp,
        audit: PendingAuditRecord,
    ) -> Result<Policy, StoreError>;

    /// Moves a policy to a non-published lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StatusConflict`] when the stored status is not
    /// in `expected`, and [`StoreError`] for other failures.
    fn set_policy_status(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        expected: &[PolicyStatus],
        status: PolicyStatus,
        updated_at: Timestamp,
        audit: PendingAuditRecord,
    ) -> Result<Policy, StoreError>;

    /// Deletes a draft policy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the policy is missing, not a draft, or
    /// the delete fails.
    fn delete_policy(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError>;

    /// Loads published policies for `(tenant, namespace)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn published_policies(
        &self,
        tenant: &TenantId,
        namespace: &NamespaceId,
    ) -> Result<Vec<Policy>, StoreError>;
}

// ============================================================================
// SECTION: Escalation Store
// ============================================================================

/// Field updates applied with an escalation compare-and-set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationChange {
    /// New status.
    pub status: Option<EscalationStatus>,
    /// New update time.
    pub updated_at: Option<Timestamp>,
    /// Acknowledgement time.
    pub acknowledged_at: Option<Timestamp>,
    /// Resolver principal.
    pub resolved_by: Option<PrincipalId>,
    /// Resolution time.
    pub resolved_at: Option<Timestamp>,
    /// Resolver notes.
    pub resolution_notes: Option<String>,
    /// Whether resolution happened after the SLA deadline.
    pub sla_breached: Option<bool>,
}

/// Filter for escalation listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationFilter {
    /// Status filter.
    pub status: Option<EscalationStatus>,
    /// Addressee filter.
    pub escalated_to: Option<String>,
}

/// Intent compare-and-set bundled into an escalation write so both rows,
/// the ledger event, and the audit record commit together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentTransition {
    /// Expected current intent status.
    pub expected: IntentStatus,
    /// Field updates applied with the transition.
    pub change: IntentChange,
    /// Ledger event sealed with the transition.
    pub event: PendingIntentEvent,
}

/// Receipt returned by escalation writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationReceipt {
    /// Updated escalation row.
    pub escalation: Escalation,
    /// Updated intent row when an intent transition was bundled.
    pub intent: Option<Intent>,
    /// Sealed audit record.
    pub audit: AuditRecord,
}

/// Persistent escalation storage.
pub trait EscalationStore: Send + Sync {
    /// Inserts a pending escalation, atomically applying the bundled intent
    /// transition (normally `evaluating -> escalated`) with its ledger event
    /// and audit record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActiveEscalationExists`] when the intent already
    /// carries a non-terminal escalation, [`StoreError::StatusConflict`] when
    /// the intent compare-and-set fails, and [`StoreError`] otherwise.
    fn insert_escalation(
        &self,
        escalation: &Escalation,
        intent_transition: IntentTransition,
        audit: PendingAuditRecord,
    ) -> Result<EscalationReceipt, StoreError>;

    /// Loads an escalation by identifier within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_escalation(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
    ) -> Result<Option<Escalation>, StoreError>;

    /// Returns the single non-terminal escalation for an intent, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_escalation_for_intent(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Option<Escalation>, StoreError>;

    /// Lists escalations with keyset pagination.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_escalations(
        &self,
        tenant: &TenantId,
        filter: &EscalationFilter,
        page: &PageRequest,
    ) -> Result<Page<Escalation>, StoreError>;

    /// Applies a compare-and-set escalation transition in one transaction,
    /// optionally appending a status-neutral ledger event (acknowledge,
    /// timeout) and/or a bundled intent transition (approve, reject,
    /// auto-deny), plus the audit record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StatusConflict`] when the stored status is not
    /// in `expected` (or the bundled intent compare-and-set fails), and
    /// [`StoreError`] for other failures.
    fn transition_escalation(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        expected: &[EscalationStatus],
        change: EscalationChange,
        ledger_event: Option<PendingIntentEvent>,
        intent_transition: Option<IntentTransition>,
        audit: PendingAuditRecord,
    ) -> Result<EscalationReceipt, StoreError>;

    /// Returns escalations due for timeout at `now`, across tenants.
    ///
    /// Scheduler-only: this is the one deliberately cross-tenant read, used
    /// by the system actor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn due_escalations(&self, now: Timestamp, limit: u32) -> Result<Vec<Escalation>, StoreError>;
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Persistent, append-only audit storage.
///
/// Implementations must reject updates and deletes at the storage layer and
/// serialize sequence reservation per tenant.
pub trait AuditStore: Send + Sync {
    /// Appends one audit record, reserving the next per-tenant sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append_audit(&self, record: PendingAuditRecord) -> Result<AuditRecord, StoreError>;

    /// Appends a batch atomically in input order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any append fails; no record commits.
    fn append_audit_batch(
        &self,
        records: Vec<PendingAuditRecord>,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Loads a record by identifier within the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audit_by_id(
        &self,
        tenant: &TenantId,
        id: &crate::core::AuditId,
    ) -> Result<Option<AuditRecord>, StoreError>;

    /// Queries records with the tenant-scoped filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn query_audit(
        &self,
        tenant: &TenantId,
        query: &AuditQuery,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Loads records for one target, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audit_for_target(
        &self,
        tenant: &TenantId,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Loads records correlated by trace identifier, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audit_by_trace(
        &self,
        tenant: &TenantId,
        trace_id: &TraceId,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Aggregates statistics over `[from, until)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audit_stats(
        &self,
        tenant: &TenantId,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<AuditStats, StoreError>;

    /// Loads a chain slice in ascending sequence order starting at
    /// `start_sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audit_chain(
        &self,
        tenant: &TenantId,
        start_sequence: u64,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Returns the last reserved sequence for the tenant, 0 when empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn last_audit_sequence(&self, tenant: &TenantId) -> Result<u64, StoreError>;

    /// Returns the most recent chain checkpoint for the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn latest_checkpoint(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<ChainCheckpoint>, StoreError>;

    /// Records a chain checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn record_checkpoint(&self, checkpoint: &ChainCheckpoint) -> Result<(), StoreError>;

    /// Returns every tenant with at least one audit record.
    ///
    /// Scheduler-only: drives checkpointing across tenants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audited_tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}

// ============================================================================
// SECTION: Revocation Store
// ============================================================================

/// Persistent token-revocation storage.
pub trait RevocationStore: Send + Sync {
    /// Revokes a token identifier until its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn revoke_jti(&self, jti: &str, expires_at: Timestamp) -> Result<(), StoreError>;

    /// Returns true when the token identifier is revoked and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn is_jti_revoked(&self, jti: &str, now: Timestamp) -> Result<bool, StoreError>;

    /// Sets the revoke-all-before cutoff for a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn set_revoke_before(&self, user: &PrincipalId, cutoff: Timestamp) -> Result<(), StoreError>;

    /// Returns the revoke-all-before cutoff for a user, if set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn revoke_before(&self, user: &PrincipalId) -> Result<Option<Timestamp>, StoreError>;

    /// Garbage-collects revocation entries whose expiry passed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the purge fails.
    fn purge_expired_revocations(&self, now: Timestamp) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Combined Store
// ============================================================================

/// Convenience supertrait for backends implementing every store surface.
pub trait GovernanceStore:
    IntentStore + PolicyStore + EscalationStore + AuditStore + RevocationStore
{
}

impl<T> GovernanceStore for T where
    T: IntentStore + PolicyStore + EscalationStore + AuditStore + RevocationStore
{
}

// ============================================================================
// SECTION: Fast Store
// ============================================================================

/// Fast-store errors.
#[derive(Debug, Error)]
pub enum FastStoreError {
    /// Backend-specific failure.
    #[error("fast store error: {0}")]
    Store(String),
}

/// Rate-limit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// True when the request is within the window budget.
    pub allowed: bool,
    /// Seconds the caller should wait before retrying, when rejected.
    pub retry_after_secs: u64,
}

/// Low-latency shared state: dedupe locks, counters, markers, leases, and
/// rate windows. Production deployments back this with a networked store;
/// tests use the in-memory implementation.
///
/// All methods take `now` explicitly so TTL arithmetic stays deterministic.
pub trait FastStore: Send + Sync {
    /// Atomically sets a lock key if absent, with a TTL.
    ///
    /// Returns true when the lock was acquired.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn try_lock(&self, key: &str, ttl_ms: i64, now: Timestamp) -> Result<bool, FastStoreError>;

    /// Releases a lock key.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn unlock(&self, key: &str) -> Result<(), FastStoreError>;

    /// Increments a counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn increment(&self, key: &str) -> Result<i64, FastStoreError>;

    /// Decrements a counter (floored at zero) and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn decrement(&self, key: &str) -> Result<i64, FastStoreError>;

    /// Reads a counter, 0 when absent.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn counter(&self, key: &str) -> Result<i64, FastStoreError>;

    /// Sets a marker key with a TTL (cooperative cancellation).
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn set_marker(&self, key: &str, ttl_ms: i64, now: Timestamp) -> Result<(), FastStoreError>;

    /// Returns true when a marker key is set and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn marker_set(&self, key: &str, now: Timestamp) -> Result<bool, FastStoreError>;

    /// Acquires a leadership lease when free or already held by `holder`.
    ///
    /// Returns true when `holder` owns the lease after the call.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl_ms: i64,
        now: Timestamp,
    ) -> Result<bool, FastStoreError>;

    /// Releases a lease held by `holder`.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn release_lease(&self, key: &str, holder: &str) -> Result<(), FastStoreError>;

    /// Checks a fixed-window rate limit and consumes one unit when allowed.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the backend fails.
    fn rate_check(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now: Timestamp,
    ) -> Result<RateDecision, FastStoreError>;
}

// ============================================================================
// SECTION: Job Queue
// ============================================================================

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue backend is unavailable; submissions must fail fast.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
    /// Unknown dead-letter job.
    #[error("dead-letter job not found: {0}")]
    DeadLetterNotFound(String),
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStage {
    /// Trust snapshot capture.
    Intake,
    /// Policy evaluation.
    Evaluate,
    /// Executor hand-off.
    Decision,
}

impl QueueStage {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Evaluate => "evaluate",
            Self::Decision => "decision",
        }
    }
}

/// Unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// Intent under processing.
    pub intent_id: IntentId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Routing namespace.
    pub namespace: NamespaceId,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

/// Queue depth snapshot for readiness and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepths {
    /// Intake backlog.
    pub intake: u64,
    /// Evaluate backlog.
    pub evaluate: u64,
    /// Decision backlog.
    pub decision: u64,
    /// Dead-letter backlog.
    pub dead_letter: u64,
}

/// Job that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterJob {
    /// The failed job.
    pub job: Job,
    /// Stage it failed on.
    pub stage: QueueStage,
    /// Last error message.
    pub error: String,
    /// Time the job was dead-lettered.
    pub failed_at: Timestamp,
}

/// Pipeline job queue.
pub trait JobQueue: Send + Sync {
    /// Enqueues a job on a stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] when the queue cannot accept work.
    fn enqueue(&self, stage: QueueStage, job: Job) -> Result<(), QueueError>;

    /// Enqueues a job after a delay (retry backoff, over-cap deferral).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] when the queue cannot accept work.
    fn enqueue_delayed(
        &self,
        stage: QueueStage,
        job: Job,
        delay_ms: u64,
    ) -> Result<(), QueueError>;

    /// Returns current queue depths.
    fn depths(&self) -> QueueDepths;

    /// Lists dead-lettered jobs.
    fn dead_letters(&self) -> Vec<DeadLetterJob>;

    /// Re-enqueues a dead-lettered job on its original stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DeadLetterNotFound`] for unknown jobs.
    fn retry_dead_letter(&self, job_id: &JobId) -> Result<(), QueueError>;
}

// ============================================================================
// SECTION: Trust Provider
// ============================================================================

/// Trust provider errors.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Provider call failed or timed out.
    #[error("trust provider error: {0}")]
    Provider(String),
}

/// External trust-score service.
#[async_trait]
pub trait TrustProvider: Send + Sync {
    /// Captures a trust snapshot for the entity.
    ///
    /// Callers bound this with a timeout and degrade on failure; providers
    /// should not implement their own unbounded waits.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when the provider is unreachable or rejects
    /// the request.
    async fn snapshot(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
    ) -> Result<TrustSnapshot, TrustError>;
}

// ============================================================================
// SECTION: Notification Sink
// ============================================================================

/// Notification sink errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery hand-off failed.
    #[error("notification delivery error: {0}")]
    Delivery(String),
}

/// Hand-off point to the external notification fan-out.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers a structured record to the fan-out layer.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the hand-off fails; callers treat
    /// delivery as fire-and-forget and never fail decisions on it.
    async fn deliver(&self, record: &DeliveryRecord) -> Result<(), NotifyError>;
}
