// intent-gate-core/src/core/audit.rs
// ============================================================================
// Module: Intent Gate Audit Model
// Description: Hash-chained, per-tenant audit records and checkpoints.
// Purpose: Capture every state-changing operation in an append-only,
//          tamper-evident chain consumed by trust and analytics engines.
// Dependencies: crate::core::{hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Audit records form one hash chain per tenant: sequence numbers are dense
//! and monotonic, each record commits to its predecessor's hash, and each link
//! is HMAC-signed with the tenant's signing key. Records are never updated or
//! deleted; redaction writes a superseding record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::ChainSignature;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::hashing::sign_digest;
use crate::core::identifiers::AuditId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Audit event category.
///
/// # Invariants
/// - Variants are stable for serialization and querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// Intent lifecycle operations.
    Intent,
    /// Policy authoring and lifecycle operations.
    Policy,
    /// Escalation transitions.
    Escalation,
    /// Authentication and token operations.
    Auth,
    /// Administrative operations.
    Admin,
    /// Scheduler and background maintenance.
    System,
}

impl AuditCategory {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Policy => "policy",
            Self::Escalation => "escalation",
            Self::Auth => "auth",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

/// Audit severity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine operation.
    Info,
    /// Unusual but handled condition.
    Warning,
    /// Operation failure.
    Error,
    /// Integrity or security impact.
    Critical,
}

impl AuditSeverity {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Operation outcome recorded with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation committed.
    Success,
    /// Operation rejected or failed.
    Failure,
    /// Operation partially applied (batch paths).
    Partial,
}

impl AuditOutcome {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }
}

// ============================================================================
// SECTION: Actor and Target
// ============================================================================

/// Actor that performed the audited operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    /// Actor kind: `user`, `service`, `agent`, or `system`.
    pub actor_type: String,
    /// Actor identifier.
    pub actor_id: String,
    /// Source IP when the transport supplied one.
    pub ip: Option<String>,
    /// User agent when the transport supplied one.
    pub user_agent: Option<String>,
}

impl AuditActor {
    /// Builds the system actor used by scheduler and worker writes.
    #[must_use]
    pub fn system() -> Self {
        Self {
            actor_type: "system".to_string(),
            actor_id: "intent-gate".to_string(),
            ip: None,
            user_agent: None,
        }
    }
}

/// Resource the audited operation acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    /// Target kind: `intent`, `policy`, `escalation`, `token`, `tenant`.
    pub target_type: String,
    /// Target identifier.
    pub target_id: String,
}

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// Audit event awaiting sequence assignment inside a store transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAuditRecord {
    /// Record identifier.
    pub id: AuditId,
    /// Tenant scope; the chain key.
    pub tenant_id: TenantId,
    /// Dotted event type, e.g. `intent.submitted`.
    pub event_type: String,
    /// Event category.
    pub event_category: AuditCategory,
    /// Severity.
    pub severity: AuditSeverity,
    /// Acting principal or system.
    pub actor: AuditActor,
    /// Acted-on resource.
    pub target: AuditTarget,
    /// Verb performed, e.g. `submit`, `publish`, `revoke`.
    pub action: String,
    /// Outcome.
    pub outcome: AuditOutcome,
    /// State before the change.
    pub before: Option<Value>,
    /// State after the change.
    pub after: Option<Value>,
    /// Trace identifier propagated from the transport.
    pub trace_id: Option<TraceId>,
    /// Span identifier propagated from the transport.
    pub span_id: Option<String>,
    /// Event time.
    pub created_at: Timestamp,
}

impl PendingAuditRecord {
    /// Seals the record into a chain link at the given sequence, signing the
    /// link with the tenant's key.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization or signing fails.
    pub fn seal(
        self,
        sequence_number: u64,
        previous_hash: HashDigest,
        signing_key: &[u8],
    ) -> Result<AuditRecord, HashError> {
        let record_hash = audit_chain_hash(&self, sequence_number, &previous_hash)?;
        let signature = sign_digest(signing_key, &record_hash)?;
        Ok(AuditRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            event_type: self.event_type,
            event_category: self.event_category,
            severity: self.severity,
            actor: self.actor,
            target: self.target,
            action: self.action,
            outcome: self.outcome,
            before: self.before,
            after: self.after,
            trace_id: self.trace_id,
            span_id: self.span_id,
            sequence_number,
            previous_hash,
            record_hash,
            signature,
            created_at: self.created_at,
        })
    }
}

/// Sealed audit chain link.
///
/// # Invariants
/// - `sequence_number` is dense and monotonic per tenant.
/// - Updates and deletes are forbidden at the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record identifier.
    pub id: AuditId,
    /// Tenant scope; the chain key.
    pub tenant_id: TenantId,
    /// Dotted event type.
    pub event_type: String,
    /// Event category.
    pub event_category: AuditCategory,
    /// Severity.
    pub severity: AuditSeverity,
    /// Acting principal or system.
    pub actor: AuditActor,
    /// Acted-on resource.
    pub target: AuditTarget,
    /// Verb performed.
    pub action: String,
    /// Outcome.
    pub outcome: AuditOutcome,
    /// State before the change.
    pub before: Option<Value>,
    /// State after the change.
    pub after: Option<Value>,
    /// Trace identifier.
    pub trace_id: Option<TraceId>,
    /// Span identifier.
    pub span_id: Option<String>,
    /// Dense per-tenant sequence starting at 1.
    pub sequence_number: u64,
    /// Hash of the preceding link; empty at sequence 1.
    pub previous_hash: HashDigest,
    /// Canonical hash over this link.
    pub record_hash: HashDigest,
    /// Tenant-keyed HMAC signature over `record_hash`.
    pub signature: ChainSignature,
    /// Event time.
    pub created_at: Timestamp,
}

/// Canonical basis hashed into each audit chain link.
#[derive(Debug, Serialize)]
struct AuditChainBasis<'a> {
    /// Tenant scope.
    tenant_id: &'a str,
    /// Link sequence number.
    sequence: u64,
    /// Dotted event type.
    event_type: &'a str,
    /// Event category label.
    event_category: &'static str,
    /// Severity label.
    severity: &'static str,
    /// Acting principal or system.
    actor: &'a AuditActor,
    /// Acted-on resource.
    target: &'a AuditTarget,
    /// Verb performed.
    action: &'a str,
    /// Outcome label.
    outcome: &'static str,
    /// State before the change.
    before: &'a Option<Value>,
    /// State after the change.
    after: &'a Option<Value>,
    /// Hash of the preceding link.
    previous_hash: &'a str,
}

/// Computes the chain hash for an audit link.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn audit_chain_hash(
    record: &PendingAuditRecord,
    sequence: u64,
    previous_hash: &HashDigest,
) -> Result<HashDigest, HashError> {
    hash_canonical_json(&AuditChainBasis {
        tenant_id: record.tenant_id.as_str(),
        sequence,
        event_type: &record.event_type,
        event_category: record.event_category.as_str(),
        severity: record.severity.as_str(),
        actor: &record.actor,
        target: &record.target,
        action: &record.action,
        outcome: record.outcome.as_str(),
        before: &record.before,
        after: &record.after,
        previous_hash: previous_hash.as_str(),
    })
}

// ============================================================================
// SECTION: Checkpoints
// ============================================================================

/// Verified chain prefix recorded by the scheduler.
///
/// Checkpoints let verification resume from `up_to_sequence` instead of
/// rescanning history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Last sequence number covered by this checkpoint.
    pub up_to_sequence: u64,
    /// `record_hash` at `up_to_sequence`.
    pub root_hash: HashDigest,
    /// Checkpoint creation time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Tenant-scoped audit query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Event category filter.
    pub event_category: Option<AuditCategory>,
    /// Dotted event type filter.
    pub event_type: Option<String>,
    /// Minimum severity filter.
    pub min_severity: Option<AuditSeverity>,
    /// Outcome filter.
    pub outcome: Option<AuditOutcome>,
    /// Actor identifier filter.
    pub actor_id: Option<String>,
    /// Inclusive lower bound on event time.
    pub from: Option<Timestamp>,
    /// Exclusive upper bound on event time.
    pub until: Option<Timestamp>,
    /// Maximum records returned; stores clamp to their page cap.
    pub limit: Option<u32>,
    /// Keyset cursor: return records with sequence strictly below this.
    pub before_sequence: Option<u64>,
}

/// Aggregated audit statistics over a time range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Total records in range.
    pub total: u64,
    /// Records per category label.
    pub by_category: std::collections::BTreeMap<String, u64>,
    /// Records per severity label.
    pub by_severity: std::collections::BTreeMap<String, u64>,
    /// Records per outcome label.
    pub by_outcome: std::collections::BTreeMap<String, u64>,
}

/// Outcome of verifying a tenant's audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditChainVerification {
    /// True when every inspected link verified.
    pub valid: bool,
    /// First sequence number that failed verification.
    pub first_invalid_sequence: Option<u64>,
    /// Number of links inspected.
    pub total_verified: u64,
}
