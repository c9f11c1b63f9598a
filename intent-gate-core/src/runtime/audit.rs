// intent-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Intent Gate Audit Logger
// Description: Chain-aware audit writes, queries, verification, and
//              checkpointing.
// Purpose: Provide the single audit write-side and the incremental
//          chain-integrity verifier consumed by the verify endpoint and the
//          scheduler.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Most audit records co-commit with a domain write inside the store; this
//! logger covers the standalone writes (auth events, admin operations) and
//! every read path. Verification recomputes each link's canonical hash and
//! tenant signature; checkpoints let the scheduler verify incrementally
//! instead of rescanning history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::AuditChainVerification;
use crate::core::AuditId;
use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::AuditStats;
use crate::core::ChainCheckpoint;
use crate::core::Clock;
use crate::core::GENESIS_PREVIOUS_HASH;
use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::PendingAuditRecord;
use crate::core::SigningKeys;
use crate::core::TenantId;
use crate::core::TraceId;
use crate::core::audit::audit_chain_hash;
use crate::core::hashing::verify_signature;
use crate::interfaces::AuditStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Chain slice size used during verification scans.
const VERIFY_BATCH: u32 = 500;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit logger errors.
#[derive(Debug, Error)]
pub enum AuditLogError {
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Canonicalization or signing failure during verification.
    #[error(transparent)]
    Hashing(#[from] HashError),
}

// ============================================================================
// SECTION: Audit Logger
// ============================================================================

/// Audit write-side and verifier.
pub struct AuditLogger<S, C> {
    /// Storage backend.
    store: Arc<S>,
    /// Tenant signing keys used for signature verification.
    keys: SigningKeys,
    /// Clock seam.
    clock: C,
}

impl<S, C> AuditLogger<S, C>
where
    S: AuditStore,
    C: Clock,
{
    /// Creates an audit logger.
    pub const fn new(store: Arc<S>, keys: SigningKeys, clock: C) -> Self {
        Self { store, keys, clock }
    }

    /// Appends one standalone audit record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when the append fails; callers must
    /// treat this as fatal for the enclosing operation.
    pub fn log(&self, record: PendingAuditRecord) -> Result<AuditRecord, AuditLogError> {
        Ok(self.store.append_audit(record)?)
    }

    /// Appends a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when any append fails.
    pub fn log_batch(
        &self,
        records: Vec<PendingAuditRecord>,
    ) -> Result<Vec<AuditRecord>, AuditLogError> {
        Ok(self.store.append_audit_batch(records)?)
    }

    /// Loads a record by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when loading fails.
    pub fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &AuditId,
    ) -> Result<Option<AuditRecord>, AuditLogError> {
        Ok(self.store.audit_by_id(tenant, id)?)
    }

    /// Queries records with the tenant-scoped filter.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when loading fails.
    pub fn query(
        &self,
        tenant: &TenantId,
        query: &AuditQuery,
    ) -> Result<Vec<AuditRecord>, AuditLogError> {
        Ok(self.store.query_audit(tenant, query)?)
    }

    /// Loads records for one target.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when loading fails.
    pub fn get_for_target(
        &self,
        tenant: &TenantId,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, AuditLogError> {
        Ok(self.store.audit_for_target(tenant, target_type, target_id)?)
    }

    /// Loads records correlated by trace identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when loading fails.
    pub fn get_by_trace(
        &self,
        tenant: &TenantId,
        trace_id: &TraceId,
    ) -> Result<Vec<AuditRecord>, AuditLogError> {
        Ok(self.store.audit_by_trace(tenant, trace_id)?)
    }

    /// Aggregates statistics over a time range.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError::Store`] when loading fails.
    pub fn get_stats(
        &self,
        tenant: &TenantId,
        from: crate::core::Timestamp,
        until: crate::core::Timestamp,
    ) -> Result<AuditStats, AuditLogError> {
        Ok(self.store.audit_stats(tenant, from, until)?)
    }

    /// Verifies the tenant's chain from `start_sequence` (default 1) for at
    /// most `limit` links (default: to the chain head).
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError`] only for load or canonicalization failures;
    /// tampered links are reported through the returned verification.
    pub fn verify_chain_integrity(
        &self,
        tenant: &TenantId,
        start_sequence: Option<u64>,
        limit: Option<u64>,
    ) -> Result<AuditChainVerification, AuditLogError> {
        let start = start_sequence.unwrap_or(1).max(1);
        let budget = limit.unwrap_or(u64::MAX);
        let mut previous = if start == 1 {
            HashDigest::from_hex(GENESIS_PREVIOUS_HASH)
        } else {
            match self.store.audit_chain(tenant, start - 1, 1)?.into_iter().next() {
                Some(prior) if prior.sequence_number == start - 1 => prior.record_hash,
                _ => {
                    return Ok(AuditChainVerification {
                        valid: false,
                        first_invalid_sequence: Some(start),
                        total_verified: 0,
                    });
                }
            }
        };

        let mut verified = 0_u64;
        let mut cursor = start;
        while verified < budget {
            let batch = self.store.audit_chain(tenant, cursor, VERIFY_BATCH)?;
            if batch.is_empty() {
                break;
            }
            for record in batch {
                if verified >= budget {
                    break;
                }
                if let Some(bad) = self.verify_link(&record, cursor, &previous)? {
                    return Ok(AuditChainVerification {
                        valid: false,
                        first_invalid_sequence: Some(bad),
                        total_verified: verified,
                    });
                }
                previous = record.record_hash.clone();
                cursor += 1;
                verified += 1;
            }
        }
        Ok(AuditChainVerification {
            valid: true,
            first_invalid_sequence: None,
            total_verified: verified,
        })
    }

    /// Scheduler task: verifies each tenant's chain forward from its latest
    /// checkpoint and records a new checkpoint at the verified head.
    ///
    /// Returns the tenants whose verification failed; those are alarmed, not
    /// silently recovered.
    ///
    /// # Errors
    ///
    /// Returns [`AuditLogError`] when a load or write fails.
    pub fn checkpoint_all(&self) -> Result<Vec<TenantId>, AuditLogError> {
        let now = self.clock.now();
        let mut invalid = Vec::new();
        for tenant in self.store.audited_tenants()? {
            let resume = self
                .store
                .latest_checkpoint(&tenant)?
                .map_or(1, |checkpoint| checkpoint.up_to_sequence + 1);
            let head = self.store.last_audit_sequence(&tenant)?;
            if head < resume {
                continue;
            }
            let report = self.verify_chain_integrity(&tenant, Some(resume), None)?;
            if !report.valid {
                invalid.push(tenant);
                continue;
            }
            if let Some(last) = self.store.audit_chain(&tenant, head, 1)?.into_iter().next() {
                self.store.record_checkpoint(&ChainCheckpoint {
                    tenant_id: tenant,
                    up_to_sequence: head,
                    root_hash: last.record_hash,
                    created_at: now,
                })?;
            }
        }
        Ok(invalid)
    }

    /// Verifies one link: density, linkage, canonical hash, and signature.
    /// Returns the failing sequence, or `None` when the link is sound.
    fn verify_link(
        &self,
        record: &AuditRecord,
        expected_sequence: u64,
        previous: &HashDigest,
    ) -> Result<Option<u64>, AuditLogError> {
        if record.sequence_number != expected_sequence {
            return Ok(Some(expected_sequence));
        }
        if record.previous_hash != *previous {
            return Ok(Some(record.sequence_number));
        }
        let pending = PendingAuditRecord {
            id: record.id.clone(),
            tenant_id: record.tenant_id.clone(),
            event_type: record.event_type.clone(),
            event_category: record.event_category,
            severity: record.severity,
            actor: record.actor.clone(),
            target: record.target.clone(),
            action: record.action.clone(),
            outcome: record.outcome,
            before: record.before.clone(),
            after: record.after.clone(),
            trace_id: record.trace_id.clone(),
            span_id: record.span_id.clone(),
            created_at: record.created_at,
        };
        let recomputed =
            audit_chain_hash(&pending, record.sequence_number, &record.previous_hash)?;
        if recomputed != record.record_hash {
            return Ok(Some(record.sequence_number));
        }
        let key = self.keys.key_for(record.tenant_id.as_str());
        if !verify_signature(key, &record.record_hash, &record.signature)? {
            return Ok(Some(record.sequence_number));
        }
        Ok(None)
    }
}
