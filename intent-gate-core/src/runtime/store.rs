// intent-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Intent Gate In-Memory Store
// Description: In-memory implementation of every storage trait.
// Purpose: Back tests and single-process development without a database
//          while preserving transactional semantics per call.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! One mutex guards the whole state, so each trait call is atomic exactly
//! like a database transaction: either every row, ledger event, and audit
//! record of a call lands, or none do. Chain sealing uses the same core
//! helpers as the durable store, so hash chains built here verify
//! identically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::AuditStats;
use crate::core::ChainCheckpoint;
use crate::core::Escalation;
use crate::core::EscalationId;
use crate::core::EscalationStatus;
use crate::core::EvaluationRecord;
use crate::core::GENESIS_PREVIOUS_HASH;
use crate::core::HashDigest;
use crate::core::HistorySummary;
use crate::core::Intent;
use crate::core::IntentEvent;
use crate::core::IntentId;
use crate::core::IntentStatus;
use crate::core::PendingAuditRecord;
use crate::core::PendingIntentEvent;
use crate::core::Policy;
use crate::core::PolicyId;
use crate::core::PolicyStatus;
use crate::core::SigningKeys;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::identifiers::AuditId;
use crate::core::identifiers::EntityId;
use crate::interfaces::AuditStore;
use crate::interfaces::Cursor;
use crate::interfaces::EscalationChange;
use crate::interfaces::EscalationFilter;
use crate::interfaces::EscalationReceipt;
use crate::interfaces::EscalationStore;
use crate::interfaces::FastStore;
use crate::interfaces::FastStoreError;
use crate::interfaces::IntentChange;
use crate::interfaces::IntentFilter;
use crate::interfaces::IntentStore;
use crate::interfaces::IntentTransition;
use crate::interfaces::Page;
use crate::interfaces::PageRequest;
use crate::interfaces::PolicyStore;
use crate::interfaces::RateDecision;
use crate::interfaces::RevocationStore;
use crate::interfaces::StoreError;
use crate::interfaces::WriteReceipt;

// ============================================================================
// SECTION: State
// ============================================================================

/// Mutable store state behind the mutex.
#[derive(Default)]
struct State {
    /// Intent rows by id.
    intents: BTreeMap<IntentId, Intent>,
    /// Ledger events by intent, in sequence order.
    events: BTreeMap<IntentId, Vec<IntentEvent>>,
    /// Evaluation rows by intent, in insertion order.
    evaluations: BTreeMap<IntentId, Vec<EvaluationRecord>>,
    /// Policy rows by id.
    policies: BTreeMap<PolicyId, Policy>,
    /// Escalation rows by id.
    escalations: BTreeMap<EscalationId, Escalation>,
    /// Audit chains by tenant, in sequence order.
    audit: BTreeMap<TenantId, Vec<AuditRecord>>,
    /// Chain checkpoints by tenant, newest last.
    checkpoints: BTreeMap<TenantId, Vec<ChainCheckpoint>>,
    /// Revoked token identifiers with expiry.
    revoked_jtis: BTreeMap<String, Timestamp>,
    /// Per-user revoke-all cutoffs.
    revoke_before: BTreeMap<String, Timestamp>,
}

/// In-memory implementation of every storage trait.
pub struct InMemoryGovernanceStore {
    /// Guarded state; one lock per call keeps calls transactional.
    state: Mutex<State>,
    /// Tenant signing keys for audit chain sealing.
    keys: SigningKeys,
}

impl InMemoryGovernanceStore {
    /// Creates an empty store sealing chains with the given keys.
    #[must_use]
    pub fn new(keys: SigningKeys) -> Self {
        Self {
            state: Mutex::new(State::default()),
            keys,
        }
    }

    /// Locks the state, mapping poison onto a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("state mutex poisoned".to_string()))
    }

    /// Test hook: overwrites one ledger event to simulate tampering.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the event is absent.
    pub fn tamper_event_hash(
        &self,
        intent_id: &IntentId,
        sequence: u64,
        event_hash: HashDigest,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let events = state.events.get_mut(intent_id).ok_or(StoreError::NotFound {
            kind: "intent_event",
            id: intent_id.to_string(),
        })?;
        let event = events
            .iter_mut()
            .find(|event| event.sequence_number == sequence)
            .ok_or(StoreError::NotFound {
                kind: "intent_event",
                id: format!("{intent_id}#{sequence}"),
            })?;
        event.event_hash = event_hash;
        Ok(())
    }

    /// Test hook: overwrites one audit record hash to simulate tampering.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent.
    pub fn tamper_audit_hash(
        &self,
        tenant: &TenantId,
        sequence: u64,
        record_hash: HashDigest,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let chain = state.audit.get_mut(tenant).ok_or(StoreError::NotFound {
            kind: "audit_chain",
            id: tenant.to_string(),
        })?;
        let record = chain
            .iter_mut()
            .find(|record| record.sequence_number == sequence)
            .ok_or(StoreError::NotFound {
                kind: "audit_record",
                id: format!("{tenant}#{sequence}"),
            })?;
        record.record_hash = record_hash;
        Ok(())
    }
}

// ============================================================================
// SECTION: Sealing Helpers
// ============================================================================

/// Seals a ledger event at the intent's next sequence.
fn seal_event(state: &State, event: PendingIntentEvent) -> Result<IntentEvent, StoreError> {
    let chain = state.events.get(&event.intent_id);
    let (sequence, previous) = chain.and_then(|events| events.last()).map_or_else(
        || (1, HashDigest::from_hex(GENESIS_PREVIOUS_HASH)),
        |last| (last.sequence_number + 1, last.event_hash.clone()),
    );
    Ok(event.seal(sequence, previous)?)
}

/// Seals an audit record at the tenant's next sequence.
fn seal_audit(
    state: &State,
    keys: &SigningKeys,
    record: PendingAuditRecord,
) -> Result<AuditRecord, StoreError> {
    let chain = state.audit.get(&record.tenant_id);
    let (sequence, previous) = chain.and_then(|records| records.last()).map_or_else(
        || (1, HashDigest::from_hex(GENESIS_PREVIOUS_HASH)),
        |last| (last.sequence_number + 1, last.record_hash.clone()),
    );
    let key = keys.key_for(record.tenant_id.as_str());
    Ok(record.seal(sequence, previous, key)?)
}

/// Applies an intent change set onto a row.
fn apply_change(intent: &mut Intent, change: &IntentChange) {
    if let Some(status) = change.status {
        intent.status = status;
    }
    if let Some(updated_at) = change.updated_at {
        intent.updated_at = updated_at;
    }
    if let Some(evaluated_at) = change.evaluated_at {
        intent.evaluated_at = Some(evaluated_at);
    }
    if let Some(decided_at) = change.decided_at {
        intent.decided_at = Some(decided_at);
    }
    if let Some(completed_at) = change.completed_at {
        intent.completed_at = Some(completed_at);
    }
    if let Some(snapshot) = &change.trust_snapshot {
        intent.trust_snapshot = Some(snapshot.clone());
    }
    if let Some(level) = change.trust_level {
        intent.trust_level = Some(level);
    }
    if let Some(score) = change.trust_score {
        intent.trust_score = Some(score);
    }
    if let Some(version) = change.policy_version {
        intent.policy_version = Some(version);
    }
    if let Some(reason) = &change.cancellation_reason {
        intent.cancellation_reason = Some(reason.clone());
    }
}

/// Applies an escalation change set onto a row.
fn apply_escalation_change(escalation: &mut Escalation, change: &EscalationChange) {
    if let Some(status) = change.status {
        escalation.status = status;
    }
    if let Some(updated_at) = change.updated_at {
        escalation.updated_at = updated_at;
    }
    if let Some(acknowledged_at) = change.acknowledged_at {
        escalation.acknowledged_at = Some(acknowledged_at);
    }
    if let Some(resolved_by) = &change.resolved_by {
        escalation.resolved_by = Some(resolved_by.clone());
    }
    if let Some(resolved_at) = change.resolved_at {
        escalation.resolved_at = Some(resolved_at);
    }
    if let Some(notes) = &change.resolution_notes {
        escalation.resolution_notes = Some(notes.clone());
    }
    if let Some(breached) = change.sla_breached {
        escalation.sla_breached = breached;
    }
}

/// Applies a bundled intent transition inside an escalation write.
fn apply_intent_transition(
    state: &mut State,
    tenant: &TenantId,
    transition: IntentTransition,
) -> Result<Intent, StoreError> {
    let intent_id = transition.event.intent_id.clone();
    {
        let intent = state.intents.get(&intent_id).filter(|row| row.tenant_id == *tenant).ok_or(
            StoreError::NotFound {
                kind: "intent",
                id: intent_id.to_string(),
            },
        )?;
        if intent.status != transition.expected {
            return Err(StoreError::StatusConflict {
                expected: transition.expected.as_str().to_string(),
                actual: intent.status.as_str().to_string(),
            });
        }
    }
    let sealed = seal_event(state, transition.event)?;
    if let Some(intent) = state.intents.get_mut(&intent_id) {
        apply_change(intent, &transition.change);
    }
    state.events.entry(intent_id.clone()).or_default().push(sealed);
    state
        .intents
        .get(&intent_id)
        .cloned()
        .ok_or(StoreError::NotFound {
            kind: "intent",
            id: intent_id.to_string(),
        })
}

// ============================================================================
// SECTION: Intent Store
// ============================================================================

impl IntentStore for InMemoryGovernanceStore {
    fn submit_intent(
        &self,
        intent: &Intent,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<WriteReceipt, StoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.intents.values().find(|row| {
            row.tenant_id == intent.tenant_id
                && row.dedupe_hash == intent.dedupe_hash
                && !row.status.is_terminal()
        }) {
            return Err(StoreError::DuplicateIntent {
                existing: existing.id.clone(),
            });
        }
        let sealed_event = seal_event(&state, event)?;
        let sealed_audit = seal_audit(&state, &self.keys, audit)?;
        state.intents.insert(intent.id.clone(), intent.clone());
        state.events.entry(intent.id.clone()).or_default().push(sealed_event.clone());
        state.audit.entry(intent.tenant_id.clone()).or_default().push(sealed_audit.clone());
        Ok(WriteReceipt {
            intent: intent.clone(),
            event: sealed_event,
            audit: sealed_audit,
        })
    }

    fn get_intent(&self, tenant: &TenantId, id: &IntentId) -> Result<Option<Intent>, StoreError> {
        let state = self.lock()?;
        Ok(state.intents.get(id).filter(|row| row.tenant_id == *tenant).cloned())
    }

    fn find_active_dedupe(
        &self,
        tenant: &TenantId,
        dedupe_hash: &HashDigest,
    ) -> Result<Option<Intent>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .intents
            .values()
            .find(|row| {
                row.tenant_id == *tenant
                    && row.dedupe_hash == *dedupe_hash
                    && !row.status.is_terminal()
            })
            .cloned())
    }

    fn find_by_idempotency_key(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<Intent>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .intents
            .values()
            .find(|row| {
                row.tenant_id == *tenant && row.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    fn list_intents(
        &self,
        tenant: &TenantId,
        filter: &IntentFilter,
        page: &PageRequest,
    ) -> Result<Page<Intent>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<Intent> = state
            .intents
            .values()
            .filter(|row| row.tenant_id == *tenant)
            .filter(|row| filter.include_deleted || row.deleted_at.is_none())
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .filter(|row| {
                filter.entity_id.as_ref().is_none_or(|entity| row.entity_id == *entity)
            })
            .filter(|row| {
                filter
                    .intent_type
                    .as_deref()
                    .is_none_or(|tag| row.intent_type.as_deref() == Some(tag))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
        });
        if let Some(cursor) = &page.cursor {
            rows.retain(|row| {
                row.created_at < cursor.created_at
                    || (row.created_at == cursor.created_at && row.id.as_str() < cursor.id.as_str())
            });
        }
        let limit = page.effective_limit() as usize;
        let next = (rows.len() > limit).then(|| {
            let last = &rows[limit - 1];
            Cursor {
                created_at: last.created_at,
                id: last.id.to_string(),
            }
        });
        rows.truncate(limit);
        Ok(Page { items: rows, next })
    }

    fn transition_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        expected: IntentStatus,
        change: IntentChange,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<WriteReceipt, StoreError> {
        let mut state = self.lock()?;
        {
            let intent =
                state.intents.get(id).filter(|row| row.tenant_id == *tenant).ok_or(
                    StoreError::NotFound {
                        kind: "intent",
                        id: id.to_string(),
                    },
                )?;
            if intent.status != expected {
                return Err(StoreError::StatusConflict {
                    expected: expected.as_str().to_string(),
                    actual: intent.status.as_str().to_string(),
                });
            }
        }
        let sealed_event = seal_event(&state, event)?;
        let sealed_audit = seal_audit(&state, &self.keys, audit)?;
        if let Some(intent) = state.intents.get_mut(id) {
            apply_change(intent, &change);
        }
        state.events.entry(id.clone()).or_default().push(sealed_event.clone());
        state.audit.entry(tenant.clone()).or_default().push(sealed_audit.clone());
        let intent = state.intents.get(id).cloned().ok_or(StoreError::NotFound {
            kind: "intent",
            id: id.to_string(),
        })?;
        Ok(WriteReceipt {
            intent,
            event: sealed_event,
            audit: sealed_audit,
        })
    }

    fn redact_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        deleted_at: Timestamp,
        redacted_context: Value,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<WriteReceipt, StoreError> {
        let mut state = self.lock()?;
        if !state.intents.get(id).is_some_and(|row| row.tenant_id == *tenant) {
            return Err(StoreError::NotFound {
                kind: "intent",
                id: id.to_string(),
            });
        }
        let sealed_event = seal_event(&state, event)?;
        let sealed_audit = seal_audit(&state, &self.keys, audit)?;
        if let Some(intent) = state.intents.get_mut(id) {
            intent.context = redacted_context;
            intent.metadata.clear();
            intent.deleted_at = Some(deleted_at);
            intent.updated_at = deleted_at;
        }
        state.events.entry(id.clone()).or_default().push(sealed_event.clone());
        state.audit.entry(tenant.clone()).or_default().push(sealed_audit.clone());
        let intent = state.intents.get(id).cloned().ok_or(StoreError::NotFound {
            kind: "intent",
            id: id.to_string(),
        })?;
        Ok(WriteReceipt {
            intent,
            event: sealed_event,
            audit: sealed_audit,
        })
    }

    fn list_events(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Vec<IntentEvent>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .events
            .get(intent_id)
            .map(|events| {
                events.iter().filter(|event| event.tenant_id == *tenant).cloned().collect()
            })
            .unwrap_or_default())
    }

    fn append_evaluation(&self, record: &EvaluationRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.evaluations.entry(record.intent_id.clone()).or_default().push(record.clone());
        Ok(())
    }

    fn list_evaluations(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Vec<EvaluationRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .evaluations
            .get(intent_id)
            .map(|rows| rows.iter().filter(|row| row.tenant_id == *tenant).cloned().collect())
            .unwrap_or_default())
    }

    fn purge_soft_deleted(&self, before: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let doomed: Vec<IntentId> = state
            .intents
            .values()
            .filter(|row| row.deleted_at.is_some_and(|deleted| deleted < before))
            .map(|row| row.id.clone())
            .collect();
        for id in &doomed {
            state.intents.remove(id);
            state.evaluations.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    fn history_summary(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
        since: Timestamp,
    ) -> Result<HistorySummary, StoreError> {
        let state = self.lock()?;
        let mut summary = HistorySummary::default();
        for intent in state.intents.values() {
            if intent.tenant_id != *tenant || intent.entity_id != *entity {
                continue;
            }
            summary.last_intent_at = Some(
                summary.last_intent_at.map_or(intent.created_at, |last| last.max(intent.created_at)),
            );
            if intent.created_at < since {
                continue;
            }
            summary.recent_intents += 1;
            if intent.status == IntentStatus::Denied {
                summary.recent_denials += 1;
            }
            if intent.status == IntentStatus::Escalated {
                summary.recent_escalations += 1;
            }
        }
        Ok(summary)
    }
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

impl PolicyStore for InMemoryGovernanceStore {
    fn create_policy(
        &self,
        policy: &Policy,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError> {
        let mut state = self.lock()?;
        if state.policies.values().any(|row| {
            row.tenant_id == policy.tenant_id
                && row.namespace == policy.namespace
                && row.name == policy.name
                && row.version == policy.version
        }) {
            return Err(StoreError::VersionConflict(format!(
                "{}/{}/{} v{}",
                policy.tenant_id, policy.namespace, policy.name, policy.version
            )));
        }
        let sealed = seal_audit(&state, &self.keys, audit)?;
        state.policies.insert(policy.id.clone(), policy.clone());
        state.audit.entry(policy.tenant_id.clone()).or_default().push(sealed.clone());
        Ok(sealed)
    }

    fn update_policy(
        &self,
        policy: &Policy,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError> {
        let mut state = self.lock()?;
        if !state
            .policies
            .get(&policy.id)
            .is_some_and(|row| row.tenant_id == policy.tenant_id)
        {
            return Err(StoreError::NotFound {
                kind: "policy",
                id: policy.id.to_string(),
            });
        }
        let sealed = seal_audit(&state, &self.keys, audit)?;
        state.policies.insert(policy.id.clone(), policy.clone());
        state.audit.entry(policy.tenant_id.clone()).or_default().push(sealed.clone());
        Ok(sealed)
    }

    fn get_policy(&self, tenant: &TenantId, id: &PolicyId) -> Result<Option<Policy>, StoreError> {
        let state = self.lock()?;
        Ok(state.policies.get(id).filter(|row| row.tenant_id == *tenant).cloned())
    }

    fn list_policies(
        &self,
        tenant: &TenantId,
        namespace: Option<&crate::core::NamespaceId>,
    ) -> Result<Vec<Policy>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<Policy> = state
            .policies
            .values()
            .filter(|row| row.tenant_id == *tenant)
            .filter(|row| namespace.is_none_or(|wanted| row.namespace == *wanted))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.namespace
                .cmp(&b.namespace)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| b.version.cmp(&a.version))
        });
        Ok(rows)
    }

    fn latest_policy_version(
        &self,
        tenant: &TenantId,
        namespace: &crate::core::NamespaceId,
        name: &str,
    ) -> Result<i64, StoreError> {
        let state = self.lock()?;
        Ok(state
            .policies
            .values()
            .filter(|row| {
                row.tenant_id == *tenant && row.namespace == *namespace && row.name == name
            })
            .map(|row| row.version)
            .max()
            .unwrap_or(0))
    }

    fn publish_policy(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        updated_at: Timestamp,
        audit: PendingAuditRecord,
    ) -> Result<Policy, StoreError> {
        let mut state = self.lock()?;
        let (namespace, name) = {
            let policy =
                state.policies.get(id).filter(|row| row.tenant_id == *tenant).ok_or(
                    StoreError::NotFound {
                        kind: "policy",
                        id: id.to_string(),
                    },
                )?;
            if policy.status != PolicyStatus::Draft {
                return Err(StoreError::StatusConflict {
                    expected: PolicyStatus::Draft.as_str().to_string(),
                    actual: policy.status.as_str().to_string(),
                });
            }
            (policy.namespace.clone(), policy.name.clone())
        };
        let sealed = seal_audit(&state, &self.keys, audit)?;
        for row in state.policies.values_mut() {
            if row.tenant_id == *tenant
                && row.namespace == namespace
                && row.name == name
                && row.status == PolicyStatus::Published
            {
                row.status = PolicyStatus::Deprecated;
                row.updated_at = updated_at;
            }
        }
        let published = state.policies.get_mut(id).ok_or(StoreError::NotFound {
            kind: "policy",
            id: id.to_string(),
        })?;
        published.status = PolicyStatus::Published;
        published.updated_at = updated_at;
        let result = published.clone();
        state.audit.entry(tenant.clone()).or_default().push(sealed);
        Ok(result)
    }

    fn set_policy_status(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        expected: &[PolicyStatus],
        status: PolicyStatus,
        updated_at: Timestamp,
        audit: PendingAuditRecord,
    ) -> Result<Policy, StoreError> {
        let mut state = self.lock()?;
        {
            let policy =
                state.policies.get(id).filter(|row| row.tenant_id == *tenant).ok_or(
                    StoreError::NotFound {
                        kind: "policy",
                        id: id.to_string(),
                    },
                )?;
            if !expected.contains(&policy.status) {
                return Err(StoreError::StatusConflict {
                    expected: expected
                        .iter()
                        .map(|status| status.as_str())
                        .collect::<Vec<_>>()
                        .join("|"),
                    actual: policy.status.as_str().to_string(),
                });
            }
        }
        let sealed = seal_audit(&state, &self.keys, audit)?;
        let policy = state.policies.get_mut(id).ok_or(StoreError::NotFound {
            kind: "policy",
            id: id.to_string(),
        })?;
        policy.status = status;
        policy.updated_at = updated_at;
        let result = policy.clone();
        state.audit.entry(tenant.clone()).or_default().push(sealed);
        Ok(result)
    }

    fn delete_policy(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError> {
        let mut state = self.lock()?;
        let Some(policy) = state.policies.get(id).filter(|row| row.tenant_id == *tenant) else {
            return Err(StoreError::NotFound {
                kind: "policy",
                id: id.to_string(),
            });
        };
        if policy.status != PolicyStatus::Draft {
            return Err(StoreError::StatusConflict {
                expected: PolicyStatus::Draft.as_str().to_string(),
                actual: policy.status.as_str().to_string(),
            });
        }
        let sealed = seal_audit(&state, &self.keys, audit)?;
        state.policies.remove(id);
        state.audit.entry(tenant.clone()).or_default().push(sealed.clone());
        Ok(sealed)
    }

    fn published_policies(
        &self,
        tenant: &TenantId,
        namespace: &crate::core::NamespaceId,
    ) -> Result<Vec<Policy>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .policies
            .values()
            .filter(|row| {
                row.tenant_id == *tenant
                    && row.namespace == *namespace
                    && row.status == PolicyStatus::Published
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Escalation Store
// ============================================================================

impl EscalationStore for InMemoryGovernanceStore {
    fn insert_escalation(
        &self,
        escalation: &Escalation,
        intent_transition: IntentTransition,
        audit: PendingAuditRecord,
    ) -> Result<EscalationReceipt, StoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.escalations.values().find(|row| {
            row.intent_id == escalation.intent_id && !row.status.is_terminal()
        }) {
            return Err(StoreError::ActiveEscalationExists {
                existing: existing.id.clone(),
            });
        }
        let sealed_audit = seal_audit(&state, &self.keys, audit)?;
        let intent = apply_intent_transition(&mut state, &escalation.tenant_id, intent_transition)?;
        state.escalations.insert(escalation.id.clone(), escalation.clone());
        state
            .audit
            .entry(escalation.tenant_id.clone())
            .or_default()
            .push(sealed_audit.clone());
        Ok(EscalationReceipt {
            escalation: escalation.clone(),
            intent: Some(intent),
            audit: sealed_audit,
        })
    }

    fn get_escalation(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
    ) -> Result<Option<Escalation>, StoreError> {
        let state = self.lock()?;
        Ok(state.escalations.get(id).filter(|row| row.tenant_id == *tenant).cloned())
    }

    fn active_escalation_for_intent(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Option<Escalation>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .escalations
            .values()
            .find(|row| {
                row.tenant_id == *tenant
                    && row.intent_id == *intent_id
                    && !row.status.is_terminal()
            })
            .cloned())
    }

    fn list_escalations(
        &self,
        tenant: &TenantId,
        filter: &EscalationFilter,
        page: &PageRequest,
    ) -> Result<Page<Escalation>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<Escalation> = state
            .escalations
            .values()
            .filter(|row| row.tenant_id == *tenant)
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .filter(|row| {
                filter
                    .escalated_to
                    .as_deref()
                    .is_none_or(|target| row.escalated_to == target)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
        });
        if let Some(cursor) = &page.cursor {
            rows.retain(|row| {
                row.created_at < cursor.created_at
                    || (row.created_at == cursor.created_at && row.id.as_str() < cursor.id.as_str())
            });
        }
        let limit = page.effective_limit() as usize;
        let next = (rows.len() > limit).then(|| {
            let last = &rows[limit - 1];
            Cursor {
                created_at: last.created_at,
                id: last.id.to_string(),
            }
        });
        rows.truncate(limit);
        Ok(Page { items: rows, next })
    }

    fn transition_escalation(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        expected: &[EscalationStatus],
        change: EscalationChange,
        ledger_event: Option<PendingIntentEvent>,
        intent_transition: Option<IntentTransition>,
        audit: PendingAuditRecord,
    ) -> Result<EscalationReceipt, StoreError> {
        let mut state = self.lock()?;
        {
            let escalation =
                state.escalations.get(id).filter(|row| row.tenant_id == *tenant).ok_or(
                    StoreError::NotFound {
                        kind: "escalation",
                        id: id.to_string(),
                    },
                )?;
            if !expected.contains(&escalation.status) {
                return Err(StoreError::StatusConflict {
                    expected: expected
                        .iter()
                        .map(|status| status.as_str())
                        .collect::<Vec<_>>()
                        .join("|"),
                    actual: escalation.status.as_str().to_string(),
                });
            }
        }
        let sealed_audit = seal_audit(&state, &self.keys, audit)?;
        if let Some(event) = ledger_event {
            let sealed = seal_event(&state, event)?;
            state.events.entry(sealed.intent_id.clone()).or_default().push(sealed);
        }
        let intent = match intent_transition {
            Some(transition) => Some(apply_intent_transition(&mut state, tenant, transition)?),
            None => None,
        };
        let escalation = state.escalations.get_mut(id).ok_or(StoreError::NotFound {
            kind: "escalation",
            id: id.to_string(),
        })?;
        apply_escalation_change(escalation, &change);
        let result = escalation.clone();
        state.audit.entry(tenant.clone()).or_default().push(sealed_audit.clone());
        Ok(EscalationReceipt {
            escalation: result,
            intent,
            audit: sealed_audit,
        })
    }

    fn due_escalations(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Escalation>, StoreError> {
        let state = self.lock()?;
        let mut due: Vec<Escalation> =
            state.escalations.values().filter(|row| row.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.timeout_at.cmp(&b.timeout_at));
        due.truncate(limit as usize);
        Ok(due)
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

impl AuditStore for InMemoryGovernanceStore {
    fn append_audit(&self, record: PendingAuditRecord) -> Result<AuditRecord, StoreError> {
        let mut state = self.lock()?;
        let sealed = seal_audit(&state, &self.keys, record)?;
        state.audit.entry(sealed.tenant_id.clone()).or_default().push(sealed.clone());
        Ok(sealed)
    }

    fn append_audit_batch(
        &self,
        records: Vec<PendingAuditRecord>,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let mut state = self.lock()?;
        let mut sealed_batch = Vec::with_capacity(records.len());
        for record in records {
            let sealed = seal_audit(&state, &self.keys, record)?;
            state.audit.entry(sealed.tenant_id.clone()).or_default().push(sealed.clone());
            sealed_batch.push(sealed);
        }
        Ok(sealed_batch)
    }

    fn audit_by_id(
        &self,
        tenant: &TenantId,
        id: &AuditId,
    ) -> Result<Option<AuditRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .audit
            .get(tenant)
            .and_then(|chain| chain.iter().find(|record| record.id == *id))
            .cloned())
    }

    fn query_audit(
        &self,
        tenant: &TenantId,
        query: &AuditQuery,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.lock()?;
        let Some(chain) = state.audit.get(tenant) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<AuditRecord> = chain
            .iter()
            .filter(|record| {
                query.event_category.is_none_or(|category| record.event_category == category)
            })
            .filter(|record| {
                query.event_type.as_deref().is_none_or(|wanted| record.event_type == wanted)
            })
            .filter(|record| {
                query.min_severity.is_none_or(|floor| record.severity >= floor)
            })
            .filter(|record| query.outcome.is_none_or(|outcome| record.outcome == outcome))
            .filter(|record| {
                query.actor_id.as_deref().is_none_or(|actor| record.actor.actor_id == actor)
            })
            .filter(|record| query.from.is_none_or(|from| record.created_at >= from))
            .filter(|record| query.until.is_none_or(|until| record.created_at < until))
            .filter(|record| {
                query
                    .before_sequence
                    .is_none_or(|before| record.sequence_number < before)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.sequence_number.cmp(&a.sequence_number));
        let limit = query.limit.unwrap_or(crate::interfaces::MAX_PAGE_SIZE);
        rows.truncate(limit.min(crate::interfaces::MAX_PAGE_SIZE) as usize);
        Ok(rows)
    }

    fn audit_for_target(
        &self,
        tenant: &TenantId,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<AuditRecord> = state
            .audit
            .get(tenant)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|record| {
                        record.target.target_type == target_type
                            && record.target.target_id == target_id
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.sequence_number.cmp(&a.sequence_number));
        Ok(rows)
    }

    fn audit_by_trace(
        &self,
        tenant: &TenantId,
        trace_id: &TraceId,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .audit
            .get(tenant)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|record| record.trace_id.as_ref() == Some(trace_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn audit_stats(
        &self,
        tenant: &TenantId,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<AuditStats, StoreError> {
        let state = self.lock()?;
        let mut stats = AuditStats::default();
        if let Some(chain) = state.audit.get(tenant) {
            for record in chain {
                if record.created_at < from || record.created_at >= until {
                    continue;
                }
                stats.total += 1;
                *stats
                    .by_category
                    .entry(record.event_category.as_str().to_string())
                    .or_default() += 1;
                *stats.by_severity.entry(record.severity.as_str().to_string()).or_default() += 1;
                *stats.by_outcome.entry(record.outcome.as_str().to_string()).or_default() += 1;
            }
        }
        Ok(stats)
    }

    fn audit_chain(
        &self,
        tenant: &TenantId,
        start_sequence: u64,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .audit
            .get(tenant)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|record| record.sequence_number >= start_sequence)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn last_audit_sequence(&self, tenant: &TenantId) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state
            .audit
            .get(tenant)
            .and_then(|chain| chain.last())
            .map_or(0, |record| record.sequence_number))
    }

    fn latest_checkpoint(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<ChainCheckpoint>, StoreError> {
        let state = self.lock()?;
        Ok(state.checkpoints.get(tenant).and_then(|list| list.last()).cloned())
    }

    fn record_checkpoint(&self, checkpoint: &ChainCheckpoint) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state
            .checkpoints
            .entry(checkpoint.tenant_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    fn audited_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let state = self.lock()?;
        Ok(state.audit.keys().cloned().collect())
    }
}

// ============================================================================
// SECTION: In-Memory Fast Store
// ============================================================================

/// TTL'd fast-store entry.
#[derive(Debug, Clone, Copy)]
struct TtlEntry {
    /// Expiry time.
    expires_at: Timestamp,
}

/// Lease entry.
#[derive(Debug, Clone)]
struct LeaseEntry {
    /// Current holder.
    holder: String,
    /// Expiry time.
    expires_at: Timestamp,
}

/// Rate window entry.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    /// Window start.
    window_start: Timestamp,
    /// Requests consumed in the window.
    used: u32,
}

/// Mutable fast-store state.
#[derive(Default)]
struct FastState {
    /// Set-if-absent locks.
    locks: BTreeMap<String, TtlEntry>,
    /// Counters.
    counters: BTreeMap<String, i64>,
    /// TTL'd markers.
    markers: BTreeMap<String, TtlEntry>,
    /// Leadership leases.
    leases: BTreeMap<String, LeaseEntry>,
    /// Fixed rate windows.
    rates: BTreeMap<String, RateWindow>,
}

/// In-memory implementation of the fast-store seam.
///
/// Production deployments back the seam with a networked store; semantics
/// here match what the runtime depends on (atomic set-if-absent, TTL expiry
/// driven by the caller-supplied `now`).
#[derive(Default)]
pub struct InMemoryFastStore {
    /// Guarded state.
    state: Mutex<FastState>,
}

impl InMemoryFastStore {
    /// Creates an empty fast store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poison onto a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FastState>, FastStoreError> {
        self.state
            .lock()
            .map_err(|_| FastStoreError::Store("fast state mutex poisoned".to_string()))
    }
}

impl FastStore for InMemoryFastStore {
    fn try_lock(&self, key: &str, ttl_ms: i64, now: Timestamp) -> Result<bool, FastStoreError> {
        let mut state = self.lock()?;
        if state.locks.get(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }
        state.locks.insert(
            key.to_string(),
            TtlEntry {
                expires_at: now.plus_millis(ttl_ms),
            },
        );
        Ok(true)
    }

    fn unlock(&self, key: &str) -> Result<(), FastStoreError> {
        let mut state = self.lock()?;
        state.locks.remove(key);
        Ok(())
    }

    fn increment(&self, key: &str) -> Result<i64, FastStoreError> {
        let mut state = self.lock()?;
        let value = state.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn decrement(&self, key: &str) -> Result<i64, FastStoreError> {
        let mut state = self.lock()?;
        let value = state.counters.entry(key.to_string()).or_insert(0);
        *value = (*value - 1).max(0);
        Ok(*value)
    }

    fn counter(&self, key: &str) -> Result<i64, FastStoreError> {
        let state = self.lock()?;
        Ok(state.counters.get(key).copied().unwrap_or(0))
    }

    fn set_marker(&self, key: &str, ttl_ms: i64, now: Timestamp) -> Result<(), FastStoreError> {
        let mut state = self.lock()?;
        state.markers.insert(
            key.to_string(),
            TtlEntry {
                expires_at: now.plus_millis(ttl_ms),
            },
        );
        Ok(())
    }

    fn marker_set(&self, key: &str, now: Timestamp) -> Result<bool, FastStoreError> {
        let state = self.lock()?;
        Ok(state.markers.get(key).is_some_and(|entry| entry.expires_at > now))
    }

    fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl_ms: i64,
        now: Timestamp,
    ) -> Result<bool, FastStoreError> {
        let mut state = self.lock()?;
        let owned = match state.leases.get(key) {
            Some(lease) if lease.expires_at > now => lease.holder == holder,
            _ => true,
        };
        if owned {
            state.leases.insert(
                key.to_string(),
                LeaseEntry {
                    holder: holder.to_string(),
                    expires_at: now.plus_millis(ttl_ms),
                },
            );
        }
        Ok(owned)
    }

    fn release_lease(&self, key: &str, holder: &str) -> Result<(), FastStoreError> {
        let mut state = self.lock()?;
        if state.leases.get(key).is_some_and(|lease| lease.holder == holder) {
            state.leases.remove(key);
        }
        Ok(())
    }

    fn rate_check(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now: Timestamp,
    ) -> Result<RateDecision, FastStoreError> {
        let mut state = self.lock()?;
        let window = state.rates.entry(key.to_string()).or_insert(RateWindow {
            window_start: now,
            used: 0,
        });
        if now.millis_since(window.window_start) >= window_ms {
            window.window_start = now;
            window.used = 0;
        }
        if window.used >= limit {
            let remaining_ms =
                window_ms.saturating_sub(now.millis_since(window.window_start)).max(0);
            let retry_after_secs = u64::try_from(remaining_ms.div_euclid(1_000) + 1).unwrap_or(1);
            return Ok(RateDecision {
                allowed: false,
                retry_after_secs,
            });
        }
        window.used += 1;
        Ok(RateDecision {
            allowed: true,
            retry_after_secs: 0,
        })
    }
}

// ============================================================================
// SECTION: Revocation Store
// ============================================================================

impl RevocationStore for InMemoryGovernanceStore {
    fn revoke_jti(&self, jti: &str, expires_at: Timestamp) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.revoked_jtis.insert(jti.to_string(), expires_at);
        Ok(())
    }

    fn is_jti_revoked(&self, jti: &str, now: Timestamp) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state.revoked_jtis.get(jti).is_some_and(|expires| *expires > now))
    }

    fn set_revoke_before(
        &self,
        user: &crate::core::PrincipalId,
        cutoff: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.revoke_before.insert(user.to_string(), cutoff);
        Ok(())
    }

    fn revoke_before(
        &self,
        user: &crate::core::PrincipalId,
    ) -> Result<Option<Timestamp>, StoreError> {
        let state = self.lock()?;
        Ok(state.revoke_before.get(user.as_str()).copied())
    }

    fn purge_expired_revocations(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let before = state.revoked_jtis.len();
        state.revoked_jtis.retain(|_, expires| *expires > now);
        Ok((before - state.revoked_jtis.len()) as u64)
    }
}
