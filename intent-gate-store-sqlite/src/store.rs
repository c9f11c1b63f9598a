// intent-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Governance Store
// Description: Durable implementation of every Intent Gate storage trait.
// Purpose: Persist intents, ledgers, policies, escalations, revocations,
//          and the per-tenant audit chain with transactional co-commits.
// Dependencies: intent-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One `SQLite` connection (WAL, busy timeout) behind a mutex implements the
//! whole storage surface. Every trait call that pairs a domain write with
//! ledger and audit appends runs in a single transaction; chain sealing uses
//! the core helpers so hashes are identical across backends. Ledger,
//! evaluation, and audit tables carry `BEFORE UPDATE`/`BEFORE DELETE`
//! triggers, so append-only holds at the storage layer, not just the API.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use intent_gate_core::AuditQuery;
use intent_gate_core::AuditRecord;
use intent_gate_core::AuditStats;
use intent_gate_core::AuditStore;
use intent_gate_core::ChainCheckpoint;
use intent_gate_core::ChainSignature;
use intent_gate_core::Cursor;
use intent_gate_core::Escalation;
use intent_gate_core::EscalationChange;
use intent_gate_core::EscalationFilter;
use intent_gate_core::EscalationReceipt;
use intent_gate_core::EscalationStore;
use intent_gate_core::EvaluationRecord;
use intent_gate_core::GENESIS_PREVIOUS_HASH;
use intent_gate_core::HashDigest;
use intent_gate_core::HistorySummary;
use intent_gate_core::Intent;
use intent_gate_core::IntentChange;
use intent_gate_core::IntentEvent;
use intent_gate_core::IntentFilter;
use intent_gate_core::IntentStore;
use intent_gate_core::IntentTransition;
use intent_gate_core::Page;
use intent_gate_core::PageRequest;
use intent_gate_core::PendingAuditRecord;
use intent_gate_core::PendingIntentEvent;
use intent_gate_core::Policy;
use intent_gate_core::PolicyStatus;
use intent_gate_core::PolicyStore;
use intent_gate_core::RevocationStore;
use intent_gate_core::SigningKeys;
use intent_gate_core::StoreError;
use intent_gate_core::Timestamp;
use intent_gate_core::core::identifiers::AuditId;
use intent_gate_core::core::identifiers::EntityId;
use intent_gate_core::core::identifiers::EscalationId;
use intent_gate_core::core::identifiers::IntentId;
use intent_gate_core::core::identifiers::NamespaceId;
use intent_gate_core::core::identifiers::PolicyId;
use intent_gate_core::core::identifiers::PrincipalId;
use intent_gate_core::core::identifiers::TenantId;
use intent_gate_core::core::identifiers::TraceId;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::ToSql;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum serialized payload accepted for any single JSON column.
pub const MAX_JSON_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` governance store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a config with default tuning for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed decoding or integrity checks.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge { max_bytes, actual_bytes } => Self::TooLarge {
                max_bytes,
                actual_bytes,
            },
        }
    }
}

/// Maps a rusqlite error into the shared store error.
fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Store(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed governance store with WAL support.
#[derive(Clone)]
pub struct SqliteGovernanceStore {
    /// Shared `SQLite` connection guarded by a mutex; the mutex also
    /// serializes per-tenant audit sequence reservation.
    connection: Arc<Mutex<Connection>>,
    /// Tenant signing keys for audit chain sealing.
    keys: SigningKeys,
}

impl SqliteGovernanceStore {
    /// Opens an `SQLite`-backed governance store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig, keys: SigningKeys) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open(&config.path)?;
        connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        connection.pragma_update(None, "journal_mode", "wal")?;
        connection.pragma_update(None, "synchronous", "full")?;
        connection.pragma_update(None, "foreign_keys", "on")?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            keys,
        })
    }

    /// Opens an in-memory store (tests and ephemeral tooling).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory(keys: SigningKeys) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory()?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            keys,
        })
    }

    /// Locks the connection, mapping poison onto a store error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Store("connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates tables, indexes, and append-only triggers.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             version INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS intents (
             id TEXT PRIMARY KEY,
             tenant_id TEXT NOT NULL,
             entity_id TEXT NOT NULL,
             goal TEXT NOT NULL,
             intent_type TEXT,
             priority INTEGER NOT NULL,
             context_json TEXT NOT NULL,
             metadata_json TEXT NOT NULL,
             status TEXT NOT NULL,
             trust_snapshot_json TEXT,
             trust_level INTEGER,
             trust_score REAL,
             policy_version INTEGER,
             dedupe_hash TEXT NOT NULL,
             idempotency_key TEXT,
             cancellation_reason TEXT,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL,
             evaluated_at INTEGER,
             decided_at INTEGER,
             completed_at INTEGER,
             deleted_at INTEGER
         );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_intents_dedupe_active
             ON intents (tenant_id, dedupe_hash)
             WHERE status NOT IN ('denied', 'completed', 'failed', 'cancelled');
         CREATE INDEX IF NOT EXISTS idx_intents_list
             ON intents (tenant_id, created_at DESC, id DESC);
         CREATE INDEX IF NOT EXISTS idx_intents_idempotency
             ON intents (tenant_id, idempotency_key);
         CREATE TABLE IF NOT EXISTS intent_events (
             id TEXT PRIMARY KEY,
             intent_id TEXT NOT NULL,
             tenant_id TEXT NOT NULL,
             event_type TEXT NOT NULL,
             payload_json TEXT NOT NULL,
             sequence_number INTEGER NOT NULL,
             previous_hash TEXT NOT NULL,
             event_hash TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             UNIQUE (intent_id, sequence_number)
         );
         CREATE TRIGGER IF NOT EXISTS intent_events_no_update
             BEFORE UPDATE ON intent_events
             BEGIN SELECT RAISE(ABORT, 'intent events are append-only'); END;
         CREATE TRIGGER IF NOT EXISTS intent_events_no_delete
             BEFORE DELETE ON intent_events
             BEGIN SELECT RAISE(ABORT, 'intent events are append-only'); END;
         CREATE TABLE IF NOT EXISTS intent_evaluations (
             intent_id TEXT NOT NULL,
             tenant_id TEXT NOT NULL,
             stage TEXT NOT NULL,
             result_json TEXT NOT NULL,
             duration_ms INTEGER NOT NULL,
             policy_id TEXT,
             policy_version INTEGER,
             created_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_evaluations_intent
             ON intent_evaluations (intent_id);
         CREATE TRIGGER IF NOT EXISTS intent_evaluations_no_update
             BEFORE UPDATE ON intent_evaluations
             BEGIN SELECT RAISE(ABORT, 'evaluations are append-only'); END;
         CREATE TABLE IF NOT EXISTS policies (
             id TEXT PRIMARY KEY,
             tenant_id TEXT NOT NULL,
             name TEXT NOT NULL,
             namespace TEXT NOT NULL,
             version INTEGER NOT NULL,
             status TEXT NOT NULL,
             definition_json TEXT NOT NULL,
             checksum TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL,
             UNIQUE (tenant_id, namespace, name, version)
         );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_policies_single_published
             ON policies (tenant_id, namespace, name)
             WHERE status = 'published';
         CREATE TABLE IF NOT EXISTS escalations (
             id TEXT PRIMARY KEY,
             intent_id TEXT NOT NULL,
             tenant_id TEXT NOT NULL,
             reason TEXT NOT NULL,
             reason_category TEXT NOT NULL,
             escalated_to TEXT NOT NULL,
             status TEXT NOT NULL,
             timeout_at INTEGER NOT NULL,
             auto_deny_on_timeout INTEGER NOT NULL,
             context_json TEXT NOT NULL,
             acknowledged_at INTEGER,
             resolved_by TEXT,
             resolved_at INTEGER,
             resolution_notes TEXT,
             sla_breached INTEGER NOT NULL,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL
         );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_escalations_single_active
             ON escalations (intent_id)
             WHERE status IN ('pending', 'acknowledged');
         CREATE INDEX IF NOT EXISTS idx_escalations_due
             ON escalations (timeout_at)
             WHERE status IN ('pending', 'acknowledged');
         CREATE TABLE IF NOT EXISTS audit_records (
             id TEXT PRIMARY KEY,
             tenant_id TEXT NOT NULL,
             event_type TEXT NOT NULL,
             event_category TEXT NOT NULL,
             severity TEXT NOT NULL,
             actor_json TEXT NOT NULL,
             target_type TEXT NOT NULL,
             target_id TEXT NOT NULL,
             action TEXT NOT NULL,
             outcome TEXT NOT NULL,
             before_json TEXT,
             after_json TEXT,
             trace_id TEXT,
             span_id TEXT,
             sequence_number INTEGER NOT NULL,
             previous_hash TEXT NOT NULL,
             record_hash TEXT NOT NULL,
             signature TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             UNIQUE (tenant_id, sequence_number)
         );
         CREATE INDEX IF NOT EXISTS idx_audit_target
             ON audit_records (tenant_id, target_type, target_id);
         CREATE INDEX IF NOT EXISTS idx_audit_trace
             ON audit_records (tenant_id, trace_id);
         CREATE TRIGGER IF NOT EXISTS audit_records_no_update
             BEFORE UPDATE ON audit_records
             BEGIN SELECT RAISE(ABORT, 'audit records are append-only'); END;
         CREATE TRIGGER IF NOT EXISTS audit_records_no_delete
             BEFORE DELETE ON audit_records
             BEGIN SELECT RAISE(ABORT, 'audit records are append-only'); END;
         CREATE TABLE IF NOT EXISTS audit_checkpoints (
             tenant_id TEXT NOT NULL,
             up_to_sequence INTEGER NOT NULL,
             root_hash TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             PRIMARY KEY (tenant_id, up_to_sequence)
         );
         CREATE TABLE IF NOT EXISTS revoked_jtis (
             jti TEXT PRIMARY KEY,
             expires_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS user_revocations (
             user_id TEXT PRIMARY KEY,
             revoke_before INTEGER NOT NULL
         );",
    )?;
    let version: Option<i64> = connection
        .query_row("SELECT version FROM schema_meta WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            connection.execute(
                "INSERT INTO schema_meta (id, version) VALUES (1, ?1)",
                params![SCHEMA_VERSION],
            )?;
            Ok(())
        }
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(SqliteStoreError::VersionMismatch(format!(
            "found schema v{found}, expected v{SCHEMA_VERSION}"
        ))),
    }
}

// ============================================================================
// SECTION: Encoding Helpers
// ============================================================================

/// Serializes a value to a JSON column with the size guard.
fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    let text = serde_json::to_string(value)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;
    if text.len() > MAX_JSON_BYTES {
        return Err(StoreError::TooLarge {
            max_bytes: MAX_JSON_BYTES,
            actual_bytes: text.len(),
        });
    }
    Ok(text)
}

/// Deserializes a JSON column.
fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|err| StoreError::Corrupt(err.to_string()))
}

/// Parses an enum with a string representation from its label.
fn parse_label<T: DeserializeOwned>(label: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(label.to_string()))
        .map_err(|err| StoreError::Corrupt(format!("bad label {label}: {err}")))
}

/// Reads an optional millisecond timestamp column.
fn opt_ts(value: Option<i64>) -> Option<Timestamp> {
    value.map(Timestamp::from_unix_millis)
}

/// Maps an intents row to the core record.
fn row_to_intent(row: &Row<'_>) -> rusqlite::Result<RawIntent> {
    Ok(RawIntent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        entity_id: row.get(2)?,
        goal: row.get(3)?,
        intent_type: row.get(4)?,
        priority: row.get(5)?,
        context_json: row.get(6)?,
        metadata_json: row.get(7)?,
        status: row.get(8)?,
        trust_snapshot_json: row.get(9)?,
        trust_level: row.get(10)?,
        trust_score: row.get(11)?,
        policy_version: row.get(12)?,
        dedupe_hash: row.get(13)?,
        idempotency_key: row.get(14)?,
        cancellation_reason: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        evaluated_at: row.get(18)?,
        decided_at: row.get(19)?,
        completed_at: row.get(20)?,
        deleted_at: row.get(21)?,
    })
}

/// Column projection shared by every intent query.
const INTENT_COLUMNS: &str = "id, tenant_id, entity_id, goal, intent_type, priority, \
     context_json, metadata_json, status, trust_snapshot_json, trust_level, trust_score, \
     policy_version, dedupe_hash, idempotency_key, cancellation_reason, created_at, \
     updated_at, evaluated_at, decided_at, completed_at, deleted_at";

/// Raw intents row before JSON decoding.
struct RawIntent {
    /// Intent identifier.
    id: String,
    /// Tenant scope.
    tenant_id: String,
    /// Submitting entity.
    entity_id: String,
    /// Goal text.
    goal: String,
    /// Intent type tag.
    intent_type: Option<String>,
    /// Priority.
    priority: i64,
    /// Context JSON.
    context_json: String,
    /// Metadata JSON.
    metadata_json: String,
    /// Status label.
    status: String,
    /// Trust snapshot JSON.
    trust_snapshot_json: Option<String>,
    /// Trust level.
    trust_level: Option<i64>,
    /// Trust score.
    trust_score: Option<f64>,
    /// Deciding policy version.
    policy_version: Option<i64>,
    /// Dedupe hash hex.
    dedupe_hash: String,
    /// Idempotency key.
    idempotency_key: Option<String>,
    /// Cancellation reason.
    cancellation_reason: Option<String>,
    /// Creation time.
    created_at: i64,
    /// Update time.
    updated_at: i64,
    /// Evaluation start time.
    evaluated_at: Option<i64>,
    /// Decision time.
    decided_at: Option<i64>,
    /// Completion time.
    completed_at: Option<i64>,
    /// Soft-deletion time.
    deleted_at: Option<i64>,
}

impl RawIntent {
    /// Decodes the raw row into the core record.
    fn decode(self) -> Result<Intent, StoreError> {
        Ok(Intent {
            id: IntentId::new(self.id),
            tenant_id: TenantId::new(self.tenant_id),
            entity_id: EntityId::new(self.entity_id),
            goal: self.goal,
            intent_type: self.intent_type,
            priority: u8::try_from(self.priority)
                .map_err(|_| StoreError::Corrupt("priority out of range".to_string()))?,
            context: from_json(&self.context_json)?,
            metadata: from_json(&self.metadata_json)?,
            status: parse_label(&self.status)?,
            trust_snapshot: self
                .trust_snapshot_json
                .as_deref()
                .map(from_json)
                .transpose()?,
            trust_level: self.trust_level,
            trust_score: self.trust_score,
            policy_version: self.policy_version,
            dedupe_hash: HashDigest::from_hex(self.dedupe_hash),
            idempotency_key: self.idempotency_key,
            cancellation_reason: self.cancellation_reason,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
            evaluated_at: opt_ts(self.evaluated_at),
            decided_at: opt_ts(self.decided_at),
            completed_at: opt_ts(self.completed_at),
            deleted_at: opt_ts(self.deleted_at),
        })
    }
}

// ============================================================================
// SECTION: Chain Sealing
// ============================================================================

/// Seals a ledger event at the intent's next sequence inside a transaction.
fn seal_event_tx(
    tx: &Transaction<'_>,
    event: PendingIntentEvent,
) -> Result<IntentEvent, StoreError> {
    let head: Option<(i64, String)> = tx
        .query_row(
            "SELECT sequence_number, event_hash FROM intent_events
             WHERE intent_id = ?1 ORDER BY sequence_number DESC LIMIT 1",
            params![event.intent_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let (sequence, previous): (u64, HashDigest) = head.map_or_else(
        || (1, HashDigest::from_hex(GENESIS_PREVIOUS_HASH)),
        |(last, hash)| ((last as u64) + 1, HashDigest::from_hex(hash)),
    );
    let sealed = event.seal(sequence, previous)?;
    tx.execute(
        "INSERT INTO intent_events
             (id, intent_id, tenant_id, event_type, payload_json, sequence_number,
              previous_hash, event_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            sealed.id.as_str(),
            sealed.intent_id.as_str(),
            sealed.tenant_id.as_str(),
            sealed.event_type.as_str(),
            to_json(&sealed.payload)?,
            sealed.sequence_number as i64,
            sealed.previous_hash.as_str(),
            sealed.event_hash.as_str(),
            sealed.created_at.as_unix_millis(),
        ],
    )
    .map_err(db_err)?;
    Ok(sealed)
}

/// Seals an audit record at the tenant's next sequence inside a transaction.
///
/// The connection mutex serializes callers, so sequence reservation is
/// linearizable per tenant.
fn seal_audit_tx(
    tx: &Transaction<'_>,
    keys: &SigningKeys,
    record: PendingAuditRecord,
) -> Result<AuditRecord, StoreError> {
    let head: Option<(i64, String)> = tx
        .query_row(
            "SELECT sequence_number, record_hash FROM audit_records
             WHERE tenant_id = ?1 ORDER BY sequence_number DESC LIMIT 1",
            params![record.tenant_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let (sequence, previous): (u64, HashDigest) = head.map_or_else(
        || (1, HashDigest::from_hex(GENESIS_PREVIOUS_HASH)),
        |(last, hash)| ((last as u64) + 1, HashDigest::from_hex(hash)),
    );
    let key = keys.key_for(record.tenant_id.as_str());
    let sealed = record.seal(sequence, previous, key)?;
    tx.execute(
        "INSERT INTO audit_records
             (id, tenant_id, event_type, event_category, severity, actor_json,
              target_type, target_id, action, outcome, before_json, after_json,
              trace_id, span_id, sequence_number, previous_hash, record_hash,
              signature, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19)",
        params![
            sealed.id.as_str(),
            sealed.tenant_id.as_str(),
            sealed.event_type,
            sealed.event_category.as_str(),
            sealed.severity.as_str(),
            to_json(&sealed.actor)?,
            sealed.target.target_type,
            sealed.target.target_id,
            sealed.action,
            sealed.outcome.as_str(),
            sealed.before.as_ref().map(to_json).transpose()?,
            sealed.after.as_ref().map(to_json).transpose()?,
            sealed.trace_id.as_ref().map(|id| id.as_str().to_string()),
            sealed.span_id,
            sealed.sequence_number as i64,
            sealed.previous_hash.as_str(),
            sealed.record_hash.as_str(),
            sealed.signature.as_str(),
            sealed.created_at.as_unix_millis(),
        ],
    )
    .map_err(db_err)?;
    Ok(sealed)
}

/// Applies an intent compare-and-set inside a transaction.
fn cas_intent_tx(
    tx: &Transaction<'_>,
    tenant: &TenantId,
    id: &IntentId,
    expected: intent_gate_core::IntentStatus,
    change: &IntentChange,
) -> Result<(), StoreError> {
    let status_label: String = tx
        .query_row(
            "SELECT status FROM intents WHERE id = ?1 AND tenant_id = ?2",
            params![id.as_str(), tenant.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?
        .ok_or(StoreError::NotFound {
            kind: "intent",
            id: id.to_string(),
        })?;
    if status_label != expected.as_str() {
        return Err(StoreError::StatusConflict {
            expected: expected.as_str().to_string(),
            actual: status_label,
        });
    }
    let new_status = change.status.map(|status| status.as_str().to_string());
    let snapshot_json = change.trust_snapshot.as_ref().map(to_json).transpose()?;
    tx.execute(
        "UPDATE intents SET
             status = COALESCE(?3, status),
             updated_at = COALESCE(?4, updated_at),
             evaluated_at = COALESCE(?5, evaluated_at),
             decided_at = COALESCE(?6, decided_at),
             completed_at = COALESCE(?7, completed_at),
             trust_snapshot_json = COALESCE(?8, trust_snapshot_json),
             trust_level = COALESCE(?9, trust_level),
             trust_score = COALESCE(?10, trust_score),
             policy_version = COALESCE(?11, policy_version),
             cancellation_reason = COALESCE(?12, cancellation_reason)
         WHERE id = ?1 AND tenant_id = ?2 AND status = ?13",
        params![
            id.as_str(),
            tenant.as_str(),
            new_status,
            change.updated_at.map(Timestamp::as_unix_millis),
            change.evaluated_at.map(Timestamp::as_unix_millis),
            change.decided_at.map(Timestamp::as_unix_millis),
            change.completed_at.map(Timestamp::as_unix_millis),
            snapshot_json,
            change.trust_level,
            change.trust_score,
            change.policy_version,
            change.cancellation_reason,
            expected.as_str(),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Loads an intent inside a transaction.
fn get_intent_tx(
    tx: &Transaction<'_>,
    tenant: &TenantId,
    id: &IntentId,
) -> Result<Option<Intent>, StoreError> {
    let raw = tx
        .query_row(
            &format!("SELECT {INTENT_COLUMNS} FROM intents WHERE id = ?1 AND tenant_id = ?2"),
            params![id.as_str(), tenant.as_str()],
            row_to_intent,
        )
        .optional()
        .map_err(db_err)?;
    raw.map(RawIntent::decode).transpose()
}

/// Applies a bundled intent transition inside an escalation write.
fn apply_intent_transition_tx(
    tx: &Transaction<'_>,
    tenant: &TenantId,
    transition: IntentTransition,
) -> Result<Intent, StoreError> {
    let intent_id = transition.event.intent_id.clone();
    cas_intent_tx(tx, tenant, &intent_id, transition.expected, &transition.change)?;
    seal_event_tx(tx, transition.event)?;
    get_intent_tx(tx, tenant, &intent_id)?.ok_or(StoreError::NotFound {
        kind: "intent",
        id: intent_id.to_string(),
    })
}

// ============================================================================
// SECTION: Intent Store
// ============================================================================

impl IntentStore for SqliteGovernanceStore {
    fn submit_intent(
        &self,
        intent: &Intent,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<intent_gate_core::WriteReceipt, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM intents
                 WHERE tenant_id = ?1 AND dedupe_hash = ?2
                   AND status NOT IN ('denied', 'completed', 'failed', 'cancelled')",
                params![intent.tenant_id.as_str(), intent.dedupe_hash.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(id) = existing {
            return Err(StoreError::DuplicateIntent {
                existing: IntentId::new(id),
            });
        }
        tx.execute(
            &format!(
                "INSERT INTO intents ({INTENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"
            ),
            params![
                intent.id.as_str(),
                intent.tenant_id.as_str(),
                intent.entity_id.as_str(),
                intent.goal,
                intent.intent_type,
                i64::from(intent.priority),
                to_json(&intent.context)?,
                to_json(&intent.metadata)?,
                intent.status.as_str(),
                intent.trust_snapshot.as_ref().map(to_json).transpose()?,
                intent.trust_level,
                intent.trust_score,
                intent.policy_version,
                intent.dedupe_hash.as_str(),
                intent.idempotency_key,
                intent.cancellation_reason,
                intent.created_at.as_unix_millis(),
                intent.updated_at.as_unix_millis(),
                intent.evaluated_at.map(Timestamp::as_unix_millis),
                intent.decided_at.map(Timestamp::as_unix_millis),
                intent.completed_at.map(Timestamp::as_unix_millis),
                intent.deleted_at.map(Timestamp::as_unix_millis),
            ],
        )
        .map_err(db_err)?;
        let sealed_event = seal_event_tx(&tx, event)?;
        let sealed_audit = seal_audit_tx(&tx, &self.keys, audit)?;
        tx.commit().map_err(db_err)?;
        Ok(intent_gate_core::WriteReceipt {
            intent: intent.clone(),
            event: sealed_event,
            audit: sealed_audit,
        })
    }

    fn get_intent(&self, tenant: &TenantId, id: &IntentId) -> Result<Option<Intent>, StoreError> {
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {INTENT_COLUMNS} FROM intents WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.as_str(), tenant.as_str()],
                row_to_intent,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawIntent::decode).transpose()
    }

    fn find_active_dedupe(
        &self,
        tenant: &TenantId,
        dedupe_hash: &HashDigest,
    ) -> Result<Option<Intent>, StoreError> {
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {INTENT_COLUMNS} FROM intents
                     WHERE tenant_id = ?1 AND dedupe_hash = ?2
                       AND status NOT IN ('denied', 'completed', 'failed', 'cancelled')"
                ),
                params![tenant.as_str(), dedupe_hash.as_str()],
                row_to_intent,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawIntent::decode).transpose()
    }

    fn find_by_idempotency_key(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<Intent>, StoreError> {
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {INTENT_COLUMNS} FROM intents
                     WHERE tenant_id = ?1 AND idempotency_key = ?2
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![tenant.as_str(), key],
                row_to_intent,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawIntent::decode).transpose()
    }

    fn list_intents(
        &self,
        tenant: &TenantId,
        filter: &IntentFilter,
        page: &PageRequest,
    ) -> Result<Page<Intent>, StoreError> {
        let connection = self.lock()?;
        let mut sql = format!("SELECT {INTENT_COLUMNS} FROM intents WHERE tenant_id = ?1");
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(tenant.as_str().to_string())];
        if !filter.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if let Some(status) = filter.status {
            values.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(entity) = &filter.entity_id {
            values.push(Box::new(entity.as_str().to_string()));
            sql.push_str(&format!(" AND entity_id = ?{}", values.len()));
        }
        if let Some(tag) = &filter.intent_type {
            values.push(Box::new(tag.clone()));
            sql.push_str(&format!(" AND intent_type = ?{}", values.len()));
        }
        if let Some(cursor) = &page.cursor {
            values.push(Box::new(cursor.created_at.as_unix_millis()));
            let created_idx = values.len();
            values.push(Box::new(cursor.id.clone()));
            let id_idx = values.len();
            sql.push_str(&format!(
                " AND (created_at < ?{created_idx} OR (created_at = ?{created_idx} AND id < ?{id_idx}))"
            ));
        }
        let limit = page.effective_limit() as usize;
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT {}", limit + 1));

        let mut statement = connection.prepare(&sql).map_err(db_err)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|value| &**value).collect();
        let rows = statement
            .query_map(refs.as_slice(), row_to_intent)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut items = rows
            .into_iter()
            .map(RawIntent::decode)
            .collect::<Result<Vec<_>, _>>()?;
        let next = (items.len() > limit).then(|| {
            let last = &items[limit - 1];
            Cursor {
                created_at: last.created_at,
                id: last.id.to_string(),
            }
        });
        items.truncate(limit);
        Ok(Page { items, next })
    }

    fn transition_intent(
        &self,
        tenant: &TenantId,
        id: &IntentId,
        expected: intent_gate_core::IntentStatus,
        change: IntentChange,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<intent_gate_core::WriteReceipt, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        cas_intent_tx(&tx, tenant, id, expected, &change)?;
        let sealed_event = seal_event_tx(&tx, event)?;
        let sealed_audit = seal_audit_tx(&tx, &self.keys, audit)?;
        let intent = get_intent_tx(&tx, tenant, id)?.ok_or(StoreError::NotFound {
            kind: "intent",
            id: id.to_string(),
        })?;
        tx.commit().map_err(db_err)?;
        Ok(intent_gate_core::WriteReceipt {
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
        redacted_context: serde_json::Value,
        event: PendingIntentEvent,
        audit: PendingAuditRecord,
    ) -> Result<intent_gate_core::WriteReceipt, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let updated = tx
            .execute(
                "UPDATE intents SET
                     context_json = ?3,
                     metadata_json = '{}',
                     deleted_at = ?4,
                     updated_at = ?4
                 WHERE id = ?1 AND tenant_id = ?2",
                params![
                    id.as_str(),
                    tenant.as_str(),
                    to_json(&redacted_context)?,
                    deleted_at.as_unix_millis(),
                ],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "intent",
                id: id.to_string(),
            });
        }
        let sealed_event = seal_event_tx(&tx, event)?;
        let sealed_audit = seal_audit_tx(&tx, &self.keys, audit)?;
        let intent = get_intent_tx(&tx, tenant, id)?.ok_or(StoreError::NotFound {
            kind: "intent",
            id: id.to_string(),
        })?;
        tx.commit().map_err(db_err)?;
        Ok(intent_gate_core::WriteReceipt {
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
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT id, intent_id, tenant_id, event_type, payload_json, sequence_number,
                        previous_hash, event_hash, created_at
                 FROM intent_events
                 WHERE intent_id = ?1 AND tenant_id = ?2
                 ORDER BY sequence_number ASC",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![intent_id.as_str(), tenant.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)? as u64,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter()
            .map(
                |(id, intent, tenant_id, event_type, payload, sequence, previous, hash, created)| {
                    Ok(IntentEvent {
                        id: intent_gate_core::EventId::new(id),
                        intent_id: IntentId::new(intent),
                        tenant_id: TenantId::new(tenant_id),
                        event_type: parse_label(&event_type)?,
                        payload: from_json(&payload)?,
                        sequence_number: sequence,
                        previous_hash: HashDigest::from_hex(previous),
                        event_hash: HashDigest::from_hex(hash),
                        created_at: Timestamp::from_unix_millis(created),
                    })
                },
            )
            .collect()
    }

    fn append_evaluation(&self, record: &EvaluationRecord) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO intent_evaluations
                     (intent_id, tenant_id, stage, result_json, duration_ms, policy_id,
                      policy_version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.intent_id.as_str(),
                    record.tenant_id.as_str(),
                    record.stage.as_str(),
                    to_json(&record.result)?,
                    record.duration_ms as i64,
                    record.policy_id.as_ref().map(|id| id.as_str().to_string()),
                    record.policy_version,
                    record.created_at.as_unix_millis(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn list_evaluations(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Vec<EvaluationRecord>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT intent_id, tenant_id, stage, result_json, duration_ms, policy_id,
                        policy_version, created_at
                 FROM intent_evaluations
                 WHERE intent_id = ?1 AND tenant_id = ?2
                 ORDER BY rowid ASC",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![intent_id.as_str(), tenant.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)? as u64,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter()
            .map(|(intent, tenant_id, stage, result, duration, policy, version, created)| {
                Ok(EvaluationRecord {
                    intent_id: IntentId::new(intent),
                    tenant_id: TenantId::new(tenant_id),
                    stage: parse_label(&stage)?,
                    result: from_json(&result)?,
                    duration_ms: duration,
                    policy_id: policy.map(PolicyId::new),
                    policy_version: version,
                    created_at: Timestamp::from_unix_millis(created),
                })
            })
            .collect()
    }

    fn purge_soft_deleted(&self, before: Timestamp) -> Result<u64, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM intent_evaluations WHERE intent_id IN
                 (SELECT id FROM intents WHERE deleted_at IS NOT NULL AND deleted_at < ?1)",
            params![before.as_unix_millis()],
        )
        .map_err(db_err)?;
        let purged = tx
            .execute(
                "DELETE FROM intents WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
                params![before.as_unix_millis()],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(purged as u64)
    }

    fn history_summary(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
        since: Timestamp,
    ) -> Result<HistorySummary, StoreError> {
        let connection = self.lock()?;
        let (recent, denials, escalated, last): (i64, i64, i64, Option<i64>) = connection
            .query_row(
                "SELECT
                     COUNT(*) FILTER (WHERE created_at >= ?3),
                     COUNT(*) FILTER (WHERE created_at >= ?3 AND status = 'denied'),
                     COUNT(*) FILTER (WHERE created_at >= ?3 AND status = 'escalated'),
                     MAX(created_at)
                 FROM intents WHERE tenant_id = ?1 AND entity_id = ?2",
                params![tenant.as_str(), entity.as_str(), since.as_unix_millis()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(db_err)?;
        Ok(HistorySummary {
            recent_intents: recent as u64,
            recent_denials: denials as u64,
            recent_escalations: escalated as u64,
            last_intent_at: opt_ts(last),
        })
    }
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Column projection shared by every policy query.
const POLICY_COLUMNS: &str =
    "id, tenant_id, name, namespace, version, status, definition_json, checksum, \
     created_at, updated_at";

/// Maps a policies row to the core record.
fn row_to_policy(row: &Row<'_>) -> rusqlite::Result<RawPolicy> {
    Ok(RawPolicy {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        namespace: row.get(3)?,
        version: row.get(4)?,
        status: row.get(5)?,
        definition_json: row.get(6)?,
        checksum: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Raw policies row before JSON decoding.
struct RawPolicy {
    /// Policy identifier.
    id: String,
    /// Tenant scope.
    tenant_id: String,
    /// Policy name.
    name: String,
    /// Namespace.
    namespace: String,
    /// Version.
    version: i64,
    /// Status label.
    status: String,
    /// Definition JSON.
    definition_json: String,
    /// Checksum hex.
    checksum: String,
    /// Creation time.
    created_at: i64,
    /// Update time.
    updated_at: i64,
}

impl RawPolicy {
    /// Decodes the raw row into the core record.
    fn decode(self) -> Result<Policy, StoreError> {
        Ok(Policy {
            id: PolicyId::new(self.id),
            tenant_id: TenantId::new(self.tenant_id),
            name: self.name,
            namespace: NamespaceId::new(self.namespace),
            version: self.version,
            status: parse_label(&self.status)?,
            definition: from_json(&self.definition_json)?,
            checksum: HashDigest::from_hex(self.checksum),
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
        })
    }
}

impl PolicyStore for SqliteGovernanceStore {
    fn create_policy(
        &self,
        policy: &Policy,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO policies ({POLICY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                policy.id.as_str(),
                policy.tenant_id.as_str(),
                policy.name,
                policy.namespace.as_str(),
                policy.version,
                policy.status.as_str(),
                to_json(&policy.definition)?,
                policy.checksum.as_str(),
                policy.created_at.as_unix_millis(),
                policy.updated_at.as_unix_millis(),
            ],
        )
        .map_err(db_err)?;
        if inserted == 0 {
            return Err(StoreError::VersionConflict(format!(
                "{}/{}/{} v{}",
                policy.tenant_id, policy.namespace, policy.name, policy.version
            )));
        }
        let sealed = seal_audit_tx(&tx, &self.keys, audit)?;
        tx.commit().map_err(db_err)?;
        Ok(sealed)
    }

    fn update_policy(
        &self,
        policy: &Policy,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let updated = tx
            .execute(
                "UPDATE policies SET definition_json = ?3, checksum = ?4, updated_at = ?5
                 WHERE id = ?1 AND tenant_id = ?2",
                params![
                    policy.id.as_str(),
                    policy.tenant_id.as_str(),
                    to_json(&policy.definition)?,
                    policy.checksum.as_str(),
                    policy.updated_at.as_unix_millis(),
                ],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "policy",
                id: policy.id.to_string(),
            });
        }
        let sealed = seal_audit_tx(&tx, &self.keys, audit)?;
        tx.commit().map_err(db_err)?;
        Ok(sealed)
    }

    fn get_policy(&self, tenant: &TenantId, id: &PolicyId) -> Result<Option<Policy>, StoreError> {
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM policies WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.as_str(), tenant.as_str()],
                row_to_policy,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawPolicy::decode).transpose()
    }

    fn list_policies(
        &self,
        tenant: &TenantId,
        namespace: Option<&NamespaceId>,
    ) -> Result<Vec<Policy>, StoreError> {
        let connection = self.lock()?;
        let (sql, binds): (String, Vec<String>) = match namespace {
            Some(wanted) => (
                format!(
                    "SELECT {POLICY_COLUMNS} FROM policies
                     WHERE tenant_id = ?1 AND namespace = ?2
                     ORDER BY namespace, name, version DESC"
                ),
                vec![tenant.as_str().to_string(), wanted.as_str().to_string()],
            ),
            None => (
                format!(
                    "SELECT {POLICY_COLUMNS} FROM policies WHERE tenant_id = ?1
                     ORDER BY namespace, name, version DESC"
                ),
                vec![tenant.as_str().to_string()],
            ),
        };
        let mut statement = connection.prepare(&sql).map_err(db_err)?;
        let refs: Vec<&dyn ToSql> = binds.iter().map(|bind| bind as &dyn ToSql).collect();
        let rows = statement
            .query_map(refs.as_slice(), row_to_policy)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RawPolicy::decode).collect()
    }

    fn latest_policy_version(
        &self,
        tenant: &TenantId,
        namespace: &NamespaceId,
        name: &str,
    ) -> Result<i64, StoreError> {
        let connection = self.lock()?;
        let version: Option<i64> = connection
            .query_row(
                "SELECT MAX(version) FROM policies
                 WHERE tenant_id = ?1 AND namespace = ?2 AND name = ?3",
                params![tenant.as_str(), namespace.as_str(), name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(version.unwrap_or(0))
    }

    fn publish_policy(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        updated_at: Timestamp,
        audit: PendingAuditRecord,
    ) -> Result<Policy, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let target: Option<(String, String, String)> = tx
            .query_row(
                "SELECT status, namespace, name FROM policies
                 WHERE id = ?1 AND tenant_id = ?2",
                params![id.as_str(), tenant.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((status, namespace, name)) = target else {
            return Err(StoreError::NotFound {
                kind: "policy",
                id: id.to_string(),
            });
        };
        if status != PolicyStatus::Draft.as_str() {
            return Err(StoreError::StatusConflict {
                expected: PolicyStatus::Draft.as_str().to_string(),
                actual: status,
            });
        }
        tx.execute(
            "UPDATE policies SET status = 'deprecated', updated_at = ?4
             WHERE tenant_id = ?1 AND namespace = ?2 AND name = ?3 AND status = 'published'",
            params![tenant.as_str(), namespace, name, updated_at.as_unix_millis()],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE policies SET status = 'published', updated_at = ?3
             WHERE id = ?1 AND tenant_id = ?2",
            params![id.as_str(), tenant.as_str(), updated_at.as_unix_millis()],
        )
        .map_err(db_err)?;
        seal_audit_tx(&tx, &self.keys, audit)?;
        let raw = tx
            .query_row(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM policies WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.as_str(), tenant.as_str()],
                row_to_policy,
            )
            .map_err(db_err)?;
        let policy = raw.decode()?;
        tx.commit().map_err(db_err)?;
        Ok(policy)
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
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM policies WHERE id = ?1 AND tenant_id = ?2",
                params![id.as_str(), tenant.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(current) = current else {
            return Err(StoreError::NotFound {
                kind: "policy",
                id: id.to_string(),
            });
        };
        if !expected.iter().any(|candidate| candidate.as_str() == current) {
            return Err(StoreError::StatusConflict {
                expected: expected
                    .iter()
                    .map(|candidate| candidate.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
                actual: current,
            });
        }
        tx.execute(
            "UPDATE policies SET status = ?3, updated_at = ?4
             WHERE id = ?1 AND tenant_id = ?2",
            params![
                id.as_str(),
                tenant.as_str(),
                status.as_str(),
                updated_at.as_unix_millis()
            ],
        )
        .map_err(db_err)?;
        seal_audit_tx(&tx, &self.keys, audit)?;
        let raw = tx
            .query_row(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM policies WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.as_str(), tenant.as_str()],
                row_to_policy,
            )
            .map_err(db_err)?;
        let policy = raw.decode()?;
        tx.commit().map_err(db_err)?;
        Ok(policy)
    }

    fn delete_policy(
        &self,
        tenant: &TenantId,
        id: &PolicyId,
        audit: PendingAuditRecord,
    ) -> Result<AuditRecord, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let deleted = tx
            .execute(
                "DELETE FROM policies WHERE id = ?1 AND tenant_id = ?2 AND status = 'draft'",
                params![id.as_str(), tenant.as_str()],
            )
            .map_err(db_err)?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                kind: "policy",
                id: id.to_string(),
            });
        }
        let sealed = seal_audit_tx(&tx, &self.keys, audit)?;
        tx.commit().map_err(db_err)?;
        Ok(sealed)
    }

    fn published_policies(
        &self,
        tenant: &TenantId,
        namespace: &NamespaceId,
    ) -> Result<Vec<Policy>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {POLICY_COLUMNS} FROM policies
                 WHERE tenant_id = ?1 AND namespace = ?2 AND status = 'published'"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![tenant.as_str(), namespace.as_str()], row_to_policy)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RawPolicy::decode).collect()
    }
}

// ============================================================================
// SECTION: Escalation Store
// ============================================================================

/// Column projection shared by every escalation query.
const ESCALATION_COLUMNS: &str =
    "id, intent_id, tenant_id, reason, reason_category, escalated_to, status, timeout_at, \
     auto_deny_on_timeout, context_json, acknowledged_at, resolved_by, resolved_at, \
     resolution_notes, sla_breached, created_at, updated_at";

/// Maps an escalations row to the core record.
fn row_to_escalation(row: &Row<'_>) -> rusqlite::Result<RawEscalation> {
    Ok(RawEscalation {
        id: row.get(0)?,
        intent_id: row.get(1)?,
        tenant_id: row.get(2)?,
        reason: row.get(3)?,
        reason_category: row.get(4)?,
        escalated_to: row.get(5)?,
        status: row.get(6)?,
        timeout_at: row.get(7)?,
        auto_deny_on_timeout: row.get(8)?,
        context_json: row.get(9)?,
        acknowledged_at: row.get(10)?,
        resolved_by: row.get(11)?,
        resolved_at: row.get(12)?,
        resolution_notes: row.get(13)?,
        sla_breached: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Raw escalations row before JSON decoding.
struct RawEscalation {
    /// Escalation identifier.
    id: String,
    /// Intent under decision.
    intent_id: String,
    /// Tenant scope.
    tenant_id: String,
    /// Escalation reason.
    reason: String,
    /// Reason category.
    reason_category: String,
    /// Addressee.
    escalated_to: String,
    /// Status label.
    status: String,
    /// SLA deadline.
    timeout_at: i64,
    /// Auto-deny flag.
    auto_deny_on_timeout: bool,
    /// Context JSON.
    context_json: String,
    /// Acknowledgement time.
    acknowledged_at: Option<i64>,
    /// Resolver principal.
    resolved_by: Option<String>,
    /// Resolution time.
    resolved_at: Option<i64>,
    /// Resolver notes.
    resolution_notes: Option<String>,
    /// SLA breach flag.
    sla_breached: bool,
    /// Creation time.
    created_at: i64,
    /// Update time.
    updated_at: i64,
}

impl RawEscalation {
    /// Decodes the raw row into the core record.
    fn decode(self) -> Result<Escalation, StoreError> {
        Ok(Escalation {
            id: EscalationId::new(self.id),
            intent_id: IntentId::new(self.intent_id),
            tenant_id: TenantId::new(self.tenant_id),
            reason: self.reason,
            reason_category: self.reason_category,
            escalated_to: self.escalated_to,
            status: parse_label(&self.status)?,
            timeout_at: Timestamp::from_unix_millis(self.timeout_at),
            auto_deny_on_timeout: self.auto_deny_on_timeout,
            context: from_json(&self.context_json)?,
            acknowledged_at: opt_ts(self.acknowledged_at),
            resolved_by: self.resolved_by.map(PrincipalId::new),
            resolved_at: opt_ts(self.resolved_at),
            resolution_notes: self.resolution_notes,
            sla_breached: self.sla_breached,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
        })
    }
}

/// Loads an escalation inside a transaction.
fn get_escalation_tx(
    tx: &Transaction<'_>,
    tenant: &TenantId,
    id: &EscalationId,
) -> Result<Option<Escalation>, StoreError> {
    let raw = tx
        .query_row(
            &format!(
                "SELECT {ESCALATION_COLUMNS} FROM escalations
                 WHERE id = ?1 AND tenant_id = ?2"
            ),
            params![id.as_str(), tenant.as_str()],
            row_to_escalation,
        )
        .optional()
        .map_err(db_err)?;
    raw.map(RawEscalation::decode).transpose()
}

impl EscalationStore for SqliteGovernanceStore {
    fn insert_escalation(
        &self,
        escalation: &Escalation,
        intent_transition: IntentTransition,
        audit: PendingAuditRecord,
    ) -> Result<EscalationReceipt, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let active: Option<String> = tx
            .query_row(
                "SELECT id FROM escalations
                 WHERE intent_id = ?1 AND status IN ('pending', 'acknowledged')",
                params![escalation.intent_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(existing) = active {
            return Err(StoreError::ActiveEscalationExists {
                existing: EscalationId::new(existing),
            });
        }
        tx.execute(
            &format!(
                "INSERT INTO escalations ({ESCALATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17)"
            ),
            params![
                escalation.id.as_str(),
                escalation.intent_id.as_str(),
                escalation.tenant_id.as_str(),
                escalation.reason,
                escalation.reason_category,
                escalation.escalated_to,
                escalation.status.as_str(),
                escalation.timeout_at.as_unix_millis(),
                escalation.auto_deny_on_timeout,
                to_json(&escalation.context)?,
                escalation.acknowledged_at.map(Timestamp::as_unix_millis),
                escalation.resolved_by.as_ref().map(|id| id.as_str().to_string()),
                escalation.resolved_at.map(Timestamp::as_unix_millis),
                escalation.resolution_notes,
                escalation.sla_breached,
                escalation.created_at.as_unix_millis(),
                escalation.updated_at.as_unix_millis(),
            ],
        )
        .map_err(db_err)?;
        let intent = apply_intent_transition_tx(&tx, &escalation.tenant_id, intent_transition)?;
        let sealed_audit = seal_audit_tx(&tx, &self.keys, audit)?;
        tx.commit().map_err(db_err)?;
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
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {ESCALATION_COLUMNS} FROM escalations
                     WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.as_str(), tenant.as_str()],
                row_to_escalation,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawEscalation::decode).transpose()
    }

    fn active_escalation_for_intent(
        &self,
        tenant: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Option<Escalation>, StoreError> {
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {ESCALATION_COLUMNS} FROM escalations
                     WHERE tenant_id = ?1 AND intent_id = ?2
                       AND status IN ('pending', 'acknowledged')"
                ),
                params![tenant.as_str(), intent_id.as_str()],
                row_to_escalation,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawEscalation::decode).transpose()
    }

    fn list_escalations(
        &self,
        tenant: &TenantId,
        filter: &EscalationFilter,
        page: &PageRequest,
    ) -> Result<Page<Escalation>, StoreError> {
        let connection = self.lock()?;
        let mut sql =
            format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE tenant_id = ?1");
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(tenant.as_str().to_string())];
        if let Some(status) = filter.status {
            values.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(target) = &filter.escalated_to {
            values.push(Box::new(target.clone()));
            sql.push_str(&format!(" AND escalated_to = ?{}", values.len()));
        }
        if let Some(cursor) = &page.cursor {
            values.push(Box::new(cursor.created_at.as_unix_millis()));
            let created_idx = values.len();
            values.push(Box::new(cursor.id.clone()));
            let id_idx = values.len();
            sql.push_str(&format!(
                " AND (created_at < ?{created_idx} OR (created_at = ?{created_idx} AND id < ?{id_idx}))"
            ));
        }
        let limit = page.effective_limit() as usize;
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT {}", limit + 1));

        let mut statement = connection.prepare(&sql).map_err(db_err)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|value| &**value).collect();
        let rows = statement
            .query_map(refs.as_slice(), row_to_escalation)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut items = rows
            .into_iter()
            .map(RawEscalation::decode)
            .collect::<Result<Vec<_>, _>>()?;
        let next = (items.len() > limit).then(|| {
            let last = &items[limit - 1];
            Cursor {
                created_at: last.created_at,
                id: last.id.to_string(),
            }
        });
        items.truncate(limit);
        Ok(Page { items, next })
    }

    fn transition_escalation(
        &self,
        tenant: &TenantId,
        id: &EscalationId,
        expected: &[intent_gate_core::EscalationStatus],
        change: EscalationChange,
        ledger_event: Option<PendingIntentEvent>,
        intent_transition: Option<IntentTransition>,
        audit: PendingAuditRecord,
    ) -> Result<EscalationReceipt, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM escalations WHERE id = ?1 AND tenant_id = ?2",
                params![id.as_str(), tenant.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(current) = current else {
            return Err(StoreError::NotFound {
                kind: "escalation",
                id: id.to_string(),
            });
        };
        if !expected.iter().any(|candidate| candidate.as_str() == current) {
            return Err(StoreError::StatusConflict {
                expected: expected
                    .iter()
                    .map(|candidate| candidate.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
                actual: current,
            });
        }
        tx.execute(
            "UPDATE escalations SET
                 status = COALESCE(?3, status),
                 updated_at = COALESCE(?4, updated_at),
                 acknowledged_at = COALESCE(?5, acknowledged_at),
                 resolved_by = COALESCE(?6, resolved_by),
                 resolved_at = COALESCE(?7, resolved_at),
                 resolution_notes = COALESCE(?8, resolution_notes),
                 sla_breached = COALESCE(?9, sla_breached)
             WHERE id = ?1 AND tenant_id = ?2",
            params![
                id.as_str(),
                tenant.as_str(),
                change.status.map(|status| status.as_str().to_string()),
                change.updated_at.map(Timestamp::as_unix_millis),
                change.acknowledged_at.map(Timestamp::as_unix_millis),
                change.resolved_by.as_ref().map(|by| by.as_str().to_string()),
                change.resolved_at.map(Timestamp::as_unix_millis),
                change.resolution_notes,
                change.sla_breached,
            ],
        )
        .map_err(db_err)?;
        if let Some(event) = ledger_event {
            seal_event_tx(&tx, event)?;
        }
        let intent = match intent_transition {
            Some(transition) => Some(apply_intent_transition_tx(&tx, tenant, transition)?),
            None => None,
        };
        let sealed_audit = seal_audit_tx(&tx, &self.keys, audit)?;
        let escalation = get_escalation_tx(&tx, tenant, id)?.ok_or(StoreError::NotFound {
            kind: "escalation",
            id: id.to_string(),
        })?;
        tx.commit().map_err(db_err)?;
        Ok(EscalationReceipt {
            escalation,
            intent,
            audit: sealed_audit,
        })
    }

    fn due_escalations(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Escalation>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {ESCALATION_COLUMNS} FROM escalations
                 WHERE status IN ('pending', 'acknowledged') AND timeout_at <= ?1
                 ORDER BY timeout_at ASC LIMIT ?2"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![now.as_unix_millis(), limit], row_to_escalation)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RawEscalation::decode).collect()
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Column projection shared by every audit query.
const AUDIT_COLUMNS: &str =
    "id, tenant_id, event_type, event_category, severity, actor_json, target_type, \
     target_id, action, outcome, before_json, after_json, trace_id, span_id, \
     sequence_number, previous_hash, record_hash, signature, created_at";

/// Maps an audit row to the core record.
fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<RawAudit> {
    Ok(RawAudit {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        event_type: row.get(2)?,
        event_category: row.get(3)?,
        severity: row.get(4)?,
        actor_json: row.get(5)?,
        target_type: row.get(6)?,
        target_id: row.get(7)?,
        action: row.get(8)?,
        outcome: row.get(9)?,
        before_json: row.get(10)?,
        after_json: row.get(11)?,
        trace_id: row.get(12)?,
        span_id: row.get(13)?,
        sequence_number: row.get(14)?,
        previous_hash: row.get(15)?,
        record_hash: row.get(16)?,
        signature: row.get(17)?,
        created_at: row.get(18)?,
    })
}

/// Raw audit row before JSON decoding.
struct RawAudit {
    /// Record identifier.
    id: String,
    /// Tenant scope.
    tenant_id: String,
    /// Event type.
    event_type: String,
    /// Category label.
    event_category: String,
    /// Severity label.
    severity: String,
    /// Actor JSON.
    actor_json: String,
    /// Target kind.
    target_type: String,
    /// Target identifier.
    target_id: String,
    /// Action verb.
    action: String,
    /// Outcome label.
    outcome: String,
    /// Before-state JSON.
    before_json: Option<String>,
    /// After-state JSON.
    after_json: Option<String>,
    /// Trace identifier.
    trace_id: Option<String>,
    /// Span identifier.
    span_id: Option<String>,
    /// Chain sequence.
    sequence_number: i64,
    /// Previous link hash.
    previous_hash: String,
    /// Record hash.
    record_hash: String,
    /// Tenant signature.
    signature: String,
    /// Event time.
    created_at: i64,
}

impl RawAudit {
    /// Decodes the raw row into the core record.
    fn decode(self) -> Result<AuditRecord, StoreError> {
        Ok(AuditRecord {
            id: AuditId::new(self.id),
            tenant_id: TenantId::new(self.tenant_id),
            event_type: self.event_type,
            event_category: parse_label(&self.event_category)?,
            severity: parse_label(&self.severity)?,
            actor: from_json(&self.actor_json)?,
            target: intent_gate_core::AuditTarget {
                target_type: self.target_type,
                target_id: self.target_id,
            },
            action: self.action,
            outcome: parse_label(&self.outcome)?,
            before: self.before_json.as_deref().map(from_json).transpose()?,
            after: self.after_json.as_deref().map(from_json).transpose()?,
            trace_id: self.trace_id.map(TraceId::new),
            span_id: self.span_id,
            sequence_number: self.sequence_number as u64,
            previous_hash: HashDigest::from_hex(self.previous_hash),
            record_hash: HashDigest::from_hex(self.record_hash),
            signature: ChainSignature::from_hex(self.signature),
            created_at: Timestamp::from_unix_millis(self.created_at),
        })
    }
}

impl AuditStore for SqliteGovernanceStore {
    fn append_audit(&self, record: PendingAuditRecord) -> Result<AuditRecord, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let sealed = seal_audit_tx(&tx, &self.keys, record)?;
        tx.commit().map_err(db_err)?;
        Ok(sealed)
    }

    fn append_audit_batch(
        &self,
        records: Vec<PendingAuditRecord>,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_err)?;
        let mut sealed_batch = Vec::with_capacity(records.len());
        for record in records {
            sealed_batch.push(seal_audit_tx(&tx, &self.keys, record)?);
        }
        tx.commit().map_err(db_err)?;
        Ok(sealed_batch)
    }

    fn audit_by_id(
        &self,
        tenant: &TenantId,
        id: &AuditId,
    ) -> Result<Option<AuditRecord>, StoreError> {
        let connection = self.lock()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_records
                     WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.as_str(), tenant.as_str()],
                row_to_audit,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawAudit::decode).transpose()
    }

    fn query_audit(
        &self,
        tenant: &TenantId,
        query: &AuditQuery,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let connection = self.lock()?;
        let mut sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_records WHERE tenant_id = ?1");
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(tenant.as_str().to_string())];
        if let Some(category) = query.event_category {
            values.push(Box::new(category.as_str().to_string()));
            sql.push_str(&format!(" AND event_category = ?{}", values.len()));
        }
        if let Some(event_type) = &query.event_type {
            values.push(Box::new(event_type.clone()));
            sql.push_str(&format!(" AND event_type = ?{}", values.len()));
        }
        if let Some(outcome) = query.outcome {
            values.push(Box::new(outcome.as_str().to_string()));
            sql.push_str(&format!(" AND outcome = ?{}", values.len()));
        }
        if let Some(actor) = &query.actor_id {
            values.push(Box::new(actor.clone()));
            sql.push_str(&format!(
                " AND json_extract(actor_json, '$.actor_id') = ?{}",
                values.len()
            ));
        }
        if let Some(from) = query.from {
            values.push(Box::new(from.as_unix_millis()));
            sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
        }
        if let Some(until) = query.until {
            values.push(Box::new(until.as_unix_millis()));
            sql.push_str(&format!(" AND created_at < ?{}", values.len()));
        }
        if let Some(before) = query.before_sequence {
            values.push(Box::new(before as i64));
            sql.push_str(&format!(" AND sequence_number < ?{}", values.len()));
        }
        let limit = query
            .limit
            .unwrap_or(intent_gate_core::MAX_PAGE_SIZE)
            .min(intent_gate_core::MAX_PAGE_SIZE);
        sql.push_str(&format!(" ORDER BY sequence_number DESC LIMIT {limit}"));

        let mut statement = connection.prepare(&sql).map_err(db_err)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|value| &**value).collect();
        let rows = statement
            .query_map(refs.as_slice(), row_to_audit)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let records = rows
            .into_iter()
            .map(RawAudit::decode)
            .collect::<Result<Vec<_>, _>>()?;
        // Minimum-severity filtering happens after decode: the ladder is an
        // ordering, not a label match.
        Ok(match query.min_severity {
            Some(floor) => records.into_iter().filter(|row| row.severity >= floor).collect(),
            None => records,
        })
    }

    fn audit_for_target(
        &self,
        tenant: &TenantId,
        target_type: &str,
        target_id: &str,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_records
                 WHERE tenant_id = ?1 AND target_type = ?2 AND target_id = ?3
                 ORDER BY sequence_number DESC"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![tenant.as_str(), target_type, target_id], row_to_audit)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RawAudit::decode).collect()
    }

    fn audit_by_trace(
        &self,
        tenant: &TenantId,
        trace_id: &TraceId,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_records
                 WHERE tenant_id = ?1 AND trace_id = ?2
                 ORDER BY sequence_number ASC"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![tenant.as_str(), trace_id.as_str()], row_to_audit)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RawAudit::decode).collect()
    }

    fn audit_stats(
        &self,
        tenant: &TenantId,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<AuditStats, StoreError> {
        let connection = self.lock()?;
        let mut stats = AuditStats::default();
        let total: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM audit_records
                 WHERE tenant_id = ?1 AND created_at >= ?2 AND created_at < ?3",
                params![tenant.as_str(), from.as_unix_millis(), until.as_unix_millis()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        stats.total = total as u64;
        for (column, bucket) in [
            ("event_category", &mut stats.by_category),
            ("severity", &mut stats.by_severity),
            ("outcome", &mut stats.by_outcome),
        ] {
            let mut statement = connection
                .prepare(&format!(
                    "SELECT {column}, COUNT(*) FROM audit_records
                     WHERE tenant_id = ?1 AND created_at >= ?2 AND created_at < ?3
                     GROUP BY {column}"
                ))
                .map_err(db_err)?;
            let rows = statement
                .query_map(
                    params![tenant.as_str(), from.as_unix_millis(), until.as_unix_millis()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
                )
                .map_err(db_err)?
                .collect::<Result<BTreeMap<String, u64>, _>>()
                .map_err(db_err)?;
            *bucket = rows;
        }
        Ok(stats)
    }

    fn audit_chain(
        &self,
        tenant: &TenantId,
        start_sequence: u64,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_records
                 WHERE tenant_id = ?1 AND sequence_number >= ?2
                 ORDER BY sequence_number ASC LIMIT ?3"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![tenant.as_str(), start_sequence as i64, limit], row_to_audit)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(RawAudit::decode).collect()
    }

    fn last_audit_sequence(&self, tenant: &TenantId) -> Result<u64, StoreError> {
        let connection = self.lock()?;
        let last: Option<i64> = connection
            .query_row(
                "SELECT MAX(sequence_number) FROM audit_records WHERE tenant_id = ?1",
                params![tenant.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(last.unwrap_or(0) as u64)
    }

    fn latest_checkpoint(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<ChainCheckpoint>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(i64, String, i64)> = connection
            .query_row(
                "SELECT up_to_sequence, root_hash, created_at FROM audit_checkpoints
                 WHERE tenant_id = ?1 ORDER BY up_to_sequence DESC LIMIT 1",
                params![tenant.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;
        Ok(row.map(|(up_to, root, created)| ChainCheckpoint {
            tenant_id: tenant.clone(),
            up_to_sequence: up_to as u64,
            root_hash: HashDigest::from_hex(root),
            created_at: Timestamp::from_unix_millis(created),
        }))
    }

    fn record_checkpoint(&self, checkpoint: &ChainCheckpoint) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO audit_checkpoints
                     (tenant_id, up_to_sequence, root_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    checkpoint.tenant_id.as_str(),
                    checkpoint.up_to_sequence as i64,
                    checkpoint.root_hash.as_str(),
                    checkpoint.created_at.as_unix_millis(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn audited_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT DISTINCT tenant_id FROM audit_records")
            .map_err(db_err)?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows.into_iter().map(TenantId::new).collect())
    }
}

// ============================================================================
// SECTION: Revocation Store
// ============================================================================

impl RevocationStore for SqliteGovernanceStore {
    fn revoke_jti(&self, jti: &str, expires_at: Timestamp) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO revoked_jtis (jti, expires_at) VALUES (?1, ?2)",
                params![jti, expires_at.as_unix_millis()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn is_jti_revoked(&self, jti: &str, now: Timestamp) -> Result<bool, StoreError> {
        let connection = self.lock()?;
        let expires: Option<i64> = connection
            .query_row(
                "SELECT expires_at FROM revoked_jtis WHERE jti = ?1",
                params![jti],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(expires.is_some_and(|expiry| expiry > now.as_unix_millis()))
    }

    fn set_revoke_before(
        &self,
        user: &PrincipalId,
        cutoff: Timestamp,
    ) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO user_revocations (user_id, revoke_before)
                 VALUES (?1, ?2)",
                params![user.as_str(), cutoff.as_unix_millis()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn revoke_before(&self, user: &PrincipalId) -> Result<Option<Timestamp>, StoreError> {
        let connection = self.lock()?;
        let cutoff: Option<i64> = connection
            .query_row(
                "SELECT revoke_before FROM user_revocations WHERE user_id = ?1",
                params![user.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(opt_ts(cutoff))
    }

    fn purge_expired_revocations(&self, now: Timestamp) -> Result<u64, StoreError> {
        let connection = self.lock()?;
        let purged = connection
            .execute(
                "DELETE FROM revoked_jtis WHERE expires_at <= ?1",
                params![now.as_unix_millis()],
            )
            .map_err(db_err)?;
        Ok(purged as u64)
    }
}
