// intent-gate-core/src/core/trust.rs
// ============================================================================
// Module: Intent Gate Trust Snapshot
// Description: Frozen view of an entity's trust at evaluation start.
// Purpose: Carry the external trust service's answer (or its degraded
//          fallback) into policy evaluation and decision gating.
// Dependencies: crate::core::time, serde
// ============================================================================

//! ## Overview
//! Trust computation is an external collaborator. The intake worker captures
//! one snapshot per evaluation with a bounded timeout; on timeout or outage it
//! degrades to the conservative fallback instead of failing the stage. A
//! degraded snapshot never allows promotion past the configured trust ceiling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Trust Snapshot
// ============================================================================

/// Frozen trust view used for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    /// Coarse trust level (tenant-defined ladder).
    pub trust_level: i64,
    /// Fine-grained trust score.
    pub trust_score: f64,
    /// Additional entity attributes surfaced to policy conditions.
    pub attributes: BTreeMap<String, Value>,
    /// True when the snapshot is a fallback (timeout or outage).
    pub degraded: bool,
    /// Capture time.
    pub captured_at: Timestamp,
}

impl TrustSnapshot {
    /// Builds the conservative fallback used when the trust service is
    /// unreachable: lowest level, zero score, marked degraded.
    #[must_use]
    pub fn degraded_fallback(captured_at: Timestamp) -> Self {
        Self {
            trust_level: 0,
            trust_score: 0.0,
            attributes: BTreeMap::new(),
            degraded: true,
            captured_at,
        }
    }
}

// ============================================================================
// SECTION: Evaluation Context Sections
// ============================================================================

/// Tenant profile surfaced to policy conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    /// Commercial tier label.
    pub tier: String,
    /// Enabled feature flags.
    pub features: Vec<String>,
    /// Tenant limit mapping.
    pub limits: Value,
}

/// Recent-activity summary surfaced to policy conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Intents submitted in the lookback window.
    pub recent_intents: u64,
    /// Denials in the lookback window.
    pub recent_denials: u64,
    /// Escalations in the lookback window.
    pub recent_escalations: u64,
    /// Most recent prior submission time.
    pub last_intent_at: Option<Timestamp>,
}

/// Request metadata surfaced to policy conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Source IP.
    pub ip: Option<String>,
    /// User agent.
    pub user_agent: Option<String>,
    /// Coarse geo label when the transport resolved one.
    pub geo: Option<String>,
}
