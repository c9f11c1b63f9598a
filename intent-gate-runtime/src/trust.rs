// intent-gate-runtime/src/trust.rs
// ============================================================================
// Module: Intent Gate Trust Providers
// Description: Static and HTTP implementations of the trust seam.
// Purpose: Capture entity trust snapshots from the external trust service,
//          or from fixed configuration in development and tests.
// Dependencies: intent-gate-core, reqwest, serde, url
// ============================================================================

//! ## Overview
//! The trust engine is an external collaborator; these providers only fetch
//! its answer. Callers bound every capture with a timeout and degrade on
//! failure, so providers stay simple: no internal retries, no caching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use intent_gate_core::EntityId;
use intent_gate_core::SystemClock;
use intent_gate_core::TenantId;
use intent_gate_core::TrustError;
use intent_gate_core::TrustProvider;
use intent_gate_core::TrustSnapshot;
use intent_gate_core::core::time::Clock;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Static Provider
// ============================================================================

/// Fixed-answer trust provider for development and tests.
pub struct StaticTrustProvider {
    /// Default trust level.
    level: i64,
    /// Default trust score.
    score: f64,
    /// Per-entity overrides.
    overrides: BTreeMap<String, (i64, f64)>,
}

impl StaticTrustProvider {
    /// Creates a provider answering with the given defaults.
    #[must_use]
    pub const fn new(level: i64, score: f64) -> Self {
        Self {
            level,
            score,
            overrides: BTreeMap::new(),
        }
    }

    /// Adds a per-entity override.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>, level: i64, score: f64) -> Self {
        self.overrides.insert(entity.into(), (level, score));
        self
    }
}

#[async_trait]
impl TrustProvider for StaticTrustProvider {
    async fn snapshot(
        &self,
        _tenant: &TenantId,
        entity: &EntityId,
    ) -> Result<TrustSnapshot, TrustError> {
        let (level, score) =
            self.overrides.get(entity.as_str()).copied().unwrap_or((self.level, self.score));
        Ok(TrustSnapshot {
            trust_level: level,
            trust_score: score,
            attributes: BTreeMap::new(),
            degraded: false,
            captured_at: SystemClock.now(),
        })
    }
}

// ============================================================================
// SECTION: HTTP Provider
// ============================================================================

/// Wire shape returned by the trust service.
#[derive(Debug, Deserialize)]
struct TrustWireSnapshot {
    /// Coarse trust level.
    #[serde(rename = "trustLevel")]
    trust_level: i64,
    /// Fine-grained trust score.
    #[serde(rename = "trustScore")]
    trust_score: f64,
    /// Additional entity attributes.
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

/// HTTP-backed trust provider.
pub struct HttpTrustProvider {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Trust service base endpoint.
    endpoint: Url,
}

impl HttpTrustProvider {
    /// Creates a provider against the given base endpoint.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl TrustProvider for HttpTrustProvider {
    async fn snapshot(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
    ) -> Result<TrustSnapshot, TrustError> {
        let url = self
            .endpoint
            .join(&format!("trust/{tenant}/{entity}"))
            .map_err(|err| TrustError::Provider(err.to_string()))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| TrustError::Provider(err.to_string()))?
            .error_for_status()
            .map_err(|err| TrustError::Provider(err.to_string()))?;
        let wire: TrustWireSnapshot =
            response.json().await.map_err(|err| TrustError::Provider(err.to_string()))?;
        Ok(TrustSnapshot {
            trust_level: wire.trust_level,
            trust_score: wire.trust_score,
            attributes: wire.attributes,
            degraded: false,
            captured_at: SystemClock.now(),
        })
    }
}
