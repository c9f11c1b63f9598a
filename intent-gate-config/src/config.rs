// intent-gate-config/src/config.rs
// ============================================================================
// Module: Intent Gate Configuration
// Description: Typed deployment configuration with strict validation.
// Purpose: Load and validate every tunable the runtime consumes, failing
//          closed on unknown or out-of-range settings.
// Dependencies: serde, toml, url, base64
// ============================================================================

//! ## Overview
//! Configuration is TOML with `deny_unknown_fields` on every table: a typo
//! is a startup error, not a silently ignored setting. Each table carries
//! explicit defaults so a minimal file boots a development instance, while
//! `validate` enforces the ranges production depends on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing failed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A setting failed validation.
    #[error("config validation error: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the server binds.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Whether a JTI claim is required on every token (production default).
    #[serde(default = "default_true")]
    pub require_jti: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            require_jti: true,
        }
    }
}

/// Returns the default bind address.
fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Returns the default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from("intent-gate.db")
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Queue and worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum delivery attempts per stage before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry backoff in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Retry backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Worker tasks per stage.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            worker_concurrency: default_worker_concurrency(),
        }
    }
}

/// Returns the default attempt budget.
const fn default_max_attempts() -> u32 {
    5
}

/// Returns the default base backoff.
const fn default_base_backoff_ms() -> u64 {
    500
}

/// Returns the default backoff ceiling.
const fn default_max_backoff_ms() -> u64 {
    60_000
}

/// Returns the default worker concurrency.
const fn default_worker_concurrency() -> u32 {
    4
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Lifecycle service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleSettings {
    /// Dedupe lock TTL in milliseconds.
    #[serde(default = "default_dedupe_ttl_ms")]
    pub dedupe_ttl_ms: i64,
    /// Per-tenant in-flight intent cap.
    #[serde(default = "default_concurrency_cap")]
    pub tenant_concurrency_cap: u32,
    /// Delay applied to jobs enqueued above the cap, in milliseconds.
    #[serde(default = "default_over_cap_delay_ms")]
    pub over_cap_delay_ms: u64,
    /// Per-tenant submissions allowed per window.
    #[serde(default = "default_submit_rate_limit")]
    pub submit_rate_limit: u32,
    /// Submission rate window in milliseconds.
    #[serde(default = "default_submit_rate_window_ms")]
    pub submit_rate_window_ms: i64,
    /// Dotted context paths redacted on soft delete; empty redacts the
    /// whole context.
    #[serde(default)]
    pub redaction_paths: Vec<String>,
    /// Routing table from intent type to namespace.
    #[serde(default)]
    pub namespace_routes: BTreeMap<String, String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            dedupe_ttl_ms: default_dedupe_ttl_ms(),
            tenant_concurrency_cap: default_concurrency_cap(),
            over_cap_delay_ms: default_over_cap_delay_ms(),
            submit_rate_limit: default_submit_rate_limit(),
            submit_rate_window_ms: default_submit_rate_window_ms(),
            redaction_paths: Vec::new(),
            namespace_routes: BTreeMap::new(),
        }
    }
}

/// Returns the default dedupe TTL.
const fn default_dedupe_ttl_ms() -> i64 {
    10_000
}

/// Returns the default in-flight cap.
const fn default_concurrency_cap() -> u32 {
    32
}

/// Returns the default over-cap delay.
const fn default_over_cap_delay_ms() -> u64 {
    1_000
}

/// Returns the default submission rate limit.
const fn default_submit_rate_limit() -> u32 {
    60
}

/// Returns the default submission rate window.
const fn default_submit_rate_window_ms() -> i64 {
    60_000
}

// ============================================================================
// SECTION: Policy Evaluation
// ============================================================================

/// Policy evaluator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySettings {
    /// Evaluator cache TTL in milliseconds.
    #[serde(default = "default_policy_cache_ttl_ms")]
    pub cache_ttl_ms: i64,
    /// Policy evaluation stage timeout in milliseconds.
    #[serde(default = "default_evaluation_timeout_ms")]
    pub evaluation_timeout_ms: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_policy_cache_ttl_ms(),
            evaluation_timeout_ms: default_evaluation_timeout_ms(),
        }
    }
}

/// Returns the default cache TTL.
const fn default_policy_cache_ttl_ms() -> i64 {
    60_000
}

/// Returns the default evaluation timeout.
const fn default_evaluation_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Trust
// ============================================================================

/// Trust provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Trust service endpoint; absent uses the static provider.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Snapshot capture timeout in milliseconds.
    #[serde(default = "default_trust_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether a degraded snapshot blocks direct approval.
    #[serde(default = "default_true")]
    pub degraded_blocks_approval: bool,
    /// Escalation target used when a degraded approval is demoted.
    #[serde(default = "default_degraded_escalation_to")]
    pub degraded_escalation_to: String,
    /// Escalation timeout for demoted approvals, in milliseconds.
    #[serde(default = "default_degraded_escalation_timeout_ms")]
    pub degraded_escalation_timeout_ms: i64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_trust_timeout_ms(),
            degraded_blocks_approval: true,
            degraded_escalation_to: default_degraded_escalation_to(),
            degraded_escalation_timeout_ms: default_degraded_escalation_timeout_ms(),
        }
    }
}

/// Returns the default trust timeout.
const fn default_trust_timeout_ms() -> u64 {
    2_000
}

/// Returns the default degraded escalation target.
fn default_degraded_escalation_to() -> String {
    "governance".to_string()
}

/// Returns the default degraded escalation timeout.
const fn default_degraded_escalation_timeout_ms() -> i64 {
    3_600_000
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Scheduler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Escalation timeout sweep cadence in milliseconds (at most 30s).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Cleanup cadence in milliseconds.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// Chain checkpoint cadence in milliseconds.
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,
    /// Leader lease TTL in milliseconds.
    #[serde(default = "default_leader_ttl_ms")]
    pub leader_ttl_ms: i64,
    /// Retention for soft-deleted intents, in milliseconds.
    #[serde(default = "default_soft_delete_retention_ms")]
    pub soft_delete_retention_ms: i64,
    /// Retention for dead-letter jobs, in milliseconds.
    #[serde(default = "default_dlq_retention_ms")]
    pub dlq_retention_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
            leader_ttl_ms: default_leader_ttl_ms(),
            soft_delete_retention_ms: default_soft_delete_retention_ms(),
            dlq_retention_ms: default_dlq_retention_ms(),
        }
    }
}

/// Returns the default sweep cadence.
const fn default_sweep_interval_ms() -> u64 {
    15_000
}

/// Returns the default cleanup cadence.
const fn default_cleanup_interval_ms() -> u64 {
    300_000
}

/// Returns the default checkpoint cadence.
const fn default_checkpoint_interval_ms() -> u64 {
    600_000
}

/// Returns the default leader lease TTL.
const fn default_leader_ttl_ms() -> i64 {
    30_000
}

/// Returns the default soft-delete retention (30 days).
const fn default_soft_delete_retention_ms() -> i64 {
    30 * 86_400_000
}

/// Returns the default dead-letter retention (7 days).
const fn default_dlq_retention_ms() -> i64 {
    7 * 86_400_000
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Chain signing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// Deployment default signing key, base64 encoded.
    pub default_key_base64: String,
    /// Per-tenant key overrides, base64 encoded.
    #[serde(default)]
    pub tenant_keys_base64: BTreeMap<String, String>,
}

impl SigningConfig {
    /// Decodes the default key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the key is not valid base64.
    pub fn default_key(&self) -> Result<Vec<u8>, ConfigError> {
        decode_key("signing.default_key_base64", &self.default_key_base64)
    }

    /// Decodes the per-tenant overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any key is not valid base64.
    pub fn tenant_keys(&self) -> Result<BTreeMap<String, Vec<u8>>, ConfigError> {
        let mut keys = BTreeMap::new();
        for (tenant, encoded) in &self.tenant_keys_base64 {
            keys.insert(tenant.clone(), decode_key(tenant, encoded)?);
        }
        Ok(keys)
    }
}

/// Decodes one base64 key with a labeled error.
fn decode_key(label: &str, encoded: &str) -> Result<Vec<u8>, ConfigError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| ConfigError::Invalid(format!("{label}: invalid base64 key: {err}")))
}

// ============================================================================
// SECTION: Root
// ============================================================================

/// Returns true; serde default helper.
const fn default_true() -> bool {
    true
}

/// Root Intent Gate configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentGateConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Durable store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Queue and worker settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    /// Policy evaluator settings.
    #[serde(default)]
    pub policy: PolicySettings,
    /// Trust provider settings.
    #[serde(default)]
    pub trust: TrustConfig,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Chain signing settings.
    pub signing: SigningConfig,
}

impl IntentGateConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for I/O, parse, or validation failures.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_toml(&raw)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for parse or validation failures.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first defect found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::Invalid(format!("server.bind_addr: {err}")))?;
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue.max_attempts must be positive".to_string()));
        }
        if self.queue.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "queue.worker_concurrency must be positive".to_string(),
            ));
        }
        if self.queue.max_backoff_ms < self.queue.base_backoff_ms {
            return Err(ConfigError::Invalid(
                "queue.max_backoff_ms must not be below queue.base_backoff_ms".to_string(),
            ));
        }
        if self.lifecycle.dedupe_ttl_ms <= 0 {
            return Err(ConfigError::Invalid(
                "lifecycle.dedupe_ttl_ms must be positive".to_string(),
            ));
        }
        if self.lifecycle.tenant_concurrency_cap == 0 {
            return Err(ConfigError::Invalid(
                "lifecycle.tenant_concurrency_cap must be positive".to_string(),
            ));
        }
        if self.lifecycle.submit_rate_limit == 0 || self.lifecycle.submit_rate_window_ms <= 0 {
            return Err(ConfigError::Invalid(
                "lifecycle submission rate settings must be positive".to_string(),
            ));
        }
        if self.policy.cache_ttl_ms <= 0 {
            return Err(ConfigError::Invalid("policy.cache_ttl_ms must be positive".to_string()));
        }
        if self.scheduler.sweep_interval_ms == 0 || self.scheduler.sweep_interval_ms > 30_000 {
            return Err(ConfigError::Invalid(
                "scheduler.sweep_interval_ms must be within (0, 30000]".to_string(),
            ));
        }
        if self.scheduler.leader_ttl_ms <= 0 {
            return Err(ConfigError::Invalid(
                "scheduler.leader_ttl_ms must be positive".to_string(),
            ));
        }
        if let Some(endpoint) = self.trust.endpoint.as_deref() {
            Url::parse(endpoint)
                .map_err(|err| ConfigError::Invalid(format!("trust.endpoint: {err}")))?;
        }
        if self.trust.timeout_ms == 0 {
            return Err(ConfigError::Invalid("trust.timeout_ms must be positive".to_string()));
        }
        let key = self.signing.default_key()?;
        if key.is_empty() {
            return Err(ConfigError::Invalid(
                "signing.default_key_base64 must not be empty".to_string(),
            ));
        }
        let _ = self.signing.tenant_keys()?;
        Ok(())
    }
}
