// intent-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Tests for TOML loading, defaults, and validation bounds.
// ============================================================================
//! ## Overview
//! Validates that minimal configs boot with defaults, unknown fields are
//! rejected, and out-of-range settings fail validation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use intent_gate_config::ConfigError;
use intent_gate_config::IntentGateConfig;

/// Minimal config carrying only the required signing key.
const MINIMAL: &str = r#"
[signing]
default_key_base64 = "c2VjcmV0LXNpZ25pbmcta2V5"
"#;

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Tests a minimal config loads with defaults applied.
#[test]
fn test_minimal_config_loads_with_defaults() {
    let config = IntentGateConfig::from_toml(MINIMAL).unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    assert!(config.server.require_jti);
    assert_eq!(config.queue.max_attempts, 5);
    assert_eq!(config.policy.cache_ttl_ms, 60_000);
    assert_eq!(config.trust.timeout_ms, 2_000);
    assert!(config.trust.degraded_blocks_approval);
    assert_eq!(config.signing.default_key().unwrap(), b"secret-signing-key");
}

/// Tests unknown fields are rejected at parse time.
#[test]
fn test_unknown_fields_rejected() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[server]
bind_addr = "127.0.0.1:8080"
totally_unknown = true
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Parse(_))));
}

/// Tests the signing table is mandatory.
#[test]
fn test_signing_key_required() {
    assert!(matches!(IntentGateConfig::from_toml(""), Err(ConfigError::Parse(_))));
}

// ============================================================================
// SECTION: Validation Bounds
// ============================================================================

/// Tests an unparsable bind address fails validation.
#[test]
fn test_invalid_bind_addr_rejected() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[server]
bind_addr = "not-an-address"
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Invalid(_))));
}

/// Tests the sweep cadence ceiling of 30 seconds holds.
#[test]
fn test_sweep_interval_ceiling() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[scheduler]
sweep_interval_ms = 31000
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Invalid(_))));
}

/// Tests zero attempt budgets are rejected.
#[test]
fn test_zero_max_attempts_rejected() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[queue]
max_attempts = 0
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Invalid(_))));
}

/// Tests a backoff ceiling below the base is rejected.
#[test]
fn test_backoff_ceiling_ordering() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[queue]
base_backoff_ms = 1000
max_backoff_ms = 500
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Invalid(_))));
}

/// Tests a malformed trust endpoint is rejected.
#[test]
fn test_invalid_trust_endpoint_rejected() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[trust]
endpoint = "::not a url::"
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Invalid(_))));
}

/// Tests malformed base64 signing keys are rejected.
#[test]
fn test_invalid_signing_key_rejected() {
    let raw = r#"
[signing]
default_key_base64 = "%%%not-base64%%%"
"#;
    assert!(matches!(IntentGateConfig::from_toml(raw), Err(ConfigError::Invalid(_))));
}

/// Tests namespace routes and redaction paths round-trip.
#[test]
fn test_lifecycle_tables_parse() {
    let raw = r#"
[signing]
default_key_base64 = "c2VjcmV0"

[lifecycle]
redaction_paths = ["customer.ssn"]

[lifecycle.namespace_routes]
"write.finance" = "finance"
"#;
    let config = IntentGateConfig::from_toml(raw).unwrap();
    assert_eq!(config.lifecycle.redaction_paths, vec!["customer.ssn".to_string()]);
    assert_eq!(
        config.lifecycle.namespace_routes.get("write.finance"),
        Some(&"finance".to_string())
    );
}
