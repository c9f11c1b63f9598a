// intent-gate-config/src/lib.rs
// ============================================================================
// Module: Intent Gate Config Library
// Description: Public API surface for Intent Gate configuration.
// Purpose: Expose typed, validated deployment configuration.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Typed TOML configuration for Intent Gate deployments. Unknown fields are
//! rejected at parse time and cross-field constraints at validation time, so
//! a misconfigured instance refuses to start instead of running degraded.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::IntentGateConfig;
pub use config::LifecycleSettings;
pub use config::PolicySettings;
pub use config::QueueConfig;
pub use config::SchedulerConfig;
pub use config::ServerConfig;
pub use config::SigningConfig;
pub use config::StoreConfig;
pub use config::TrustConfig;
