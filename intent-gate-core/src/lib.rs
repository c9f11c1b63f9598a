// intent-gate-core/src/lib.rs
// ============================================================================
// Module: Intent Gate Core Library
// Description: Public API surface for the Intent Gate core.
// Purpose: Expose core types, interfaces, and runtime services.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Intent Gate core provides the multi-tenant intent lifecycle engine:
//! deterministic state-machine transitions, declarative policy evaluation,
//! human-in-the-loop escalation, and per-tenant hash-chained audit logging.
//! It is backend-agnostic and integrates through explicit interfaces rather
//! than embedding into storage or transport frameworks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use interfaces::AuditStore;
pub use interfaces::Cursor;
pub use interfaces::DeadLetterJob;
pub use interfaces::EscalationChange;
pub use interfaces::EscalationFilter;
pub use interfaces::EscalationReceipt;
pub use interfaces::EscalationStore;
pub use interfaces::FastStore;
pub use interfaces::FastStoreError;
pub use interfaces::GovernanceStore;
pub use interfaces::IntentChange;
pub use interfaces::IntentFilter;
pub use interfaces::IntentStore;
pub use interfaces::IntentTransition;
pub use interfaces::Job;
pub use interfaces::JobQueue;
pub use interfaces::MAX_PAGE_SIZE;
pub use interfaces::NotificationSink;
pub use interfaces::NotifyError;
pub use interfaces::Page;
pub use interfaces::PageRequest;
pub use interfaces::PolicyStore;
pub use interfaces::QueueDepths;
pub use interfaces::QueueError;
pub use interfaces::QueueStage;
pub use interfaces::RateDecision;
pub use interfaces::RevocationStore;
pub use interfaces::StoreError;
pub use interfaces::TrustError;
pub use interfaces::TrustProvider;
pub use interfaces::WriteReceipt;
pub use runtime::AuditLogger;
pub use runtime::EscalationService;
pub use runtime::InMemoryFastStore;
pub use runtime::InMemoryGovernanceStore;
pub use runtime::LifecycleService;
pub use runtime::PolicyCache;
pub use runtime::PolicyService;
