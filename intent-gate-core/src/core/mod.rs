// intent-gate-core/src/core/mod.rs
// ============================================================================
// Module: Intent Gate Core Types
// Description: Canonical Intent Gate schema and record structures.
// Purpose: Provide stable, serializable types for intents, policies,
//          escalations, and the audit chain.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the governed entities and their chained histories. These
//! types are the canonical source of truth for any derived API surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod escalation;
pub mod hashing;
pub mod identifiers;
pub mod intent;
pub mod notify;
pub mod policy;
pub mod principal;
pub mod time;
pub mod trust;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditActor;
pub use audit::AuditCategory;
pub use audit::AuditChainVerification;
pub use audit::AuditOutcome;
pub use audit::AuditQuery;
pub use audit::AuditRecord;
pub use audit::AuditSeverity;
pub use audit::AuditStats;
pub use audit::AuditTarget;
pub use audit::ChainCheckpoint;
pub use audit::PendingAuditRecord;
pub use escalation::Escalation;
pub use escalation::EscalationStatus;
pub use hashing::ChainSignature;
pub use hashing::GENESIS_PREVIOUS_HASH;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::SigningKeys;
pub use identifiers::AuditId;
pub use identifiers::EntityId;
pub use identifiers::EscalationId;
pub use identifiers::EventId;
pub use identifiers::IntentId;
pub use identifiers::JobId;
pub use identifiers::NamespaceId;
pub use identifiers::PolicyId;
pub use identifiers::PrincipalId;
pub use identifiers::RuleId;
pub use identifiers::TenantId;
pub use identifiers::TraceId;
pub use intent::ChainVerification;
pub use intent::EvaluationRecord;
pub use intent::EvaluationStage;
pub use intent::Intent;
pub use intent::IntentEvent;
pub use intent::IntentEventType;
pub use intent::IntentStatus;
pub use intent::MAX_CONTEXT_BYTES;
pub use intent::MAX_GOAL_CHARS;
pub use intent::MAX_PRIORITY;
pub use intent::PendingIntentEvent;
pub use notify::DeliveryKind;
pub use notify::DeliveryRecord;
pub use policy::Condition;
pub use policy::EscalationDirective;
pub use policy::Policy;
pub use policy::PolicyDefinition;
pub use policy::PolicyRule;
pub use policy::PolicyStatus;
pub use policy::PolicyTarget;
pub use policy::PolicyValidationError;
pub use policy::Predicate;
pub use policy::PredicateOp;
pub use policy::RuleAction;
pub use policy::RuleEffect;
pub use principal::Principal;
pub use principal::ROLE_ADMIN;
pub use principal::ROLE_APPROVER;
pub use principal::ROLE_AUDITOR;
pub use principal::ROLE_POLICY_WRITER;
pub use principal::ROLE_TENANT_ADMIN;
pub use self::time::Clock;
pub use self::time::ManualClock;
pub use self::time::SystemClock;
pub use self::time::Timestamp;
pub use trust::HistorySummary;
pub use trust::RequestMeta;
pub use trust::TenantProfile;
pub use trust::TrustSnapshot;
