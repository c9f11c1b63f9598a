// intent-gate-core/src/core/policy.rs
// ============================================================================
// Module: Intent Gate Policy Model
// Description: Versioned declarative policies, rule trees, and actions.
// Purpose: Provide stable, serializable policy definitions validated at
//          authoring time so evaluation never interprets malformed trees.
// Dependencies: crate::core::{hashing, identifiers, time}, regex, serde
// ============================================================================

//! ## Overview
//! Policies are versioned declarative rule sets scoped to
//! `(tenant, namespace, name)`. A definition carries an ordered rule list;
//! each rule pairs a boolean `when` tree with a `then` effect. Definitions are
//! validated on create/update and become immutable once published; further
//! changes mint a new version.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::NamespaceId;
use crate::core::identifiers::PolicyId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted regex pattern length for `matches` predicates.
pub const MAX_PATTERN_CHARS: usize = 512;

/// Compiled-size cap handed to the regex engine (bounds memory, keeps the
/// linear-time guarantee meaningful).
pub const MAX_PATTERN_COMPILED_BYTES: usize = 1 << 20;

/// Maximum condition tree depth accepted at validation.
pub const MAX_CONDITION_DEPTH: usize = 16;

// ============================================================================
// SECTION: Policy Status
// ============================================================================

/// Policy lifecycle status.
///
/// # Invariants
/// - At most one `Published` policy exists per `(tenant, namespace, name)`.
/// - Published definitions are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// Editable, not visible to the evaluator.
    Draft,
    /// Live and visible to the evaluator.
    Published,
    /// Retired from evaluation but queryable.
    Deprecated,
    /// Retained for history only.
    Archived,
}

impl PolicyStatus {
    /// Returns a stable label for metrics and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }
}

// ============================================================================
// SECTION: Rule Actions
// ============================================================================

/// Action emitted by a matching rule or a policy default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Authorize the intent.
    Allow,
    /// Refuse the intent.
    Deny,
    /// Route to a human approver.
    Escalate,
    /// Authorize with constraints attached.
    Limit,
    /// Record a side-effect signal without deciding.
    Monitor,
    /// Refuse and flag the submitting entity for review.
    Terminate,
}

impl RuleAction {
    /// Returns a stable label for metrics and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Escalate => "escalate",
            Self::Limit => "limit",
            Self::Monitor => "monitor",
            Self::Terminate => "terminate",
        }
    }

    /// Returns true when the action decides the intent (everything except
    /// `Monitor`, which only emits side effects).
    #[must_use]
    pub const fn is_deciding(self) -> bool {
        !matches!(self, Self::Monitor)
    }
}

/// Escalation directive attached to an `escalate` effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EscalationDirective {
    /// Role, group, or user the escalation is addressed to.
    pub to: String,
    /// Approval timeout in milliseconds.
    pub timeout_ms: i64,
    /// Whether the resolver must supply justification notes.
    #[serde(default)]
    pub require_justification: bool,
    /// Whether an unresolved escalation denies the intent at timeout.
    #[serde(default)]
    pub auto_deny_on_timeout: bool,
}

/// Effect applied when a rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEffect {
    /// Action to take.
    pub action: RuleAction,
    /// Reason string recorded with the decision.
    #[serde(default)]
    pub reason: Option<String>,
    /// Escalation directive; required when `action` is `Escalate`.
    #[serde(default)]
    pub escalation: Option<EscalationDirective>,
    /// Constraints attached to `Limit` (and surfaced to executors).
    #[serde(default)]
    pub constraints: Option<Value>,
}

// ============================================================================
// SECTION: Condition Trees
// ============================================================================

/// Leaf predicate operators over dotted context paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredicateOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-than-or-equal.
    Gte,
    /// Numeric less-than.
    Lt,
    /// Numeric less-than-or-equal.
    Lte,
    /// Membership in an array value.
    In,
    /// String or array containment.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Linear-time regular-expression match.
    Matches,
}

/// Leaf predicate of a condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    /// Dotted path into the evaluation context.
    pub field: String,
    /// Comparison operator.
    pub op: PredicateOp,
    /// Expected value.
    pub value: Value,
}

/// Recursive boolean condition tree.
///
/// # Invariants
/// - Serialized shape is `{"and": [...]}`, `{"or": [...]}`, `{"not": ...}`,
///   or a bare leaf predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Conjunction of child conditions.
    All {
        /// Children that must all hold.
        and: Vec<Condition>,
    },
    /// Disjunction of child conditions.
    Any {
        /// Children of which at least one must hold.
        or: Vec<Condition>,
    },
    /// Negation of a child condition.
    Not {
        /// Child condition to negate.
        not: Box<Condition>,
    },
    /// Leaf predicate.
    Leaf(Predicate),
}

// ============================================================================
// SECTION: Policy Definition
// ============================================================================

/// Target selector restricting which intents a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PolicyTarget {
    /// Intent types matched; empty matches every type.
    #[serde(default)]
    pub intent_types: Vec<String>,
}

impl PolicyTarget {
    /// Returns true when the target applies to the given intent type.
    #[must_use]
    pub fn matches(&self, intent_type: Option<&str>) -> bool {
        if self.intent_types.is_empty() {
            return true;
        }
        intent_type.is_some_and(|value| self.intent_types.iter().any(|entry| entry == value))
    }
}

/// Ordered rule inside a policy definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    /// Rule identifier, unique within the definition.
    pub id: RuleId,
    /// Evaluation order; lower evaluates first.
    pub priority: i32,
    /// Disabled rules never match.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Boolean condition tree.
    pub when: Condition,
    /// Effect applied on match.
    pub then: RuleEffect,
}

/// Returns the default for [`PolicyRule::enabled`].
const fn default_enabled() -> bool {
    true
}

/// Declarative policy definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PolicyDefinition {
    /// Target selector.
    #[serde(default)]
    pub target: PolicyTarget,
    /// Cross-policy evaluation order; lower evaluates first.
    #[serde(default)]
    pub priority: i32,
    /// Ordered rule list.
    pub rules: Vec<PolicyRule>,
    /// Action applied when no rule fires.
    pub default_action: RuleAction,
    /// Reason recorded with the default action.
    #[serde(default)]
    pub default_reason: Option<String>,
}

/// Versioned policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: PolicyId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Policy name, unique with namespace per tenant.
    pub name: String,
    /// Routing namespace.
    pub namespace: NamespaceId,
    /// Monotonic version per `(tenant, namespace, name)`.
    pub version: i64,
    /// Lifecycle status.
    pub status: PolicyStatus,
    /// Declarative definition.
    pub definition: PolicyDefinition,
    /// Canonical hash of the definition.
    pub checksum: HashDigest,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Policy validation errors.
#[derive(Debug, Error)]
pub enum PolicyValidationError {
    /// Definition has no rules and no usable default.
    #[error("policy definition must contain at least one rule or a default action")]
    Empty,
    /// Duplicate rule identifier.
    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),
    /// Escalate effect without a directive.
    #[error("rule {0} uses action escalate without an escalation directive")]
    MissingEscalation(String),
    /// Escalation timeout outside the accepted range.
    #[error("rule {0} escalation timeout must be positive")]
    InvalidEscalationTimeout(String),
    /// Condition tree exceeded the depth cap.
    #[error("condition tree exceeds maximum depth {MAX_CONDITION_DEPTH}")]
    TooDeep,
    /// Empty field path in a predicate.
    #[error("rule {0} predicate has an empty field path")]
    EmptyField(String),
    /// `in` predicate with a non-array expected value.
    #[error("rule {rule}: operator `in` requires an array value, found {found}")]
    InNeedsArray {
        /// Offending rule.
        rule: String,
        /// JSON type name found.
        found: &'static str,
    },
    /// `matches` predicate with a non-string or oversized pattern.
    #[error("rule {rule}: invalid matches pattern: {detail}")]
    InvalidPattern {
        /// Offending rule.
        rule: String,
        /// Failure detail from the regex compiler or size guard.
        detail: String,
    },
}

impl PolicyDefinition {
    /// Validates the definition for deterministic evaluation.
    ///
    /// Every condition that passes validation can later be evaluated without
    /// error; evaluation-time surprises are therefore limited to unresolved
    /// paths, which compare as the null sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyValidationError`] describing the first defect found.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        if self.rules.is_empty() && !self.default_action.is_deciding() {
            return Err(PolicyValidationError::Empty);
        }
        let mut seen = std::collections::BTreeSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str().to_string()) {
                return Err(PolicyValidationError::DuplicateRuleId(rule.id.to_string()));
            }
            if rule.then.action == RuleAction::Escalate {
                let directive = rule
                    .then
                    .escalation
                    .as_ref()
                    .ok_or_else(|| PolicyValidationError::MissingEscalation(rule.id.to_string()))?;
                if directive.timeout_ms <= 0 {
                    return Err(PolicyValidationError::InvalidEscalationTimeout(
                        rule.id.to_string(),
                    ));
                }
            }
            validate_condition(&rule.when, rule.id.as_str(), 0)?;
        }
        Ok(())
    }

    /// Computes the canonical checksum of the definition.
    ///
    /// # Errors
    ///
    /// Returns an error string when canonicalization fails.
    pub fn checksum(&self) -> Result<HashDigest, String> {
        hash_canonical_json(self).map_err(|err| err.to_string())
    }
}

/// Recursively validates a condition tree.
fn validate_condition(
    condition: &Condition,
    rule: &str,
    depth: usize,
) -> Result<(), PolicyValidationError> {
    if depth > MAX_CONDITION_DEPTH {
        return Err(PolicyValidationError::TooDeep);
    }
    match condition {
        Condition::All { and } => {
            for child in and {
                validate_condition(child, rule, depth + 1)?;
            }
            Ok(())
        }
        Condition::Any { or } => {
            for child in or {
                validate_condition(child, rule, depth + 1)?;
            }
            Ok(())
        }
        Condition::Not { not } => validate_condition(not, rule, depth + 1),
        Condition::Leaf(predicate) => validate_predicate(predicate, rule),
    }
}

/// Validates a leaf predicate.
fn validate_predicate(predicate: &Predicate, rule: &str) -> Result<(), PolicyValidationError> {
    if predicate.field.trim().is_empty() {
        return Err(PolicyValidationError::EmptyField(rule.to_string()));
    }
    match predicate.op {
        PredicateOp::In => {
            if !predicate.value.is_array() {
                return Err(PolicyValidationError::InNeedsArray {
                    rule: rule.to_string(),
                    found: json_type_name(&predicate.value),
                });
            }
            Ok(())
        }
        PredicateOp::Matches => {
            let Some(pattern) = predicate.value.as_str() else {
                return Err(PolicyValidationError::InvalidPattern {
                    rule: rule.to_string(),
                    detail: format!(
                        "pattern must be a string, found {}",
                        json_type_name(&predicate.value)
                    ),
                });
            };
            if pattern.chars().count() > MAX_PATTERN_CHARS {
                return Err(PolicyValidationError::InvalidPattern {
                    rule: rule.to_string(),
                    detail: format!("pattern exceeds {MAX_PATTERN_CHARS} characters"),
                });
            }
            regex::RegexBuilder::new(pattern)
                .size_limit(MAX_PATTERN_COMPILED_BYTES)
                .build()
                .map(|_| ())
                .map_err(|err| PolicyValidationError::InvalidPattern {
                    rule: rule.to_string(),
                    detail: err.to_string(),
                })
        }
        _ => Ok(()),
    }
}

/// Returns a stable JSON type name for error messages.
const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::*;

    /// Builds a minimal allow-everything definition.
    fn allow_all() -> PolicyDefinition {
        PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![],
            default_action: RuleAction::Allow,
            default_reason: Some("default".to_string()),
        }
    }

    /// Tests the condition tree deserializes the documented JSON shapes.
    #[test]
    fn test_condition_deserializes_documented_shapes() {
        let raw = json!({
            "and": [
                {"field": "intent.type", "op": "eq", "value": "read.public"},
                {"not": {"field": "entity.trustLevel", "op": "lt", "value": 2}}
            ]
        });
        let condition: Condition = serde_json::from_value(raw).unwrap();
        match condition {
            Condition::All { and } => assert_eq!(and.len(), 2),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    /// Tests escalate rules require a directive.
    #[test]
    fn test_escalate_requires_directive() {
        let mut definition = allow_all();
        definition.rules.push(PolicyRule {
            id: RuleId::new("r1"),
            priority: 0,
            enabled: true,
            when: Condition::Leaf(Predicate {
                field: "intent.type".to_string(),
                op: PredicateOp::Eq,
                value: json!("x"),
            }),
            then: RuleEffect {
                action: RuleAction::Escalate,
                reason: None,
                escalation: None,
                constraints: None,
            },
        });
        assert!(matches!(
            definition.validate(),
            Err(PolicyValidationError::MissingEscalation(_))
        ));
    }

    /// Tests `in` predicates demand array values.
    #[test]
    fn test_in_predicate_requires_array() {
        let mut definition = allow_all();
        definition.rules.push(PolicyRule {
            id: RuleId::new("r1"),
            priority: 0,
            enabled: true,
            when: Condition::Leaf(Predicate {
                field: "intent.type".to_string(),
                op: PredicateOp::In,
                value: json!("not-an-array"),
            }),
            then: RuleEffect {
                action: RuleAction::Deny,
                reason: None,
                escalation: None,
                constraints: None,
            },
        });
        assert!(matches!(definition.validate(), Err(PolicyValidationError::InNeedsArray { .. })));
    }

    /// Tests oversized regex patterns are rejected at authoring time.
    #[test]
    fn test_matches_pattern_size_cap() {
        let mut definition = allow_all();
        definition.rules.push(PolicyRule {
            id: RuleId::new("r1"),
            priority: 0,
            enabled: true,
            when: Condition::Leaf(Predicate {
                field: "intent.goal".to_string(),
                op: PredicateOp::Matches,
                value: json!("a".repeat(MAX_PATTERN_CHARS + 1)),
            }),
            then: RuleEffect {
                action: RuleAction::Deny,
                reason: None,
                escalation: None,
                constraints: None,
            },
        });
        assert!(matches!(
            definition.validate(),
            Err(PolicyValidationError::InvalidPattern { .. })
        ));
    }

    /// Tests checksum stability across rule field ordering in JSON.
    #[test]
    fn test_checksum_is_canonical() {
        let definition = allow_all();
        let first = definition.checksum().unwrap();
        let second = definition.checksum().unwrap();
        assert_eq!(first, second);
    }

    /// Tests the target selector matches by intent type.
    #[test]
    fn test_target_matching() {
        let open = PolicyTarget::default();
        assert!(open.matches(None));
        assert!(open.matches(Some("anything")));
        let narrow = PolicyTarget {
            intent_types: vec!["write.finance".to_string()],
        };
        assert!(narrow.matches(Some("write.finance")));
        assert!(!narrow.matches(Some("read.public")));
        assert!(!narrow.matches(None));
    }
}
