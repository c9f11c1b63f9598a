// intent-gate-core/src/runtime/evaluator.rs
// ============================================================================
// Module: Intent Gate Policy Evaluator
// Description: Compiled condition trees and deterministic policy evaluation.
// Purpose: Turn published declarative policies into allow/deny/escalate/
//          limit/monitor decisions over an evaluation context.
// Dependencies: crate::core, regex, serde_json
// ============================================================================

//! ## Overview
//! Policies are compiled once (at publish or cache load): condition trees are
//! parsed into typed nodes and `matches` patterns into linear-time regexes.
//! Evaluation then walks policies in deterministic order, `(priority asc,
//! version desc, id asc)` across policies and `priority asc` across rules,
//! and the first enabled rule whose condition holds wins. Unresolved field paths
//! compare as the configured null sentinel and never error; anything that
//! cannot be compiled fails closed before evaluation starts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use regex::Regex;
use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::EntityId;
use crate::core::EscalationDirective;
use crate::core::HistorySummary;
use crate::core::Intent;
use crate::core::NamespaceId;
use crate::core::Policy;
use crate::core::PolicyId;
use crate::core::PolicyTarget;
use crate::core::PolicyValidationError;
use crate::core::Predicate;
use crate::core::PredicateOp;
use crate::core::RuleAction;
use crate::core::RequestMeta;
use crate::core::RuleEffect;
use crate::core::RuleId;
use crate::core::TenantId;
use crate::core::TenantProfile;
use crate::core::Timestamp;
use crate::core::TrustSnapshot;
use crate::core::policy::Condition;
use crate::core::policy::MAX_PATTERN_COMPILED_BYTES;

// ============================================================================
// SECTION: Evaluation Context
// ============================================================================

/// Assembled evaluation context addressed by dotted field paths.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    /// Root JSON document the paths traverse.
    root: Value,
    /// Intent type, used for target matching.
    intent_type: Option<String>,
}

impl EvaluationContext {
    /// Assembles the context document from its sections.
    ///
    /// Section keys use the camelCase names policies address:
    /// `intent.type`, `entity.trustLevel`, `history.recentDenials`, ….
    #[must_use]
    pub fn assemble(
        intent: &Intent,
        entity: &EntityId,
        trust: &TrustSnapshot,
        tenant: &TenantProfile,
        history: &HistorySummary,
        request: &RequestMeta,
        now: Timestamp,
    ) -> Self {
        let millis = now.as_unix_millis();
        let hour = millis.div_euclid(3_600_000).rem_euclid(24);
        // Unix epoch (day 0) was a Thursday; 0 = Sunday in the exposed value.
        let day_of_week = (millis.div_euclid(86_400_000) + 4).rem_euclid(7);
        let root = json!({
            "intent": {
                "id": intent.id.as_str(),
                "type": intent.intent_type,
                "goal": intent.goal,
                "context": intent.context,
                "metadata": intent.metadata,
                "priority": intent.priority,
            },
            "entity": {
                "id": entity.as_str(),
                "trustLevel": trust.trust_level,
                "trustScore": trust.trust_score,
                "attributes": trust.attributes,
                "degraded": trust.degraded,
            },
            "tenant": {
                "id": intent.tenant_id.as_str(),
                "tier": tenant.tier,
                "features": tenant.features,
                "limits": tenant.limits,
            },
            "time": {
                "timestamp": millis,
                "hour": hour,
                "dayOfWeek": day_of_week,
            },
            "history": {
                "recentIntents": history.recent_intents,
                "recentDenials": history.recent_denials,
                "recentEscalations": history.recent_escalations,
                "lastIntentAt": history.last_intent_at.map(Timestamp::as_unix_millis),
            },
            "request": {
                "ip": request.ip,
                "userAgent": request.user_agent,
                "geo": request.geo,
            },
        });
        Self {
            root,
            intent_type: intent.intent_type.clone(),
        }
    }

    /// Resolves a dotted field path, or `None` when any segment is missing.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns the intent type used for target matching.
    #[must_use]
    pub fn intent_type(&self) -> Option<&str> {
        self.intent_type.as_deref()
    }
}

// ============================================================================
// SECTION: Compiled Policies
// ============================================================================

/// Compiled leaf predicate.
#[derive(Debug, Clone)]
enum CompiledPredicate {
    /// Any operator except `matches`, evaluated against the raw value.
    Plain {
        /// Dotted context path.
        field: String,
        /// Operator.
        op: PredicateOp,
        /// Expected value.
        value: Value,
    },
    /// `matches` with its pattern compiled ahead of time.
    Matches {
        /// Dotted context path.
        field: String,
        /// Compiled linear-time pattern.
        pattern: Regex,
    },
}

/// Compiled condition tree.
#[derive(Debug, Clone)]
enum CompiledCondition {
    /// Conjunction.
    All(Vec<CompiledCondition>),
    /// Disjunction.
    Any(Vec<CompiledCondition>),
    /// Negation.
    Not(Box<CompiledCondition>),
    /// Leaf predicate.
    Leaf(CompiledPredicate),
}

/// Compiled rule, ready for evaluation.
#[derive(Debug, Clone)]
struct CompiledRule {
    /// Rule identifier.
    id: RuleId,
    /// Evaluation order.
    priority: i32,
    /// Disabled rules never match.
    enabled: bool,
    /// Compiled condition tree.
    when: CompiledCondition,
    /// Effect on match.
    effect: RuleEffect,
}

/// Compiled policy, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    /// Policy identifier.
    id: PolicyId,
    /// Policy version.
    version: i64,
    /// Cross-policy evaluation order.
    priority: i32,
    /// Target selector.
    target: PolicyTarget,
    /// Rules sorted by `(priority asc, id asc)`.
    rules: Vec<CompiledRule>,
    /// Default action when no rule fires.
    default_action: RuleAction,
    /// Default reason.
    default_reason: Option<String>,
}

impl CompiledPolicy {
    /// Compiles a policy definition, validating it first.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyValidationError`] when the definition cannot be
    /// evaluated deterministically.
    pub fn compile(policy: &Policy) -> Result<Self, PolicyValidationError> {
        policy.definition.validate()?;
        let mut rules = Vec::with_capacity(policy.definition.rules.len());
        for rule in &policy.definition.rules {
            rules.push(CompiledRule {
                id: rule.id.clone(),
                priority: rule.priority,
                enabled: rule.enabled,
                when: compile_condition(&rule.when, rule.id.as_str())?,
                effect: rule.then.clone(),
            });
        }
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(Self {
            id: policy.id.clone(),
            version: policy.version,
            priority: policy.definition.priority,
            target: policy.definition.target.clone(),
            rules,
            default_action: policy.definition.default_action,
            default_reason: policy.definition.default_reason.clone(),
        })
    }

    /// Returns the policy identifier.
    #[must_use]
    pub const fn id(&self) -> &PolicyId {
        &self.id
    }

    /// Returns the policy version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }
}

/// Compiles a condition tree.
fn compile_condition(
    condition: &Condition,
    rule: &str,
) -> Result<CompiledCondition, PolicyValidationError> {
    match condition {
        Condition::All { and } => Ok(CompiledCondition::All(
            and.iter().map(|child| compile_condition(child, rule)).collect::<Result<_, _>>()?,
        )),
        Condition::Any { or } => Ok(CompiledCondition::Any(
            or.iter().map(|child| compile_condition(child, rule)).collect::<Result<_, _>>()?,
        )),
        Condition::Not { not } => {
            Ok(CompiledCondition::Not(Box::new(compile_condition(not, rule)?)))
        }
        Condition::Leaf(predicate) => compile_predicate(predicate, rule).map(CompiledCondition::Leaf),
    }
}

/// Compiles a leaf predicate.
fn compile_predicate(
    predicate: &Predicate,
    rule: &str,
) -> Result<CompiledPredicate, PolicyValidationError> {
    if predicate.op == PredicateOp::Matches {
        let Some(pattern) = predicate.value.as_str() else {
            return Err(PolicyValidationError::InvalidPattern {
                rule: rule.to_string(),
                detail: "pattern must be a string".to_string(),
            });
        };
        let compiled = RegexBuilder::new(pattern)
            .size_limit(MAX_PATTERN_COMPILED_BYTES)
            .build()
            .map_err(|err| PolicyValidationError::InvalidPattern {
                rule: rule.to_string(),
                detail: err.to_string(),
            })?;
        return Ok(CompiledPredicate::Matches {
            field: predicate.field.clone(),
            pattern: compiled,
        });
    }
    Ok(CompiledPredicate::Plain {
        field: predicate.field.clone(),
        op: predicate.op,
        value: predicate.value.clone(),
    })
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Monitor side-effect signal collected during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSignal {
    /// Emitting policy.
    pub policy_id: PolicyId,
    /// Emitting rule.
    pub rule_id: RuleId,
    /// Signal reason.
    pub reason: Option<String>,
}

/// Result of evaluating the policy set against a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Deciding action.
    pub action: RuleAction,
    /// Decision reason.
    pub reason: String,
    /// Policy that decided, when one matched.
    pub matched_policy_id: Option<PolicyId>,
    /// Version of the deciding policy.
    pub matched_policy_version: Option<i64>,
    /// Rule that decided, when a rule (not a default) fired.
    pub matched_rule_id: Option<RuleId>,
    /// Constraints attached by a `limit` effect.
    pub constraints: Option<Value>,
    /// Escalation directive attached by an `escalate` effect.
    pub escalation: Option<EscalationDirective>,
    /// Collected monitor signals.
    pub monitors: Vec<MonitorSignal>,
}

impl PolicyDecision {
    /// Builds the fail-closed decision used when evaluation cannot run.
    #[must_use]
    pub fn policy_error() -> Self {
        Self {
            action: RuleAction::Deny,
            reason: "policy-error".to_string(),
            matched_policy_id: None,
            matched_policy_version: None,
            matched_rule_id: None,
            constraints: None,
            escalation: None,
            monitors: Vec::new(),
        }
    }
}

/// Evaluator configuration.
#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    /// Value unresolved field paths compare as.
    pub null_sentinel: Value,
    /// Action returned when no policy's target matches.
    pub unmatched_action: RuleAction,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        // Strict mode: an unmatched context is denied.
        Self {
            null_sentinel: Value::Null,
            unmatched_action: RuleAction::Deny,
        }
    }
}

/// Evaluates compiled policies against a context.
///
/// Policies are walked in `(priority asc, version desc, id asc)` order; the
/// first deciding (non-`monitor`) outcome wins. `monitor` outcomes are
/// collected onto the winning decision.
#[must_use]
pub fn evaluate(
    policies: &[CompiledPolicy],
    ctx: &EvaluationContext,
    options: &EvaluatorOptions,
) -> PolicyDecision {
    let mut ordered: Vec<&CompiledPolicy> = policies.iter().collect();
    ordered.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.version.cmp(&a.version))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut monitors = Vec::new();
    let mut decision: Option<PolicyDecision> = None;
    let mut any_target_matched = false;

    for policy in ordered {
        if !policy.target.matches(ctx.intent_type()) {
            continue;
        }
        any_target_matched = true;
        let outcome = evaluate_policy(policy, ctx, options);
        match outcome {
            PolicyOutcome::Monitor(signal) => monitors.push(signal),
            PolicyOutcome::Decided(found) => {
                decision = Some(found);
                break;
            }
        }
    }

    let mut result = decision.unwrap_or_else(|| PolicyDecision {
        action: options.unmatched_action,
        reason: if any_target_matched {
            "default-action".to_string()
        } else {
            "no-policy-matched".to_string()
        },
        matched_policy_id: None,
        matched_policy_version: None,
        matched_rule_id: None,
        constraints: None,
        escalation: None,
        monitors: Vec::new(),
    });
    result.monitors = monitors;
    result
}

/// Outcome of evaluating one policy.
enum PolicyOutcome {
    /// The policy decided the intent.
    Decided(PolicyDecision),
    /// The policy only emitted a monitor signal.
    Monitor(MonitorSignal),
}

/// Evaluates a single policy: first enabled truthy rule wins, default action
/// otherwise.
fn evaluate_policy(
    policy: &CompiledPolicy,
    ctx: &EvaluationContext,
    options: &EvaluatorOptions,
) -> PolicyOutcome {
    for rule in &policy.rules {
        if !rule.enabled {
            continue;
        }
        if !evaluate_condition(&rule.when, ctx, options) {
            continue;
        }
        if rule.effect.action.is_deciding() {
            return PolicyOutcome::Decided(PolicyDecision {
                action: rule.effect.action,
                reason: rule
                    .effect
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("rule:{}", rule.id)),
                matched_policy_id: Some(policy.id.clone()),
                matched_policy_version: Some(policy.version),
                matched_rule_id: Some(rule.id.clone()),
                constraints: rule.effect.constraints.clone(),
                escalation: rule.effect.escalation.clone(),
                monitors: Vec::new(),
            });
        }
        return PolicyOutcome::Monitor(MonitorSignal {
            policy_id: policy.id.clone(),
            rule_id: rule.id.clone(),
            reason: rule.effect.reason.clone(),
        });
    }
    if policy.default_action.is_deciding() {
        return PolicyOutcome::Decided(PolicyDecision {
            action: policy.default_action,
            reason: policy.default_reason.clone().unwrap_or_else(|| "default-action".to_string()),
            matched_policy_id: Some(policy.id.clone()),
            matched_policy_version: Some(policy.version),
            matched_rule_id: None,
            constraints: None,
            escalation: None,
            monitors: Vec::new(),
        });
    }
    PolicyOutcome::Monitor(MonitorSignal {
        policy_id: policy.id.clone(),
        rule_id: RuleId::new("default"),
        reason: policy.default_reason.clone(),
    })
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates a compiled condition tree.
fn evaluate_condition(
    condition: &CompiledCondition,
    ctx: &EvaluationContext,
    options: &EvaluatorOptions,
) -> bool {
    match condition {
        CompiledCondition::All(children) => {
            children.iter().all(|child| evaluate_condition(child, ctx, options))
        }
        CompiledCondition::Any(children) => {
            children.iter().any(|child| evaluate_condition(child, ctx, options))
        }
        CompiledCondition::Not(child) => !evaluate_condition(child, ctx, options),
        CompiledCondition::Leaf(predicate) => evaluate_predicate(predicate, ctx, options),
    }
}

/// Evaluates a compiled leaf predicate; type mismatches are falsey, never
/// errors.
fn evaluate_predicate(
    predicate: &CompiledPredicate,
    ctx: &EvaluationContext,
    options: &EvaluatorOptions,
) -> bool {
    match predicate {
        CompiledPredicate::Matches { field, pattern } => {
            let resolved = ctx.resolve(field).unwrap_or(&options.null_sentinel);
            resolved.as_str().is_some_and(|text| pattern.is_match(text))
        }
        CompiledPredicate::Plain { field, op, value } => {
            let resolved = ctx.resolve(field).unwrap_or(&options.null_sentinel);
            evaluate_plain(*op, resolved, value)
        }
    }
}

/// Evaluates the non-regex operators.
fn evaluate_plain(op: PredicateOp, actual: &Value, expected: &Value) -> bool {
    match op {
        PredicateOp::Eq => json_equal(actual, expected),
        PredicateOp::Ne => !json_equal(actual, expected),
        PredicateOp::Gt | PredicateOp::Gte | PredicateOp::Lt | PredicateOp::Lte => {
            compare_numbers(op, actual, expected)
        }
        PredicateOp::In => expected.as_array().is_some_and(|set| set.iter().any(|item| json_equal(actual, item))),
        PredicateOp::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
            (Value::Array(haystack), needle) => haystack.iter().any(|item| json_equal(item, needle)),
            _ => false,
        },
        PredicateOp::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(prefix)) => text.starts_with(prefix),
            _ => false,
        },
        PredicateOp::EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(suffix)) => text.ends_with(suffix),
            _ => false,
        },
        PredicateOp::Matches => false,
    }
}

/// JSON equality with numeric coercion (`1` equals `1.0`).
fn json_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => left == right,
    }
}

/// Numeric ordering comparison; non-numeric operands are falsey.
fn compare_numbers(op: PredicateOp, actual: &Value, expected: &Value) -> bool {
    let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) else {
        return false;
    };
    match op {
        PredicateOp::Gt => a > b,
        PredicateOp::Gte => a >= b,
        PredicateOp::Lt => a < b,
        PredicateOp::Lte => a <= b,
        _ => false,
    }
}

// ============================================================================
// SECTION: Policy Cache
// ============================================================================

/// Cached compiled policy set for one `(tenant, namespace)`.
struct CacheSlot {
    /// Compiled policies.
    policies: std::sync::Arc<Vec<CompiledPolicy>>,
    /// Load time for TTL expiry.
    loaded_at: Timestamp,
}

/// In-process compiled-policy cache with TTL and explicit invalidation.
///
/// Correctness does not depend on invalidation: a published policy is visible
/// no later than `ttl_ms` after publish.
pub struct PolicyCache {
    /// Cache TTL in milliseconds.
    ttl_ms: i64,
    /// Slots keyed by `(tenant, namespace)`.
    slots: std::sync::Mutex<BTreeMap<(TenantId, NamespaceId), CacheSlot>>,
}

impl PolicyCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub const fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            slots: std::sync::Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns compiled published policies, loading through `load` on miss or
    /// expiry.
    ///
    /// # Errors
    ///
    /// Propagates load or compile failures; callers fail closed on them.
    pub fn published<E>(
        &self,
        tenant: &TenantId,
        namespace: &NamespaceId,
        now: Timestamp,
        load: impl FnOnce() -> Result<Vec<Policy>, E>,
    ) -> Result<std::sync::Arc<Vec<CompiledPolicy>>, PolicyCacheError<E>> {
        if let Ok(slots) = self.slots.lock()
            && let Some(slot) = slots.get(&(tenant.clone(), namespace.clone()))
            && now.millis_since(slot.loaded_at) < self.ttl_ms
        {
            return Ok(std::sync::Arc::clone(&slot.policies));
        }
        let raw = load().map_err(PolicyCacheError::Load)?;
        let mut compiled = Vec::with_capacity(raw.len());
        for policy in &raw {
            compiled.push(CompiledPolicy::compile(policy).map_err(PolicyCacheError::Compile)?);
        }
        let shared = std::sync::Arc::new(compiled);
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(
                (tenant.clone(), namespace.clone()),
                CacheSlot {
                    policies: std::sync::Arc::clone(&shared),
                    loaded_at: now,
                },
            );
        }
        Ok(shared)
    }

    /// Drops the cached slot for `(tenant, namespace)`.
    pub fn invalidate(&self, tenant: &TenantId, namespace: &NamespaceId) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&(tenant.clone(), namespace.clone()));
        }
    }
}

/// Cache load failures.
#[derive(Debug)]
pub enum PolicyCacheError<E> {
    /// Backing store load failed.
    Load(E),
    /// A stored policy failed compilation.
    Compile(PolicyValidationError),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::*;
    use crate::core::HashDigest;
    use crate::core::IntentId;
    use crate::core::IntentStatus;
    use crate::core::PolicyDefinition;
    use crate::core::PolicyRule;
    use crate::core::PolicyStatus;

    /// Builds a published policy around the given definition.
    fn policy(id: &str, version: i64, definition: PolicyDefinition) -> Policy {
        let checksum = definition.checksum().unwrap();
        Policy {
            id: PolicyId::new(id),
            tenant_id: TenantId::new("t-1"),
            name: id.to_string(),
            namespace: NamespaceId::default_namespace(),
            version,
            status: PolicyStatus::Published,
            checksum,
            definition,
            created_at: Timestamp::from_unix_millis(0),
            updated_at: Timestamp::from_unix_millis(0),
        }
    }

    /// Builds a rule with the given condition and action.
    fn rule(id: &str, priority: i32, when: Condition, action: RuleAction) -> PolicyRule {
        PolicyRule {
            id: RuleId::new(id),
            priority,
            enabled: true,
            when,
            then: RuleEffect {
                action,
                reason: Some(format!("reason:{id}")),
                escalation: if action == RuleAction::Escalate {
                    Some(EscalationDirective {
                        to: "data-gov".to_string(),
                        timeout_ms: 3_600_000,
                        require_justification: false,
                        auto_deny_on_timeout: true,
                    })
                } else {
                    None
                },
                constraints: None,
            },
        }
    }

    /// Builds a leaf condition.
    fn leaf(field: &str, op: PredicateOp, value: Value) -> Condition {
        Condition::Leaf(Predicate {
            field: field.to_string(),
            op,
            value,
        })
    }

    /// Builds an intent with the given type and context.
    fn intent(intent_type: Option<&str>, context: Value) -> Intent {
        Intent {
            id: IntentId::new("i-1"),
            tenant_id: TenantId::new("t-1"),
            entity_id: EntityId::new("e-1"),
            goal: "read public weather".to_string(),
            intent_type: intent_type.map(str::to_string),
            priority: 0,
            context,
            metadata: BTreeMap::new(),
            status: IntentStatus::Evaluating,
            trust_snapshot: None,
            trust_level: None,
            trust_score: None,
            policy_version: None,
            dedupe_hash: HashDigest::from_hex("d"),
            idempotency_key: None,
            cancellation_reason: None,
            created_at: Timestamp::from_unix_millis(0),
            updated_at: Timestamp::from_unix_millis(0),
            evaluated_at: None,
            decided_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }

    /// Assembles a context for the given intent.
    fn context_for(intent: &Intent) -> EvaluationContext {
        EvaluationContext::assemble(
            intent,
            &intent.entity_id,
            &TrustSnapshot {
                trust_level: 3,
                trust_score: 0.8,
                attributes: BTreeMap::new(),
                degraded: false,
                captured_at: Timestamp::from_unix_millis(0),
            },
            &TenantProfile::default(),
            &HistorySummary::default(),
            &RequestMeta::default(),
            Timestamp::from_unix_millis(1_700_000_000_000),
        )
    }

    /// Tests the first matching rule decides (auto-approve scenario).
    #[test]
    fn test_first_matching_rule_decides() {
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![rule(
                "allow-public",
                0,
                leaf("intent.type", PredicateOp::Eq, json!("read.public")),
                RuleAction::Allow,
            )],
            default_action: RuleAction::Deny,
            default_reason: None,
        };
        let compiled = CompiledPolicy::compile(&policy("allow-public-reads", 1, definition)).unwrap();
        let subject = intent(Some("read.public"), json!({}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Allow);
        assert_eq!(decision.matched_rule_id, Some(RuleId::new("allow-public")));
        assert_eq!(decision.matched_policy_version, Some(1));
    }

    /// Tests the policy default fires when no rule matches (deny-by-default
    /// scenario).
    #[test]
    fn test_default_action_applies() {
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![rule(
                "allow-public",
                0,
                leaf("intent.type", PredicateOp::Eq, json!("read.public")),
                RuleAction::Allow,
            )],
            default_action: RuleAction::Deny,
            default_reason: Some("default-action".to_string()),
        };
        let compiled = CompiledPolicy::compile(&policy("p", 1, definition)).unwrap();
        let subject = intent(Some("write.finance"), json!({}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Deny);
        assert_eq!(decision.reason, "default-action");
        assert_eq!(decision.matched_rule_id, None);
    }

    /// Tests numeric threshold escalation (escalate-on-threshold scenario).
    #[test]
    fn test_threshold_escalation() {
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![rule(
                "large-export",
                0,
                leaf("intent.context.recordCount", PredicateOp::Gt, json!(10_000)),
                RuleAction::Escalate,
            )],
            default_action: RuleAction::Allow,
            default_reason: None,
        };
        let compiled = CompiledPolicy::compile(&policy("p", 1, definition)).unwrap();
        let subject = intent(Some("data.export"), json!({"recordCount": 50_000}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Escalate);
        let directive = decision.escalation.unwrap();
        assert_eq!(directive.to, "data-gov");
        assert!(directive.auto_deny_on_timeout);
    }

    /// Tests no-target-match falls back to the strict global default.
    #[test]
    fn test_unmatched_target_denies_in_strict_mode() {
        let definition = PolicyDefinition {
            target: PolicyTarget {
                intent_types: vec!["read.public".to_string()],
            },
            priority: 0,
            rules: vec![],
            default_action: RuleAction::Allow,
            default_reason: None,
        };
        let compiled = CompiledPolicy::compile(&policy("p", 1, definition)).unwrap();
        let subject = intent(Some("write.finance"), json!({}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Deny);
        assert_eq!(decision.reason, "no-policy-matched");
    }

    /// Tests unresolved paths compare as the null sentinel instead of
    /// erroring.
    #[test]
    fn test_unresolved_path_uses_sentinel() {
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![rule(
                "null-check",
                0,
                leaf("intent.context.missing.deep", PredicateOp::Eq, json!(null)),
                RuleAction::Deny,
            )],
            default_action: RuleAction::Allow,
            default_reason: None,
        };
        let compiled = CompiledPolicy::compile(&policy("p", 1, definition)).unwrap();
        let subject = intent(Some("x"), json!({}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Deny);
    }

    /// Tests monitor actions collect as side effects while a later policy
    /// decides.
    #[test]
    fn test_monitor_actions_collect() {
        let monitor_def = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![rule(
                "watch",
                0,
                leaf("intent.type", PredicateOp::StartsWith, json!("read.")),
                RuleAction::Monitor,
            )],
            default_action: RuleAction::Monitor,
            default_reason: None,
        };
        let allow_def = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 1,
            rules: vec![],
            default_action: RuleAction::Allow,
            default_reason: None,
        };
        let compiled = vec![
            CompiledPolicy::compile(&policy("watcher", 1, monitor_def)).unwrap(),
            CompiledPolicy::compile(&policy("allower", 1, allow_def)).unwrap(),
        ];
        let subject = intent(Some("read.public"), json!({}));
        let decision = evaluate(&compiled, &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Allow);
        assert_eq!(decision.monitors.len(), 1);
        assert_eq!(decision.monitors[0].rule_id, RuleId::new("watch"));
    }

    /// Tests policy ordering: lower priority evaluates first; version breaks
    /// ties downward.
    #[test]
    fn test_policy_ordering() {
        let deny_def = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![],
            default_action: RuleAction::Deny,
            default_reason: Some("first".to_string()),
        };
        let allow_def = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 5,
            rules: vec![],
            default_action: RuleAction::Allow,
            default_reason: Some("second".to_string()),
        };
        let compiled = vec![
            CompiledPolicy::compile(&policy("b-allow", 1, allow_def)).unwrap(),
            CompiledPolicy::compile(&policy("a-deny", 2, deny_def)).unwrap(),
        ];
        let subject = intent(Some("x"), json!({}));
        let decision = evaluate(&compiled, &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.reason, "first");
    }

    /// Tests disabled rules never match.
    #[test]
    fn test_disabled_rules_skip() {
        let mut disabled = rule(
            "off",
            0,
            leaf("intent.type", PredicateOp::Eq, json!("x")),
            RuleAction::Deny,
        );
        disabled.enabled = false;
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![disabled],
            default_action: RuleAction::Allow,
            default_reason: None,
        };
        let compiled = CompiledPolicy::compile(&policy("p", 1, definition)).unwrap();
        let subject = intent(Some("x"), json!({}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Allow);
    }

    /// Tests regex matching with the precompiled pattern.
    #[test]
    fn test_matches_predicate() {
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![rule(
                "goal-guard",
                0,
                leaf("intent.goal", PredicateOp::Matches, json!("^read [a-z ]+$")),
                RuleAction::Allow,
            )],
            default_action: RuleAction::Deny,
            default_reason: None,
        };
        let compiled = CompiledPolicy::compile(&policy("p", 1, definition)).unwrap();
        let subject = intent(Some("read.public"), json!({}));
        let decision = evaluate(&[compiled], &context_for(&subject), &EvaluatorOptions::default());
        assert_eq!(decision.action, RuleAction::Allow);
    }

    /// Tests cache TTL expiry reloads and invalidation drops the slot.
    #[test]
    fn test_policy_cache_ttl_and_invalidation() {
        let cache = PolicyCache::new(60_000);
        let tenant = TenantId::new("t-1");
        let namespace = NamespaceId::default_namespace();
        let definition = PolicyDefinition {
            target: PolicyTarget::default(),
            priority: 0,
            rules: vec![],
            default_action: RuleAction::Allow,
            default_reason: None,
        };
        let stored = policy("p", 1, definition);

        let mut loads = 0;
        let _first = cache
            .published::<()>(&tenant, &namespace, Timestamp::from_unix_millis(0), || {
                loads += 1;
                Ok(vec![stored.clone()])
            })
            .unwrap();
        let _second = cache
            .published::<()>(&tenant, &namespace, Timestamp::from_unix_millis(30_000), || {
                loads += 1;
                Ok(vec![stored.clone()])
            })
            .unwrap();
        assert_eq!(loads, 1, "warm cache must not reload");

        cache.invalidate(&tenant, &namespace);
        let _third = cache
            .published::<()>(&tenant, &namespace, Timestamp::from_unix_millis(31_000), || {
                loads += 1;
                Ok(vec![stored.clone()])
            })
            .unwrap();
        assert_eq!(loads, 2, "invalidation must force a reload");
    }
}
