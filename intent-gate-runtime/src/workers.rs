// intent-gate-runtime/src/workers.rs
// ============================================================================
// Module: Intent Gate Pipeline Workers
// Description: Intake and evaluate stage loops with retries and
//              cooperative cancellation.
// Purpose: Drive intents from submission to a governance decision through
//          the lifecycle service's compare-and-set transitions.
// Dependencies: intent-gate-core, crate::queue, rand, tokio, tracing
// ============================================================================

//! ## Overview
//! Workers are tokio tasks draining the stage channels. Each stage is
//! idempotent against retries: transitions are compare-and-set, so a crashed
//! or raced attempt conflicts benignly instead of double-applying. Trust
//! capture is bounded by a timeout and degrades instead of failing; policy
//! load or compile failures fail closed to a denial. Cancellation markers
//! are checked at stage entry and again before the decision is applied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use intent_gate_core::Clock;
use intent_gate_core::EntityId;
use intent_gate_core::EvaluationRecord;
use intent_gate_core::EvaluationStage;
use intent_gate_core::FastStore;
use intent_gate_core::HistorySummary;
use intent_gate_core::Intent;
use intent_gate_core::IntentStatus;
use intent_gate_core::Job;
use intent_gate_core::JobQueue;
use intent_gate_core::NotificationSink;
use intent_gate_core::QueueStage;
use intent_gate_core::RequestMeta;
use intent_gate_core::StoreError;
use intent_gate_core::TenantId;
use intent_gate_core::TenantProfile;
use intent_gate_core::TrustProvider;
use intent_gate_core::TrustSnapshot;
use intent_gate_core::core::notify::DeliveryKind;
use intent_gate_core::core::notify::DeliveryRecord;
use intent_gate_core::interfaces::GovernanceStore;
use intent_gate_core::runtime::DecisionApplied;
use intent_gate_core::runtime::EvaluationContext;
use intent_gate_core::runtime::EvaluatorOptions;
use intent_gate_core::runtime::LifecycleError;
use intent_gate_core::runtime::LifecycleService;
use intent_gate_core::runtime::OperationContext;
use intent_gate_core::runtime::PolicyDecision;
use intent_gate_core::runtime::PolicyService;
use intent_gate_core::runtime::evaluate;
use rand::Rng;
use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::queue::InProcessQueue;
use crate::queue::StageConsumer;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Worker runtime configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum delivery attempts per stage before dead-lettering.
    pub max_attempts: u32,
    /// Base retry backoff in milliseconds.
    pub base_backoff_ms: u64,
    /// Retry backoff ceiling in milliseconds.
    pub max_backoff_ms: u64,
    /// Worker tasks per stage.
    pub worker_concurrency: u32,
    /// Trust snapshot timeout in milliseconds.
    pub trust_timeout_ms: u64,
    /// Policy evaluation stage timeout in milliseconds.
    pub evaluation_timeout_ms: u64,
    /// History lookback window in milliseconds.
    pub history_window_ms: i64,
    /// Tenant profile surfaced to policy conditions.
    pub tenant_profile: TenantProfile,
    /// Evaluator options (null sentinel, strict default).
    pub evaluator: EvaluatorOptions,
    /// Test seam: when set, the evaluate stage parks here (one permit per
    /// decision) before its terminal write, so suites can race
    /// cancellation against a pending decision deterministically.
    pub evaluation_hold: Option<Arc<tokio::sync::Semaphore>>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 500,
            max_backoff_ms: 60_000,
            worker_concurrency: 4,
            trust_timeout_ms: 2_000,
            evaluation_timeout_ms: 5_000,
            history_window_ms: 3_600_000,
            tenant_profile: TenantProfile::default(),
            evaluator: EvaluatorOptions::default(),
            evaluation_hold: None,
        }
    }
}

// ============================================================================
// SECTION: Worker Context
// ============================================================================

/// Shared dependencies for every stage worker.
pub struct WorkerContext<S, F, C> {
    /// Lifecycle service driving transitions.
    pub lifecycle: Arc<LifecycleService<S, InProcessQueue, F, C>>,
    /// Policy service serving compiled published policies.
    pub policies: Arc<PolicyService<S, C>>,
    /// Storage backend for history and snapshot reads.
    pub store: Arc<S>,
    /// Pipeline queue for retries and stage hand-off.
    pub queue: InProcessQueue,
    /// Fast shared state for poison counters.
    pub fast: Arc<F>,
    /// External trust service.
    pub trust: Arc<dyn TrustProvider>,
    /// Notification fan-out hand-off.
    pub notify: Arc<dyn NotificationSink>,
    /// Clock seam.
    pub clock: C,
    /// Worker configuration.
    pub config: WorkerConfig,
}

/// Stage outcome used by the retry driver.
enum StageResult {
    /// Stage completed (or was benignly skipped).
    Done,
    /// Stage failed and may be retried.
    Retry(String),
}

impl<S, F, C> WorkerContext<S, F, C>
where
    S: GovernanceStore + Send + Sync + 'static,
    F: FastStore + 'static,
    C: Clock + Clone + 'static,
{
    /// Spawns the intake and evaluate worker pools.
    ///
    /// The decision stage is drained by downstream executors; its consumer
    /// is returned to the caller untouched.
    pub fn spawn(
        self: Arc<Self>,
        intake: StageConsumer,
        evaluate: StageConsumer,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        // Single consumer per stage feeding a small dispatch pool keeps
        // per-intent ordering: each job is handed to exactly one worker.
        let mut handles = Vec::new();
        handles.push(tokio::spawn(Arc::clone(&self).stage_loop(intake)));
        handles.push(tokio::spawn(self.stage_loop(evaluate)));
        handles
    }

    /// Drains one stage channel, dispatching jobs with bounded concurrency.
    async fn stage_loop(self: Arc<Self>, mut consumer: StageConsumer) {
        let stage = consumer.stage();
        let permits = Arc::new(tokio::sync::Semaphore::new(self.config.worker_concurrency as usize));
        while let Some(job) = consumer.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let ctx = Arc::clone(&self);
            tokio::spawn(async move {
                ctx.run_with_retry(stage, job).await;
                drop(permit);
            });
        }
        info!(stage = stage.as_str(), "stage channel closed; worker loop exiting");
    }

    /// Runs one job attempt and applies the retry policy on failure.
    async fn run_with_retry(&self, stage: QueueStage, job: Job) {
        let result = match stage {
            QueueStage::Intake => self.run_intake(&job).await,
            QueueStage::Evaluate => self.run_evaluate(&job).await,
            QueueStage::Decision => StageResult::Done,
        };
        let StageResult::Retry(error) = result else {
            return;
        };
        // Poison guard: a job that keeps coming back regardless of the
        // per-delivery attempt counter is cut off by the fast-store count.
        let poison_key = format!("attempts:{}:{}", job.tenant_id, job.intent_id);
        let total_attempts = self.fast.increment(&poison_key).unwrap_or(i64::MAX);
        if job.attempt >= self.config.max_attempts
            || total_attempts >= i64::from(self.config.max_attempts) * 3
        {
            warn!(
                intent = %job.intent_id,
                stage = stage.as_str(),
                attempt = job.attempt,
                error,
                "job exhausted retries; dead-lettering"
            );
            let tenant = job.tenant_id.clone();
            let intent_id = job.intent_id.clone();
            self.queue.dead_letter(stage, job, error);
            let op = OperationContext::system();
            // Surface a terminal failure so the submitter can replay.
            let _ = self.lifecycle.fail_intent(
                &tenant,
                &intent_id,
                stage_expected_status(stage),
                "retries-exhausted",
                &op,
            );
            return;
        }
        let mut next = job;
        next.attempt += 1;
        let delay = backoff_with_jitter(
            self.config.base_backoff_ms,
            self.config.max_backoff_ms,
            next.attempt,
        );
        warn!(
            intent = %next.intent_id,
            stage = stage.as_str(),
            attempt = next.attempt,
            delay_ms = delay,
            error,
            "stage failed; retrying with backoff"
        );
        let _ = self.queue.enqueue_delayed(stage, next, delay);
    }

    // ------------------------------------------------------------------
    // Intake stage
    // ------------------------------------------------------------------

    /// Intake: capture the trust snapshot and move `pending -> evaluating`.
    async fn run_intake(&self, job: &Job) -> StageResult {
        let tenant = &job.tenant_id;
        if self.observed_cancellation(tenant, job, "intake") {
            return StageResult::Done;
        }
        let intent = match self.lifecycle.get(tenant, &job.intent_id) {
            Ok(intent) => intent,
            Err(LifecycleError::NotFound(_)) => return StageResult::Done,
            Err(err) => return StageResult::Retry(err.to_string()),
        };
        if intent.status != IntentStatus::Pending {
            return StageResult::Done;
        }

        let started = self.clock.now();
        let snapshot = self.capture_snapshot(tenant, &intent.entity_id).await;
        let duration = self.clock.now().millis_since(started).max(0);
        let record = EvaluationRecord {
            intent_id: intent.id.clone(),
            tenant_id: tenant.clone(),
            stage: EvaluationStage::TrustSnapshot,
            result: json!({
                "trustLevel": snapshot.trust_level,
                "trustScore": snapshot.trust_score,
                "degraded": snapshot.degraded,
            }),
            duration_ms: duration.unsigned_abs(),
            policy_id: None,
            policy_version: None,
            created_at: self.clock.now(),
        };
        if let Err(err) = self.lifecycle.record_evaluation(&record) {
            return StageResult::Retry(err.to_string());
        }

        let op = OperationContext::system();
        match self.lifecycle.begin_evaluation(tenant, &intent.id, &snapshot, &op) {
            Ok(_) => {}
            // A cancel (or a duplicate delivery) won the race; nothing to do.
            Err(LifecycleError::Store(StoreError::StatusConflict { .. })) => {
                return StageResult::Done;
            }
            Err(err) => return StageResult::Retry(err.to_string()),
        }
        let mut next = job.clone();
        next.attempt = 1;
        match self.queue.enqueue(QueueStage::Evaluate, next) {
            Ok(()) => StageResult::Done,
            Err(err) => StageResult::Retry(err.to_string()),
        }
    }

    /// Captures a trust snapshot with the configured timeout, degrading on
    /// failure or timeout.
    async fn capture_snapshot(&self, tenant: &TenantId, entity: &EntityId) -> TrustSnapshot {
        let timeout = Duration::from_millis(self.config.trust_timeout_ms);
        match tokio::time::timeout(timeout, self.trust.snapshot(tenant, entity)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => {
                warn!(tenant = %tenant, entity = %entity, error = %err, "trust provider failed; degrading");
                TrustSnapshot::degraded_fallback(self.clock.now())
            }
            Err(_) => {
                warn!(tenant = %tenant, entity = %entity, "trust snapshot timed out; degrading");
                TrustSnapshot::degraded_fallback(self.clock.now())
            }
        }
    }

    // ------------------------------------------------------------------
    // Evaluate stage
    // ------------------------------------------------------------------

    /// Evaluate: build the context, run the policy engine, apply the
    /// decision.
    async fn run_evaluate(&self, job: &Job) -> StageResult {
        let tenant = &job.tenant_id;
        if self.observed_cancellation(tenant, job, "evaluate") {
            return StageResult::Done;
        }
        let intent = match self.lifecycle.get(tenant, &job.intent_id) {
            Ok(intent) => intent,
            Err(LifecycleError::NotFound(_)) => return StageResult::Done,
            Err(err) => return StageResult::Retry(err.to_string()),
        };
        if intent.status != IntentStatus::Evaluating {
            return StageResult::Done;
        }

        let snapshot = intent
            .trust_snapshot
            .clone()
            .and_then(|raw| serde_json::from_value::<TrustSnapshot>(raw).ok())
            .unwrap_or_else(|| TrustSnapshot::degraded_fallback(self.clock.now()));

        let basis_started = self.clock.now();
        let history = self
            .store
            .history_summary(
                tenant,
                &intent.entity_id,
                self.clock.now().plus_millis(-self.config.history_window_ms),
            )
            .unwrap_or_else(|_| HistorySummary::default());
        let context = EvaluationContext::assemble(
            &intent,
            &intent.entity_id,
            &snapshot,
            &self.config.tenant_profile,
            &history,
            &RequestMeta::default(),
            self.clock.now(),
        );
        let basis_record = EvaluationRecord {
            intent_id: intent.id.clone(),
            tenant_id: tenant.clone(),
            stage: EvaluationStage::Basis,
            result: json!({
                "namespace": job.namespace.as_str(),
                "recentIntents": history.recent_intents,
                "recentDenials": history.recent_denials,
            }),
            duration_ms: self.clock.now().millis_since(basis_started).unsigned_abs(),
            policy_id: None,
            policy_version: None,
            created_at: self.clock.now(),
        };
        if let Err(err) = self.lifecycle.record_evaluation(&basis_record) {
            return StageResult::Retry(err.to_string());
        }

        let policy_started = self.clock.now();
        let decision = match self.policies.published_compiled(tenant, &job.namespace, self.clock.now())
        {
            Ok(compiled) => {
                // Compiled trees are depth- and size-capped, so evaluation
                // is bounded by construction; the stage timeout is the
                // backstop the concurrency model requires.
                let options = self.config.evaluator.clone();
                let eval_context = context;
                let timeout = Duration::from_millis(self.config.evaluation_timeout_ms);
                let evaluated = tokio::time::timeout(
                    timeout,
                    tokio::task::spawn_blocking(move || {
                        evaluate(&compiled, &eval_context, &options)
                    }),
                )
                .await;
                match evaluated {
                    Ok(Ok(decision)) => decision,
                    Ok(Err(join)) => {
                        warn!(tenant = %tenant, error = %join, "evaluation task failed; failing closed");
                        PolicyDecision::policy_error()
                    }
                    Err(_) => {
                        warn!(tenant = %tenant, "evaluation timed out; failing closed");
                        PolicyDecision::policy_error()
                    }
                }
            }
            Err(err) => {
                warn!(tenant = %tenant, namespace = %job.namespace, error = ?err, "policy load failed; failing closed");
                PolicyDecision::policy_error()
            }
        };
        let policy_record = EvaluationRecord {
            intent_id: intent.id.clone(),
            tenant_id: tenant.clone(),
            stage: EvaluationStage::Policy,
            result: json!({
                "action": decision.action.as_str(),
                "reason": decision.reason,
                "ruleId": decision.matched_rule_id,
                "monitors": decision.monitors.len(),
            }),
            duration_ms: self.clock.now().millis_since(policy_started).unsigned_abs(),
            policy_id: decision.matched_policy_id.clone(),
            policy_version: decision.matched_policy_version,
            created_at: self.clock.now(),
        };
        if let Err(err) = self.lifecycle.record_evaluation(&policy_record) {
            return StageResult::Retry(err.to_string());
        }

        if let Some(hold) = &self.config.evaluation_hold {
            // A closed hold releases every parked evaluation.
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }

        // Final cancellation checkpoint before the terminal write.
        if self.observed_cancellation(tenant, job, "decision") {
            return StageResult::Done;
        }

        let op = OperationContext::system();
        let decision_started = self.clock.now();
        let applied = match self.lifecycle.apply_decision(
            tenant,
            &intent.id,
            &decision,
            snapshot.degraded,
            &op,
        ) {
            Ok(applied) => applied,
            Err(LifecycleError::Store(StoreError::StatusConflict { .. })) => {
                return StageResult::Done;
            }
            Err(err) => return StageResult::Retry(err.to_string()),
        };
        let decision_record = EvaluationRecord {
            intent_id: intent.id.clone(),
            tenant_id: tenant.clone(),
            stage: EvaluationStage::Decision,
            result: json!({"outcome": outcome_label(&applied)}),
            duration_ms: self.clock.now().millis_since(decision_started).unsigned_abs(),
            policy_id: decision.matched_policy_id.clone(),
            policy_version: decision.matched_policy_version,
            created_at: self.clock.now(),
        };
        if let Err(err) = self.lifecycle.record_evaluation(&decision_record) {
            return StageResult::Retry(err.to_string());
        }

        self.emit_notifications(&intent, &decision, &applied);
        StageResult::Done
    }

    /// Fire-and-forget notification emission for escalations and monitor
    /// signals.
    fn emit_notifications(
        &self,
        intent: &Intent,
        decision: &PolicyDecision,
        applied: &DecisionApplied,
    ) {
        let now = self.clock.now();
        let mut records = Vec::new();
        if let DecisionApplied::Escalated { escalation, .. } = applied {
            records.push(DeliveryRecord {
                kind: DeliveryKind::EscalationCreated,
                tenant_id: intent.tenant_id.clone(),
                intent_id: intent.id.clone(),
                recipient: escalation.escalated_to.clone(),
                subject: "Approval required".to_string(),
                body: json!({
                    "escalationId": escalation.id.as_str(),
                    "reason": escalation.reason,
                    "timeoutAt": escalation.timeout_at.as_unix_millis(),
                }),
                created_at: now,
            });
        }
        for monitor in &decision.monitors {
            records.push(DeliveryRecord {
                kind: DeliveryKind::MonitorSignal,
                tenant_id: intent.tenant_id.clone(),
                intent_id: intent.id.clone(),
                recipient: "observers".to_string(),
                subject: "Monitor signal".to_string(),
                body: json!({
                    "policyId": monitor.policy_id.as_str(),
                    "ruleId": monitor.rule_id.as_str(),
                    "reason": monitor.reason,
                }),
                created_at: now,
            });
        }
        for record in records {
            let sink = Arc::clone(&self.notify);
            tokio::spawn(async move {
                if let Err(err) = sink.deliver(&record).await {
                    warn!(error = %err, "notification delivery failed");
                }
            });
        }
    }

    /// Observes a cancellation marker, recording the aborted stage.
    fn observed_cancellation(&self, tenant: &TenantId, job: &Job, stage: &str) -> bool {
        match self.lifecycle.cancel_requested(tenant, &job.intent_id) {
            Ok(true) => {
                let _ = self.lifecycle.record_cancellation_observed(tenant, &job.intent_id, stage);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the status a stage expects its intent to be in.
const fn stage_expected_status(stage: QueueStage) -> IntentStatus {
    match stage {
        QueueStage::Intake => IntentStatus::Pending,
        QueueStage::Evaluate | QueueStage::Decision => IntentStatus::Evaluating,
    }
}

/// Returns a stable label for a decision outcome.
const fn outcome_label(applied: &DecisionApplied) -> &'static str {
    match applied {
        DecisionApplied::Approved(_) => "approved",
        DecisionApplied::Denied(_) => "denied",
        DecisionApplied::Escalated { .. } => "escalated",
    }
}

/// Exponential backoff with full jitter, capped at the ceiling.
fn backoff_with_jitter(base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let ceiling = base_ms.saturating_mul(1_u64 << exponent).min(max_ms).max(1);
    rand::thread_rng().gen_range(0..ceiling)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::*;

    /// Tests backoff stays within the exponential envelope and the ceiling.
    #[test]
    fn test_backoff_envelope() {
        for attempt in 1..12 {
            let delay = backoff_with_jitter(500, 60_000, attempt);
            assert!(delay < 60_000, "attempt {attempt} exceeded the ceiling: {delay}");
        }
        // First attempt draws from [0, base).
        for _ in 0..32 {
            assert!(backoff_with_jitter(500, 60_000, 1) < 500);
        }
    }

    /// Tests stage expectations match the pipeline hand-off statuses.
    #[test]
    fn test_stage_expected_status() {
        assert_eq!(stage_expected_status(QueueStage::Intake), IntentStatus::Pending);
        assert_eq!(stage_expected_status(QueueStage::Evaluate), IntentStatus::Evaluating);
    }
}
