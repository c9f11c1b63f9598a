// intent-gate-server/src/telemetry.rs
// ============================================================================
// Module: Server Telemetry
// Description: Prometheus counters, histograms, and gauges for the API and
//              pipeline.
// Purpose: Expose submission/decision/escalation/revocation metrics and
//          queue depths at `/metrics`.
// Dependencies: prometheus, intent-gate-core
// ============================================================================

//! ## Overview
//! One registry per process. Labels stay low-cardinality: actions, stages,
//! and outcomes only, never tenant or intent identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use intent_gate_core::QueueDepths;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency buckets in seconds for stage histograms.
const LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Server metrics handle.
#[derive(Clone)]
pub struct Metrics {
    /// Backing registry.
    registry: Registry,
    /// Submissions by outcome (`created`, `deduped`, `rejected`).
    submissions: IntCounterVec,
    /// Decisions by action.
    decisions: IntCounterVec,
    /// Stage latencies in seconds.
    stage_latency: HistogramVec,
    /// Escalation transitions by outcome.
    escalations: IntCounterVec,
    /// Revocation check outcomes.
    revocation_checks: IntCounterVec,
    /// Queue depth gauges.
    queue_intake: IntGauge,
    /// Evaluate backlog gauge.
    queue_evaluate: IntGauge,
    /// Decision backlog gauge.
    queue_decision: IntGauge,
    /// Dead-letter backlog gauge.
    queue_dead_letter: IntGauge,
}

impl Metrics {
    /// Creates and registers the metric families.
    ///
    /// # Errors
    ///
    /// Returns a prometheus error when registration fails (duplicate
    /// registry use).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let submissions = IntCounterVec::new(
            Opts::new("intent_gate_submissions_total", "Intent submissions by outcome"),
            &["outcome"],
        )?;
        let decisions = IntCounterVec::new(
            Opts::new("intent_gate_decisions_total", "Governance decisions by action"),
            &["action"],
        )?;
        let stage_latency = HistogramVec::new(
            HistogramOpts::new("intent_gate_stage_seconds", "Pipeline stage latency")
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["stage"],
        )?;
        let escalations = IntCounterVec::new(
            Opts::new("intent_gate_escalations_total", "Escalation transitions by outcome"),
            &["outcome"],
        )?;
        let revocation_checks = IntCounterVec::new(
            Opts::new("intent_gate_revocation_checks_total", "Token revocation checks"),
            &["outcome"],
        )?;
        let queue_intake =
            IntGauge::new("intent_gate_queue_intake_depth", "Intake stage backlog")?;
        let queue_evaluate =
            IntGauge::new("intent_gate_queue_evaluate_depth", "Evaluate stage backlog")?;
        let queue_decision =
            IntGauge::new("intent_gate_queue_decision_depth", "Decision stage backlog")?;
        let queue_dead_letter =
            IntGauge::new("intent_gate_queue_dead_letter_depth", "Dead-letter backlog")?;

        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(stage_latency.clone()))?;
        registry.register(Box::new(escalations.clone()))?;
        registry.register(Box::new(revocation_checks.clone()))?;
        registry.register(Box::new(queue_intake.clone()))?;
        registry.register(Box::new(queue_evaluate.clone()))?;
        registry.register(Box::new(queue_decision.clone()))?;
        registry.register(Box::new(queue_dead_letter.clone()))?;
        Ok(Self {
            registry,
            submissions,
            decisions,
            stage_latency,
            escalations,
            revocation_checks,
            queue_intake,
            queue_evaluate,
            queue_decision,
            queue_dead_letter,
        })
    }

    /// Records a submission outcome.
    pub fn submission(&self, outcome: &str) {
        self.submissions.with_label_values(&[outcome]).inc();
    }

    /// Records a decision action.
    pub fn decision(&self, action: &str) {
        self.decisions.with_label_values(&[action]).inc();
    }

    /// Records a stage latency observation.
    pub fn stage(&self, stage: &str, seconds: f64) {
        self.stage_latency.with_label_values(&[stage]).observe(seconds);
    }

    /// Records an escalation transition outcome.
    pub fn escalation(&self, outcome: &str) {
        self.escalations.with_label_values(&[outcome]).inc();
    }

    /// Records a token revocation check outcome.
    pub fn revocation_check(&self, passed: bool) {
        let outcome = if passed { "pass" } else { "reject" };
        self.revocation_checks.with_label_values(&[outcome]).inc();
    }

    /// Refreshes queue depth gauges from a snapshot.
    pub fn set_queue_depths(&self, depths: QueueDepths) {
        self.queue_intake.set(i64::try_from(depths.intake).unwrap_or(i64::MAX));
        self.queue_evaluate.set(i64::try_from(depths.evaluate).unwrap_or(i64::MAX));
        self.queue_decision.set(i64::try_from(depths.decision).unwrap_or(i64::MAX));
        self.queue_dead_letter.set(i64::try_from(depths.dead_letter).unwrap_or(i64::MAX));
    }

    /// Renders the registry in Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
