// intent-gate-runtime/src/scheduler.rs
// ============================================================================
// Module: Intent Gate Scheduler
// Description: Single-leader periodic tasks: timeout sweeps, cleanup, and
//              chain checkpointing.
// Purpose: Drive time-based transitions without racing across the process
//          fleet.
// Dependencies: intent-gate-core, crate::queue, tokio, tracing
// ============================================================================

//! ## Overview
//! Leadership is a TTL lease in the fast store, renewed on every tick at
//! half-life; on loss the holder simply stops running tasks. Tasks: the
//! escalation timeout sweep (tick cadence, capped at 30 s), retention
//! cleanup (soft-deleted intents, expired revocations, old dead letters),
//! and audit chain checkpointing. `run_cleanup_now` bypasses the schedule
//! for operators.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use intent_gate_core::Clock;
use intent_gate_core::FastStore;
use intent_gate_core::NotificationSink;
use intent_gate_core::Timestamp;
use intent_gate_core::interfaces::GovernanceStore;
use intent_gate_core::runtime::AuditLogger;
use intent_gate_core::runtime::EscalationService;
use serde::Serialize;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::queue::InProcessQueue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Leadership lease key in the fast store.
const LEADER_LEASE_KEY: &str = "scheduler:leader";

/// Maximum escalations resolved per sweep.
const SWEEP_BATCH: u32 = 256;

// ============================================================================
// SECTION: Configuration and Status
// ============================================================================

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick (and sweep) cadence in milliseconds; capped at 30 s.
    pub sweep_interval_ms: u64,
    /// Cleanup cadence in milliseconds.
    pub cleanup_interval_ms: u64,
    /// Checkpoint cadence in milliseconds.
    pub checkpoint_interval_ms: u64,
    /// Leader lease TTL in milliseconds.
    pub leader_ttl_ms: i64,
    /// Retention for soft-deleted intents, in milliseconds.
    pub soft_delete_retention_ms: i64,
    /// Retention for dead-letter jobs, in milliseconds.
    pub dlq_retention_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 15_000,
            cleanup_interval_ms: 300_000,
            checkpoint_interval_ms: 600_000,
            leader_ttl_ms: 30_000,
            soft_delete_retention_ms: 30 * 86_400_000,
            dlq_retention_ms: 7 * 86_400_000,
        }
    }
}

/// Scheduler state exposed by the operational endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    /// Whether this process currently holds the lease.
    pub is_leader: bool,
    /// This process's holder identity.
    pub holder_id: String,
    /// Last successful sweep time.
    pub last_sweep_at: Option<Timestamp>,
    /// Escalations timed out on the last sweep.
    pub last_sweep_count: u64,
    /// Last successful cleanup time.
    pub last_cleanup_at: Option<Timestamp>,
    /// Rows removed on the last cleanup.
    pub last_cleanup_count: u64,
    /// Last successful checkpoint time.
    pub last_checkpoint_at: Option<Timestamp>,
    /// Task names the scheduler runs.
    pub tasks: Vec<String>,
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Single-leader periodic task driver.
pub struct Scheduler<S, F, C> {
    /// Escalation service for timeout sweeps.
    escalations: Arc<EscalationService<S, InProcessQueue, F, C>>,
    /// Audit logger for checkpointing.
    audit: Arc<AuditLogger<S, C>>,
    /// Storage backend for retention cleanup.
    store: Arc<S>,
    /// Fast store holding the leader lease.
    fast: Arc<F>,
    /// Queue for dead-letter retention.
    queue: InProcessQueue,
    /// Notification fan-out for sweep notices.
    notify: Arc<dyn NotificationSink>,
    /// Clock seam.
    clock: C,
    /// Scheduler configuration.
    config: SchedulerConfig,
    /// Shared status for the operational endpoint.
    status: Arc<Mutex<SchedulerStatus>>,
}

impl<S, F, C> Scheduler<S, F, C>
where
    S: GovernanceStore + Send + Sync + 'static,
    F: FastStore + 'static,
    C: Clock + Clone + 'static,
{
    /// Creates a scheduler with a unique holder identity.
    #[allow(clippy::too_many_arguments, reason = "Composition root wires every seam explicitly.")]
    pub fn new(
        escalations: Arc<EscalationService<S, InProcessQueue, F, C>>,
        audit: Arc<AuditLogger<S, C>>,
        store: Arc<S>,
        fast: Arc<F>,
        queue: InProcessQueue,
        notify: Arc<dyn NotificationSink>,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        let holder_id = intent_gate_core::JobId::generate().to_string();
        let status = SchedulerStatus {
            holder_id: holder_id.clone(),
            tasks: vec![
                "escalation_timeout_sweep".to_string(),
                "retention_cleanup".to_string(),
                "chain_checkpoint".to_string(),
            ],
            ..SchedulerStatus::default()
        };
        Self {
            escalations,
            audit,
            store,
            fast,
            queue,
            notify,
            clock,
            config,
            status: Arc::new(Mutex::new(status)),
        }
    }

    /// Returns the shared status handle for the operational endpoint.
    #[must_use]
    pub fn status_handle(&self) -> Arc<Mutex<SchedulerStatus>> {
        Arc::clone(&self.status)
    }

    /// Spawns the scheduler loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let tick = std::time::Duration::from_millis(self.config.sweep_interval_ms.min(30_000));
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_cleanup = Timestamp::from_unix_millis(0);
            let mut last_checkpoint = Timestamp::from_unix_millis(0);
            loop {
                interval.tick().await;
                let now = self.clock.now();
                if !self.hold_leadership(now) {
                    continue;
                }
                self.run_sweep(now);
                if now.millis_since(last_cleanup)
                    >= i64::try_from(self.config.cleanup_interval_ms).unwrap_or(i64::MAX)
                {
                    last_cleanup = now;
                    self.run_cleanup(now);
                }
                if now.millis_since(last_checkpoint)
                    >= i64::try_from(self.config.checkpoint_interval_ms).unwrap_or(i64::MAX)
                {
                    last_checkpoint = now;
                    self.run_checkpoint(now);
                }
            }
        })
    }

    /// Acquires or renews the leadership lease; updates the status.
    fn hold_leadership(&self, now: Timestamp) -> bool {
        let holder = self.holder_id();
        let held = self
            .fast
            .acquire_lease(LEADER_LEASE_KEY, &holder, self.config.leader_ttl_ms, now)
            .unwrap_or(false);
        if let Ok(mut status) = self.status.lock() {
            if status.is_leader && !held {
                info!(holder, "scheduler leadership lost; stopping tasks");
            }
            status.is_leader = held;
        }
        held
    }

    /// Returns this process's holder identity.
    fn holder_id(&self) -> String {
        self.status.lock().map_or_else(|_| "unknown".to_string(), |status| status.holder_id.clone())
    }

    /// Runs the escalation timeout sweep.
    fn run_sweep(&self, now: Timestamp) {
        match self.escalations.sweep_timeouts(SWEEP_BATCH) {
            Ok(outcome) => {
                let count = outcome.timed_out.len() as u64;
                if count > 0 {
                    warn!(count, "escalations timed out");
                }
                for record in outcome.notifications {
                    let sink = Arc::clone(&self.notify);
                    tokio::spawn(async move {
                        if let Err(err) = sink.deliver(&record).await {
                            warn!(error = %err, "timeout notification delivery failed");
                        }
                    });
                }
                if let Ok(mut status) = self.status.lock() {
                    status.last_sweep_at = Some(now);
                    status.last_sweep_count = count;
                }
            }
            Err(err) => error!(error = %err, "escalation sweep failed"),
        }
    }

    /// Runs retention cleanup across stores and the dead-letter ledger.
    ///
    /// Also exposed to operators as the run-now path.
    pub fn run_cleanup(&self, now: Timestamp) {
        let mut removed = 0_u64;
        match self.store.purge_soft_deleted(now.plus_millis(-self.config.soft_delete_retention_ms))
        {
            Ok(count) => removed += count,
            Err(err) => error!(error = %err, "soft-delete purge failed"),
        }
        match self.store.purge_expired_revocations(now) {
            Ok(count) => removed += count,
            Err(err) => error!(error = %err, "revocation purge failed"),
        }
        removed += self.queue.purge_dead_letters(now.plus_millis(-self.config.dlq_retention_ms));
        info!(removed, "retention cleanup finished");
        if let Ok(mut status) = self.status.lock() {
            status.last_cleanup_at = Some(now);
            status.last_cleanup_count = removed;
        }
    }

    /// Runs audit chain checkpointing; invalid chains are alarmed, never
    /// silently repaired.
    fn run_checkpoint(&self, now: Timestamp) {
        match self.audit.checkpoint_all() {
            Ok(invalid) if invalid.is_empty() => {
                if let Ok(mut status) = self.status.lock() {
                    status.last_checkpoint_at = Some(now);
                }
            }
            Ok(invalid) => {
                for tenant in invalid {
                    error!(tenant = %tenant, "audit chain verification failed during checkpointing");
                }
            }
            Err(err) => error!(error = %err, "chain checkpointing failed"),
        }
    }
}
