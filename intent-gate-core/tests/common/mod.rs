// intent-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Harness
// Description: Shared fixtures wiring services over the in-memory stores.
// ============================================================================
//! ## Overview
//! Builds lifecycle and escalation services over the in-memory governance
//! store, a collecting queue double, and a manual clock.

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
    dead_code,
    reason = "Test-only helpers; not every fixture is used by every suite."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use intent_gate_core::DeadLetterJob;
use intent_gate_core::EntityId;
use intent_gate_core::InMemoryFastStore;
use intent_gate_core::InMemoryGovernanceStore;
use intent_gate_core::Job;
use intent_gate_core::JobQueue;
use intent_gate_core::ManualClock;
use intent_gate_core::Principal;
use intent_gate_core::PrincipalId;
use intent_gate_core::QueueDepths;
use intent_gate_core::QueueError;
use intent_gate_core::QueueStage;
use intent_gate_core::JobId;
use intent_gate_core::SigningKeys;
use intent_gate_core::TenantId;
use intent_gate_core::Timestamp;
use intent_gate_core::runtime::EscalationService;
use intent_gate_core::runtime::LifecycleConfig;
use intent_gate_core::runtime::LifecycleService;
use intent_gate_core::runtime::SubmitRequest;

/// Queue double that records enqueued jobs instead of running workers.
#[derive(Default)]
pub struct CollectingQueue {
    /// Enqueued `(stage, job, delay_ms)` triples in order.
    pub jobs: Mutex<Vec<(QueueStage, Job, u64)>>,
    /// When true, every enqueue fails as unavailable.
    pub unavailable: Mutex<bool>,
}

impl CollectingQueue {
    /// Returns the jobs enqueued on a stage.
    pub fn on_stage(&self, stage: QueueStage) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == stage)
            .map(|(_, job, _)| job.clone())
            .collect()
    }

    /// Flips the outage switch.
    pub fn set_unavailable(&self, down: bool) {
        *self.unavailable.lock().unwrap() = down;
    }
}

impl JobQueue for CollectingQueue {
    fn enqueue(&self, stage: QueueStage, job: Job) -> Result<(), QueueError> {
        if *self.unavailable.lock().unwrap() {
            return Err(QueueError::Unavailable("collector down".to_string()));
        }
        self.jobs.lock().unwrap().push((stage, job, 0));
        Ok(())
    }

    fn enqueue_delayed(&self, stage: QueueStage, job: Job, delay_ms: u64) -> Result<(), QueueError> {
        if *self.unavailable.lock().unwrap() {
            return Err(QueueError::Unavailable("collector down".to_string()));
        }
        self.jobs.lock().unwrap().push((stage, job, delay_ms));
        Ok(())
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths::default()
    }

    fn dead_letters(&self) -> Vec<DeadLetterJob> {
        Vec::new()
    }

    fn retry_dead_letter(&self, job_id: &JobId) -> Result<(), QueueError> {
        Err(QueueError::DeadLetterNotFound(job_id.to_string()))
    }
}

/// Assembled test fixture.
pub struct Harness {
    /// Shared governance store.
    pub store: Arc<InMemoryGovernanceStore>,
    /// Shared queue double.
    pub queue: Arc<CollectingQueue>,
    /// Shared fast store.
    pub fast: Arc<InMemoryFastStore>,
    /// Manual clock.
    pub clock: ManualClock,
    /// Lifecycle service under test.
    pub lifecycle: LifecycleService<InMemoryGovernanceStore, CollectingQueue, InMemoryFastStore, ManualClock>,
    /// Escalation service under test.
    pub escalations: EscalationService<InMemoryGovernanceStore, CollectingQueue, InMemoryFastStore, ManualClock>,
}

/// Builds the default harness at t=1_000_000 ms.
pub fn harness() -> Harness {
    harness_with_config(LifecycleConfig::default())
}

/// Builds a harness with a custom lifecycle configuration.
pub fn harness_with_config(config: LifecycleConfig) -> Harness {
    let store = Arc::new(InMemoryGovernanceStore::new(SigningKeys::new(b"test-signing-key".to_vec())));
    let queue = Arc::new(CollectingQueue::default());
    let fast = Arc::new(InMemoryFastStore::new());
    let clock = ManualClock::starting_at(Timestamp::from_unix_millis(1_000_000));
    let lifecycle = LifecycleService::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::clone(&fast),
        clock.clone(),
        config,
    );
    let escalations = EscalationService::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::clone(&fast),
        clock.clone(),
    );
    Harness {
        store,
        queue,
        fast,
        clock,
        lifecycle,
        escalations,
    }
}

/// Default test tenant.
pub fn tenant() -> TenantId {
    TenantId::new("tenant-1")
}

/// Builds a submission request with the given goal.
pub fn submission(goal: &str) -> SubmitRequest {
    SubmitRequest {
        entity_id: EntityId::new("entity-1"),
        goal: goal.to_string(),
        intent_type: Some("read.public".to_string()),
        priority: Some(0),
        context: serde_json::json!({"scope": "test"}),
        metadata: BTreeMap::new(),
        idempotency_key: None,
    }
}

/// Builds an approver principal in the test tenant.
pub fn approver(groups: &[&str]) -> Principal {
    Principal {
        sub: PrincipalId::new("approver-1"),
        tenant_id: tenant(),
        jti: Some("jti-approver".to_string()),
        iat: Timestamp::from_unix_millis(0),
        exp: Timestamp::from_unix_millis(i64::MAX),
        roles: vec!["approver".to_string()],
        groups: groups.iter().map(|group| (*group).to_string()).collect(),
    }
}
