// intent-gate-runtime/src/queue.rs
// ============================================================================
// Module: Intent Gate In-Process Queue
// Description: Three-stage pipeline queue with delays and a dead-letter
//              ledger.
// Purpose: Implement the core's queue seam over tokio channels for
//          single-process deployments.
// Dependencies: intent-gate-core, tokio
// ============================================================================

//! ## Overview
//! Three unbounded channels back the `intake`, `evaluate`, and `decision`
//! stages. Delayed enqueues (retry backoff, over-cap deferral) park on a
//! tokio timer before landing on their channel. Jobs that exhaust their
//! retry budget move to the dead-letter ledger with the last error
//! preserved; operators re-enqueue them on the original stage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use intent_gate_core::Clock;
use intent_gate_core::DeadLetterJob;
use intent_gate_core::Job;
use intent_gate_core::JobId;
use intent_gate_core::JobQueue;
use intent_gate_core::QueueDepths;
use intent_gate_core::QueueError;
use intent_gate_core::QueueStage;
use intent_gate_core::SystemClock;
use intent_gate_core::Timestamp;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Queue Internals
// ============================================================================

/// Shared queue state.
struct QueueInner {
    /// Intake sender.
    intake_tx: mpsc::UnboundedSender<Job>,
    /// Evaluate sender.
    evaluate_tx: mpsc::UnboundedSender<Job>,
    /// Decision sender.
    decision_tx: mpsc::UnboundedSender<Job>,
    /// Backlog counters per stage.
    depths: [AtomicU64; 3],
    /// Dead-letter ledger.
    dead: Mutex<Vec<DeadLetterJob>>,
    /// Runtime handle for delayed enqueues.
    handle: tokio::runtime::Handle,
    /// Clock for dead-letter timestamps.
    clock: Box<dyn Clock>,
}

impl QueueInner {
    /// Returns the sender and depth counter for a stage.
    fn stage(&self, stage: QueueStage) -> (&mpsc::UnboundedSender<Job>, &AtomicU64) {
        match stage {
            QueueStage::Intake => (&self.intake_tx, &self.depths[0]),
            QueueStage::Evaluate => (&self.evaluate_tx, &self.depths[1]),
            QueueStage::Decision => (&self.decision_tx, &self.depths[2]),
        }
    }

    /// Sends a job onto a stage channel.
    fn send(&self, stage: QueueStage, job: Job) -> Result<(), QueueError> {
        let (tx, depth) = self.stage(stage);
        tx.send(job).map_err(|err| QueueError::Unavailable(err.to_string()))?;
        depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-process pipeline queue.
#[derive(Clone)]
pub struct InProcessQueue {
    /// Shared state.
    inner: Arc<QueueInner>,
}

/// Consumer half of one stage.
pub struct StageConsumer {
    /// Stage identity for logging.
    stage: QueueStage,
    /// Receiving channel.
    rx: mpsc::UnboundedReceiver<Job>,
    /// Shared state for depth accounting.
    inner: Arc<QueueInner>,
}

impl StageConsumer {
    /// Receives the next job, or `None` when the queue shut down.
    pub async fn recv(&mut self) -> Option<Job> {
        let job = self.rx.recv().await?;
        let (_, depth) = self.inner.stage(self.stage);
        depth.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }

    /// Returns the stage this consumer drains.
    #[must_use]
    pub const fn stage(&self) -> QueueStage {
        self.stage
    }
}

/// Consumer bundle handed to the worker runtime.
pub struct StageConsumers {
    /// Intake consumer.
    pub intake: StageConsumer,
    /// Evaluate consumer.
    pub evaluate: StageConsumer,
    /// Decision consumer (drained by the executor edge).
    pub decision: StageConsumer,
}

impl InProcessQueue {
    /// Creates the queue and its consumers.
    ///
    /// Must be called inside a tokio runtime; delayed enqueues spawn onto
    /// the current runtime.
    #[must_use]
    pub fn new() -> (Self, StageConsumers) {
        Self::with_clock(Box::new(SystemClock))
    }

    /// Creates the queue with an explicit clock (tests).
    #[must_use]
    pub fn with_clock(clock: Box<dyn Clock>) -> (Self, StageConsumers) {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let (evaluate_tx, evaluate_rx) = mpsc::unbounded_channel();
        let (decision_tx, decision_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(QueueInner {
            intake_tx,
            evaluate_tx,
            decision_tx,
            depths: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            dead: Mutex::new(Vec::new()),
            handle: tokio::runtime::Handle::current(),
            clock,
        });
        let queue = Self {
            inner: Arc::clone(&inner),
        };
        let consumers = StageConsumers {
            intake: StageConsumer {
                stage: QueueStage::Intake,
                rx: intake_rx,
                inner: Arc::clone(&inner),
            },
            evaluate: StageConsumer {
                stage: QueueStage::Evaluate,
                rx: evaluate_rx,
                inner: Arc::clone(&inner),
            },
            decision: StageConsumer {
                stage: QueueStage::Decision,
                rx: decision_rx,
                inner,
            },
        };
        (queue, consumers)
    }

    /// Moves a job to the dead-letter ledger with its last error.
    pub fn dead_letter(&self, stage: QueueStage, job: Job, error: String) {
        let failed_at = self.inner.clock.now();
        if let Ok(mut dead) = self.inner.dead.lock() {
            dead.push(DeadLetterJob {
                job,
                stage,
                error,
                failed_at,
            });
        }
    }

    /// Drops dead-letter jobs that failed before the cutoff.
    #[must_use]
    pub fn purge_dead_letters(&self, before: Timestamp) -> u64 {
        let Ok(mut dead) = self.inner.dead.lock() else {
            return 0;
        };
        let initial = dead.len();
        dead.retain(|entry| entry.failed_at >= before);
        (initial - dead.len()) as u64
    }
}

impl JobQueue for InProcessQueue {
    fn enqueue(&self, stage: QueueStage, job: Job) -> Result<(), QueueError> {
        self.inner.send(stage, job)
    }

    fn enqueue_delayed(
        &self,
        stage: QueueStage,
        job: Job,
        delay_ms: u64,
    ) -> Result<(), QueueError> {
        let inner = Arc::clone(&self.inner);
        // Count delayed jobs toward the stage backlog immediately so depth
        // reflects committed work, not just channel occupancy.
        let (_, depth) = inner.stage(stage);
        depth.fetch_add(1, Ordering::SeqCst);
        self.inner.handle.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            let (tx, depth) = inner.stage(stage);
            // The send's own accounting would double count; undo ours first.
            depth.fetch_sub(1, Ordering::SeqCst);
            if tx.send(job).is_ok() {
                depth.fetch_add(1, Ordering::SeqCst);
            }
        });
        Ok(())
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths {
            intake: self.inner.depths[0].load(Ordering::SeqCst),
            evaluate: self.inner.depths[1].load(Ordering::SeqCst),
            decision: self.inner.depths[2].load(Ordering::SeqCst),
            dead_letter: self.inner.dead.lock().map_or(0, |dead| dead.len() as u64),
        }
    }

    fn dead_letters(&self) -> Vec<DeadLetterJob> {
        self.inner.dead.lock().map_or_else(|_| Vec::new(), |dead| dead.clone())
    }

    fn retry_dead_letter(&self, job_id: &JobId) -> Result<(), QueueError> {
        let entry = {
            let mut dead = self
                .inner
                .dead
                .lock()
                .map_err(|_| QueueError::Unavailable("dead-letter lock poisoned".to_string()))?;
            let position = dead
                .iter()
                .position(|entry| entry.job.id == *job_id)
                .ok_or_else(|| QueueError::DeadLetterNotFound(job_id.to_string()))?;
            dead.remove(position)
        };
        let mut job = entry.job;
        job.attempt = 1;
        self.inner.send(entry.stage, job)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use intent_gate_core::IntentId;
    use intent_gate_core::NamespaceId;
    use intent_gate_core::TenantId;

    use super::*;

    /// Builds a job for tests.
    fn job(id: &str) -> Job {
        Job {
            id: JobId::new(id),
            intent_id: IntentId::new("i-1"),
            tenant_id: TenantId::new("t-1"),
            namespace: NamespaceId::default_namespace(),
            attempt: 1,
        }
    }

    /// Tests enqueue/recv round-trips with depth accounting.
    #[tokio::test]
    async fn test_enqueue_and_receive() {
        let (queue, mut consumers) = InProcessQueue::new();
        queue.enqueue(QueueStage::Intake, job("j-1")).unwrap();
        assert_eq!(queue.depths().intake, 1);
        let received = consumers.intake.recv().await.unwrap();
        assert_eq!(received.id, JobId::new("j-1"));
        assert_eq!(queue.depths().intake, 0);
    }

    /// Tests delayed enqueues land after the timer fires.
    #[tokio::test(start_paused = true)]
    async fn test_delayed_enqueue() {
        let (queue, mut consumers) = InProcessQueue::new();
        queue.enqueue_delayed(QueueStage::Evaluate, job("j-1"), 5_000).unwrap();
        tokio::time::advance(std::time::Duration::from_millis(5_001)).await;
        let received = consumers.evaluate.recv().await.unwrap();
        assert_eq!(received.id, JobId::new("j-1"));
    }

    /// Tests dead-letter retry re-enqueues on the original stage with the
    /// attempt counter reset.
    #[tokio::test]
    async fn test_dead_letter_retry() {
        let (queue, mut consumers) = InProcessQueue::new();
        let mut failed = job("j-1");
        failed.attempt = 5;
        queue.dead_letter(QueueStage::Evaluate, failed, "boom".to_string());
        assert_eq!(queue.depths().dead_letter, 1);
        assert_eq!(queue.dead_letters()[0].error, "boom");

        queue.retry_dead_letter(&JobId::new("j-1")).unwrap();
        assert_eq!(queue.depths().dead_letter, 0);
        let retried = consumers.evaluate.recv().await.unwrap();
        assert_eq!(retried.attempt, 1);
    }

    /// Tests unknown dead-letter jobs are rejected.
    #[tokio::test]
    async fn test_retry_unknown_dead_letter() {
        let (queue, _consumers) = InProcessQueue::new();
        assert!(matches!(
            queue.retry_dead_letter(&JobId::new("missing")),
            Err(QueueError::DeadLetterNotFound(_))
        ));
    }
}
