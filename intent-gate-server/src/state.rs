// intent-gate-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Composition root wiring stores, services, queue, and
//              telemetry into the shared handler state.
// Purpose: Build the running system once and hand axum a cheap-to-clone
//          handle.
// Dependencies: intent-gate-{config,core,runtime,store-sqlite}
// ============================================================================

//! ## Overview
//! The server binds the generic core services to their production backends:
//! the `SQLite` governance store, the in-process queue, the in-memory fast
//! store, and the system clock. Tests reuse the same composition over an
//! in-memory database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use intent_gate_config::IntentGateConfig;
use intent_gate_core::InMemoryFastStore;
use intent_gate_core::NamespaceId;
use intent_gate_core::SigningKeys;
use intent_gate_core::SystemClock;
use intent_gate_core::Timestamp;
use intent_gate_core::core::time::Clock;
use intent_gate_core::runtime::AuditLogger;
use intent_gate_core::runtime::EscalationService;
use intent_gate_core::runtime::LifecycleConfig;
use intent_gate_core::runtime::LifecycleService;
use intent_gate_core::runtime::PolicyCache;
use intent_gate_core::runtime::PolicyService;
use intent_gate_runtime::HttpTrustProvider;
use intent_gate_runtime::InProcessQueue;
use intent_gate_runtime::Scheduler;
use intent_gate_runtime::SchedulerConfig;
use intent_gate_runtime::SchedulerStatus;
use intent_gate_runtime::StageConsumers;
use intent_gate_runtime::StaticTrustProvider;
use intent_gate_runtime::TracingNotificationSink;
use intent_gate_runtime::WorkerConfig;
use intent_gate_runtime::WorkerContext;
use intent_gate_store_sqlite::SqliteGovernanceStore;
use intent_gate_store_sqlite::SqliteStoreConfig;

use crate::telemetry::Metrics;

// ============================================================================
// SECTION: Type Aliases
// ============================================================================

/// Production storage backend.
pub type Store = SqliteGovernanceStore;
/// Production fast store.
pub type Fast = InMemoryFastStore;
/// Production lifecycle service.
pub type Lifecycle = LifecycleService<Store, InProcessQueue, Fast, SystemClock>;
/// Production escalation service.
pub type Escalations = EscalationService<Store, InProcessQueue, Fast, SystemClock>;
/// Production policy service.
pub type Policies = PolicyService<Store, SystemClock>;
/// Production audit logger.
pub type Audit = AuditLogger<Store, SystemClock>;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Edge options derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Whether a JTI claim is required on every token.
    pub require_jti: bool,
}

/// Test seams threaded into the worker runtime at composition time.
#[derive(Debug, Clone, Default)]
pub struct SystemHooks {
    /// Evaluate-stage hold; see
    /// [`intent_gate_runtime::WorkerConfig::evaluation_hold`].
    pub evaluation_hold: Option<Arc<tokio::sync::Semaphore>>,
}

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared handler state.
pub struct AppState {
    /// Storage backend (also the revocation store).
    pub store: Arc<Store>,
    /// Fast shared state.
    pub fast: Arc<Fast>,
    /// Pipeline queue.
    pub queue: InProcessQueue,
    /// Lifecycle service.
    pub lifecycle: Arc<Lifecycle>,
    /// Escalation service.
    pub escalations: Arc<Escalations>,
    /// Policy service.
    pub policies: Arc<Policies>,
    /// Audit logger.
    pub audit: Arc<Audit>,
    /// Scheduler status for the operational endpoint.
    pub scheduler_status: Arc<Mutex<SchedulerStatus>>,
    /// Scheduler handle for run-now cleanup.
    pub scheduler: Arc<Scheduler<Store, Fast, SystemClock>>,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Edge options.
    pub options: ServerOptions,
    /// Process start for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Returns the current time from the shared clock.
    #[must_use]
    pub fn clock_now(&self) -> Timestamp {
        SystemClock.now()
    }
}

/// Fully wired system: handler state plus background task handles.
pub struct System {
    /// Shared handler state.
    pub state: Arc<AppState>,
    /// Background task handles (workers, scheduler).
    pub tasks: Vec<tokio::task::JoinHandle<()>>,
}

/// Builds the full system from configuration.
///
/// Must run inside a tokio runtime: queue timers, workers, and the
/// scheduler spawn onto it.
///
/// # Errors
///
/// Returns an error string when a backend fails to initialize.
pub fn build_system(config: &IntentGateConfig) -> Result<System, String> {
    build_system_with_hooks(config, SystemHooks::default())
}

/// Builds the full system with test seams attached.
///
/// # Errors
///
/// Returns an error string when a backend fails to initialize.
pub fn build_system_with_hooks(
    config: &IntentGateConfig,
    hooks: SystemHooks,
) -> Result<System, String> {
    let default_key = config.signing.default_key().map_err(|err| err.to_string())?;
    let mut keys = SigningKeys::new(default_key);
    for (tenant, key) in config.signing.tenant_keys().map_err(|err| err.to_string())? {
        keys = keys.with_tenant_key(tenant, key);
    }

    let store = Arc::new(
        Store::open(
            &SqliteStoreConfig {
                path: config.store.path.clone(),
                busy_timeout_ms: config.store.busy_timeout_ms,
            },
            keys.clone(),
        )
        .map_err(|err| err.to_string())?,
    );
    build_system_with_store(config, store, keys, hooks)
}

/// Builds the full system over an existing store (tests use an in-memory
/// database here).
///
/// # Errors
///
/// Returns an error string when wiring fails.
pub fn build_system_with_store(
    config: &IntentGateConfig,
    store: Arc<Store>,
    keys: SigningKeys,
    hooks: SystemHooks,
) -> Result<System, String> {
    let clock = SystemClock;
    let fast = Arc::new(Fast::new());
    let (queue, consumers) = InProcessQueue::new();
    let StageConsumers {
        intake,
        evaluate,
        decision: _decision,
    } = consumers;

    let lifecycle_config = LifecycleConfig {
        dedupe_ttl_ms: config.lifecycle.dedupe_ttl_ms,
        redaction_paths: config.lifecycle.redaction_paths.clone(),
        namespace_routes: config
            .lifecycle
            .namespace_routes
            .iter()
            .map(|(tag, namespace)| (tag.clone(), NamespaceId::new(namespace.clone())))
            .collect(),
        tenant_concurrency_cap: config.lifecycle.tenant_concurrency_cap,
        over_cap_delay_ms: config.lifecycle.over_cap_delay_ms,
        submit_rate_limit: config.lifecycle.submit_rate_limit,
        submit_rate_window_ms: config.lifecycle.submit_rate_window_ms,
        degraded_blocks_approval: config.trust.degraded_blocks_approval,
        degraded_escalation_to: config.trust.degraded_escalation_to.clone(),
        degraded_escalation_timeout_ms: config.trust.degraded_escalation_timeout_ms,
    };
    let lifecycle = Arc::new(LifecycleService::new(
        Arc::clone(&store),
        Arc::new(queue.clone()),
        Arc::clone(&fast),
        clock,
        lifecycle_config,
    ));
    let cache = Arc::new(PolicyCache::new(config.policy.cache_ttl_ms));
    let policies = Arc::new(PolicyService::new(Arc::clone(&store), cache, clock));
    let escalations = Arc::new(EscalationService::new(
        Arc::clone(&store),
        Arc::new(queue.clone()),
        Arc::clone(&fast),
        clock,
    ));
    let audit = Arc::new(AuditLogger::new(Arc::clone(&store), keys, clock));

    let trust: Arc<dyn intent_gate_core::TrustProvider> = match &config.trust.endpoint {
        Some(endpoint) => {
            let url = url::Url::parse(endpoint).map_err(|err| err.to_string())?;
            Arc::new(HttpTrustProvider::new(url))
        }
        None => Arc::new(StaticTrustProvider::new(3, 0.8)),
    };
    let notify: Arc<dyn intent_gate_core::NotificationSink> = Arc::new(TracingNotificationSink);

    let worker_ctx = Arc::new(WorkerContext {
        lifecycle: Arc::clone(&lifecycle),
        policies: Arc::clone(&policies),
        store: Arc::clone(&store),
        queue: queue.clone(),
        fast: Arc::clone(&fast),
        trust,
        notify: Arc::clone(&notify),
        clock,
        config: WorkerConfig {
            max_attempts: config.queue.max_attempts,
            base_backoff_ms: config.queue.base_backoff_ms,
            max_backoff_ms: config.queue.max_backoff_ms,
            worker_concurrency: config.queue.worker_concurrency,
            trust_timeout_ms: config.trust.timeout_ms,
            evaluation_timeout_ms: config.policy.evaluation_timeout_ms,
            evaluation_hold: hooks.evaluation_hold,
            ..WorkerConfig::default()
        },
    });
    let mut tasks = worker_ctx.spawn(intake, evaluate);

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&escalations),
        Arc::clone(&audit),
        Arc::clone(&store),
        Arc::clone(&fast),
        queue.clone(),
        notify,
        clock,
        SchedulerConfig {
            sweep_interval_ms: config.scheduler.sweep_interval_ms,
            cleanup_interval_ms: config.scheduler.cleanup_interval_ms,
            checkpoint_interval_ms: config.scheduler.checkpoint_interval_ms,
            leader_ttl_ms: config.scheduler.leader_ttl_ms,
            soft_delete_retention_ms: config.scheduler.soft_delete_retention_ms,
            dlq_retention_ms: config.scheduler.dlq_retention_ms,
        },
    ));
    let scheduler_status = scheduler.status_handle();
    tasks.push(Arc::clone(&scheduler).spawn());

    let metrics = Metrics::new().map_err(|err| err.to_string())?;
    let state = Arc::new(AppState {
        store,
        fast,
        queue,
        lifecycle,
        escalations,
        policies,
        audit,
        scheduler_status,
        scheduler,
        metrics,
        options: ServerOptions {
            require_jti: config.server.require_jti,
        },
        started_at: Instant::now(),
    });
    Ok(System { state, tasks })
}
