use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use warden_autonomy::{AUTO_EXECUTE_ACTOR, ActionLedger, RiskPolicyEngine};
use warden_config::WardenConfig;
use warden_core::{
    Action, ActionSpec, ActionStatus, AutonomyDecision, CandidateProvider, CheckpointProvider,
    EventBus, Executor, Result, Tier,
};
use warden_store::{ActionFilter, ActionStore, AuditEntry, SqliteStore};

use crate::audit::AuditRecorder;
use crate::coordinator::{Execution, ExecutionCoordinator};
use crate::metrics::{MetricsAggregator, MetricsReport};
use crate::providers::{ConfiguredCandidates, SnapshotCheckpoint};
use crate::scheduler::{Housekeeping, SchedulerOptions, SweepReport, TierRegistration, TieredScheduler};
use crate::shell::ShellExecutor;

/// Collaborators for [`Governance::assemble`].
pub struct Components {
    pub store: Arc<dyn ActionStore>,
    pub executor: Arc<dyn Executor>,
    pub checkpoint: Arc<dyn CheckpointProvider>,
    pub providers: HashMap<Tier, Arc<dyn CandidateProvider>>,
    pub bus: EventBus,
    /// Present when the store is SQLite; enables the audit log.
    pub audit: Option<SqliteStore>,
}

/// The query and command surface over the whole engine: proposals,
/// decisions, execution, sweeps and metrics.
pub struct Governance {
    config: WardenConfig,
    ledger: ActionLedger,
    coordinator: ExecutionCoordinator,
    scheduler: Arc<TieredScheduler>,
    metrics: MetricsAggregator,
    audit: Option<SqliteStore>,
}

impl Governance {
    /// Build the production engine: SQLite store, local shell executor,
    /// and the candidates declared in config.
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        let sqlite = SqliteStore::open(&config.store.db_path)?;
        let executor: Arc<dyn Executor> = Arc::new(ShellExecutor::from_config(&config.execution));

        let checkpoint: Arc<dyn CheckpointProvider> = match config.execution.checkpoint_command {
            Some(ref command) => Arc::new(SnapshotCheckpoint::with_command(
                executor.clone(),
                command,
                std::time::Duration::from_secs(config.execution.timeout_secs),
            )),
            None => Arc::new(SnapshotCheckpoint::context_only()),
        };

        let providers = Tier::ALL
            .into_iter()
            .map(|tier| {
                let provider: Arc<dyn CandidateProvider> = Arc::new(ConfiguredCandidates::from_tier(
                    format!("config:{tier}"),
                    config.scheduler.tier(tier),
                ));
                (tier, provider)
            })
            .collect();

        Self::assemble(
            config,
            Components {
                store: Arc::new(sqlite.clone()),
                executor,
                checkpoint,
                providers,
                bus: EventBus::default(),
                audit: Some(sqlite),
            },
        )
    }

    /// Wire the engine from explicit collaborators. Tiers that are enabled
    /// in config run on their cron cadence; the rest are on-demand only.
    pub fn assemble(config: WardenConfig, components: Components) -> Result<Self> {
        let policy = RiskPolicyEngine::from_config(&config.ledger);
        let ledger = ActionLedger::new(components.store.clone(), policy, components.bus);
        let coordinator = ExecutionCoordinator::new(
            ledger.clone(),
            components.executor,
            components.checkpoint,
            config.execution.clone(),
        );

        let mut scheduler =
            TieredScheduler::new(coordinator.clone(), SchedulerOptions::from_config(&config));
        for (tier, provider) in components.providers {
            let tier_config = config.scheduler.tier(tier);
            let registration = if tier_config.enabled {
                TierRegistration::new(tier, &tier_config.cron, provider)?
            } else {
                TierRegistration::on_demand(tier, provider)
            };
            scheduler = scheduler.register(registration);
        }

        Ok(Self {
            metrics: MetricsAggregator::new(components.store),
            config,
            ledger,
            coordinator,
            scheduler: Arc::new(scheduler),
            audit: components.audit,
        })
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    pub fn bus(&self) -> &EventBus {
        self.ledger.bus()
    }

    pub fn scheduler(&self) -> Arc<TieredScheduler> {
        self.scheduler.clone()
    }

    /// An audit recorder on this engine's bus, if the store supports it.
    pub fn audit_recorder(&self) -> Option<AuditRecorder> {
        self.audit
            .clone()
            .map(|store| AuditRecorder::new(store, self.bus().clone()))
    }

    /// Run one command with the audit recorder attached. Every event the
    /// command publishes is in the audit log by the time this returns.
    pub async fn audited<T>(&self, command: impl Future<Output = T>) -> T {
        let session = self.audit_recorder().map(AuditRecorder::session);
        let output = command.await;
        if let Some(session) = session {
            session.finish().await;
        }
        output
    }

    // ── Commands ───────────────────────────────────────────────

    /// Record a proposal. Low-risk proposals run immediately; everything
    /// else is left pending. Returns the action in its latest state.
    pub async fn propose(&self, spec: ActionSpec) -> Result<Action> {
        let action = self.ledger.create(spec).await?;
        if action.autonomy != AutonomyDecision::AutoExecute {
            return Ok(action);
        }
        self.ledger.approve(action.id, AUTO_EXECUTE_ACTOR).await?;
        self.coordinator.execute(action.id).await?;
        self.ledger.get(action.id).await
    }

    pub async fn approve(&self, id: Uuid, by: &str) -> Result<Action> {
        self.ledger.approve(id, by).await
    }

    /// Approve and run in one step, on behalf of a human.
    pub async fn approve_and_execute(&self, id: Uuid, by: &str) -> Result<Execution> {
        self.ledger.approve(id, by).await?;
        self.coordinator.execute(id).await
    }

    pub async fn reject(&self, id: Uuid, by: &str, reason: &str) -> Result<Action> {
        self.ledger.reject(id, by, reason).await
    }

    pub async fn cancel(&self, id: Uuid, by: &str, reason: Option<&str>) -> Result<Action> {
        self.ledger.cancel(id, by, reason).await
    }

    pub async fn execute(&self, id: Uuid) -> Result<Execution> {
        self.coordinator.execute(id).await
    }

    pub async fn sweep(&self, tier: Tier) -> Result<SweepReport> {
        self.scheduler.run_tier_once(tier).await
    }

    pub async fn housekeeping(&self) -> Housekeeping {
        self.scheduler.housekeeping(chrono::Utc::now()).await
    }

    // ── Queries ────────────────────────────────────────────────

    pub async fn get(&self, id: Uuid) -> Result<Action> {
        self.ledger.get(id).await
    }

    pub async fn list(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        self.ledger.list(filter).await
    }

    pub async fn list_by_status(&self, status: ActionStatus) -> Result<Vec<Action>> {
        self.ledger.list_by_status(status).await
    }

    /// Metrics over the trailing window; the configured default when `None`.
    pub async fn metrics(&self, window_hours: Option<u32>) -> Result<MetricsReport> {
        let window = window_hours.unwrap_or(self.config.metrics.default_window_hours);
        info!(window_hours = window, "collecting metrics");
        self.metrics.collect(window).await
    }

    /// Most recent audit entries. Empty when the store keeps no audit log.
    pub fn audit_log(&self, limit: usize, event_type: Option<&str>) -> Result<Vec<AuditEntry>> {
        match self.audit {
            Some(ref store) => store.audit_log(limit, event_type),
            None => Ok(Vec::new()),
        }
    }
}
