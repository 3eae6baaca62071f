//! # Tiered Scheduler
//!
//! Drives three independently scheduled sweeps:
//! - **diagnostics**: frequent, read-only, low risk. Its failures and
//!   findings become the flagged conditions for remediation.
//! - **remediation**: only discovers candidates while diagnostics has
//!   flagged something.
//! - **maintenance**: daily upkeep, often high risk and approval-gated.
//!
//! Every sweep also runs housekeeping: expiry, auto-approval, stale-claim
//! recovery, and dispatch of approved actions to the coordinator.
//!
//! A sweep never aborts on a single candidate. Infrastructure failures are
//! retried with backoff; action failures are counted and reported.

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use warden_autonomy::{AUTO_EXECUTE_ACTOR, ActionLedger};
use warden_config::{WardenConfig, normalize_cron};
use warden_core::{
    ActionSpec, ActionStatus, AutonomyDecision, CandidateProvider, Event, Result, Tier,
    TierContext, WardenError,
};

use crate::coordinator::{Execution, ExecutionCoordinator};
use crate::retry::RetryPolicy;

// ── Registrations ──────────────────────────────────────────────

/// One named tier: its cadence and where its candidates come from.
pub struct TierRegistration {
    pub tier: Tier,
    /// `None` registers the tier for on-demand sweeps only.
    pub schedule: Option<Schedule>,
    pub provider: Arc<dyn CandidateProvider>,
}

impl TierRegistration {
    /// Register a tier on a cron cadence (five- or six-field).
    pub fn new(tier: Tier, cron_expr: &str, provider: Arc<dyn CandidateProvider>) -> Result<Self> {
        let normalized = normalize_cron(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            WardenError::Scheduler(format!("invalid cron expression '{cron_expr}' for {tier}: {e}"))
        })?;
        Ok(Self {
            tier,
            schedule: Some(schedule),
            provider,
        })
    }

    pub fn on_demand(tier: Tier, provider: Arc<dyn CandidateProvider>) -> Self {
        Self {
            tier,
            schedule: None,
            provider,
        }
    }

    /// Whether a fire time falls in `(since, now]`.
    fn is_due(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.schedule.as_ref().is_some_and(|schedule| {
            schedule
                .after(&since)
                .take(1)
                .next()
                .is_some_and(|next| next <= now)
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub tick: Duration,
    pub retry: RetryPolicy,
    /// How long an action may stay `executing` before recovery fails it.
    /// Never shorter than the longest command timeout plus [`STALE_CLAIM_MARGIN_SECS`].
    pub stale_after: chrono::Duration,
    /// Hand approved rows to the coordinator during housekeeping.
    pub dispatch_approved: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&WardenConfig::default())
    }
}

/// Slack between the longest command timeout and the earliest stale-claim recovery.
pub const STALE_CLAIM_MARGIN_SECS: u64 = 60;

impl SchedulerOptions {
    pub fn from_config(config: &WardenConfig) -> Self {
        let longest_timeout = config
            .execution
            .timeout_secs
            .max(config.execution.deployment_timeout_secs);
        let stale_secs = config
            .ledger
            .stale_claim_secs
            .max(longest_timeout.saturating_add(STALE_CLAIM_MARGIN_SECS));
        if stale_secs != config.ledger.stale_claim_secs {
            warn!(
                configured = config.ledger.stale_claim_secs,
                effective = stale_secs,
                "stale-claim threshold raised above the longest command timeout"
            );
        }
        Self {
            tick: Duration::from_secs(config.scheduler.tick_secs.max(1)),
            retry: RetryPolicy::from(&config.retry),
            stale_after: i64::try_from(stale_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(chrono::Duration::MAX),
            dispatch_approved: config.scheduler.dispatch_approved,
        }
    }
}

fn log_join_error(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "sweep task panicked");
    }
}

// ── Reports ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Ran and succeeded.
    Executed,
    /// Created and left pending for a decision.
    AwaitingApproval,
    /// Another worker had already claimed it.
    NotClaimed,
    /// Rejected by validation before reaching the ledger.
    Invalid,
    /// Ran and failed, or could not be recorded.
    Failed,
}

/// The result of handling one candidate or one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub description: String,
    pub action_id: Option<Uuid>,
    pub kind: OutcomeKind,
    pub error: Option<String>,
}

impl ActionOutcome {
    fn ok(description: &str, action_id: Uuid, kind: OutcomeKind) -> Self {
        Self {
            description: description.to_string(),
            action_id: Some(action_id),
            kind,
            error: None,
        }
    }

    fn failed(description: &str, action_id: Option<Uuid>, error: &WardenError) -> Self {
        let kind = match error {
            WardenError::Validation(_) => OutcomeKind::Invalid,
            _ => OutcomeKind::Failed,
        };
        Self {
            description: description.to_string(),
            action_id,
            kind,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.kind,
            OutcomeKind::Executed | OutcomeKind::AwaitingApproval | OutcomeKind::NotClaimed
        )
    }
}

/// What the housekeeping pass touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Housekeeping {
    pub auto_approved: Vec<Uuid>,
    pub expired: Vec<Uuid>,
    pub recovered: Vec<Uuid>,
    pub dispatched: Vec<ActionOutcome>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub tier: Tier,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<ActionOutcome>,
    /// Conditions flagged by this sweep (diagnostics), or the conditions
    /// this sweep was run against (remediation).
    pub flagged: Vec<String>,
    /// Discovery was skipped because nothing was flagged.
    pub skipped: bool,
    /// Set when discovery failed after every retry.
    pub discovery_error: Option<String>,
    pub housekeeping: Housekeeping,
}

impl SweepReport {
    fn new(tier: Tier, started_at: DateTime<Utc>) -> Self {
        Self {
            tier,
            started_at,
            total: 0,
            successful: 0,
            failed: 0,
            outcomes: Vec::new(),
            flagged: Vec::new(),
            skipped: false,
            discovery_error: None,
            housekeeping: Housekeeping::default(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.discovery_error.is_some()
    }
}

// ── Scheduler ──────────────────────────────────────────────────

/// The scheduler service. Build it with its registrations, wrap it in an
/// `Arc`, then either spawn [`run`](Self::run) or call
/// [`run_tier_once`](Self::run_tier_once) directly.
pub struct TieredScheduler {
    coordinator: ExecutionCoordinator,
    options: SchedulerOptions,
    tiers: HashMap<Tier, TierRegistration>,
    /// Conditions flagged by the most recent diagnostics sweep.
    flags: Mutex<Vec<String>>,
    in_flight: Mutex<HashSet<Tier>>,
    last_fired: Mutex<HashMap<Tier, DateTime<Utc>>>,
}

impl TieredScheduler {
    pub fn new(coordinator: ExecutionCoordinator, options: SchedulerOptions) -> Self {
        Self {
            coordinator,
            options,
            tiers: HashMap::new(),
            flags: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace a tier registration.
    pub fn register(mut self, registration: TierRegistration) -> Self {
        info!(
            tier = %registration.tier,
            provider = registration.provider.name(),
            scheduled = registration.schedule.is_some(),
            "registered tier"
        );
        self.tiers.insert(registration.tier, registration);
        self
    }

    pub fn tiers(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = self.tiers.keys().copied().collect();
        tiers.sort();
        tiers
    }

    pub fn flagged_conditions(&self) -> Vec<String> {
        self.flags.lock().clone()
    }

    fn ledger(&self) -> &ActionLedger {
        self.coordinator.ledger()
    }

    /// Run the scheduler loop until `Event::Shutdown` is published on the
    /// ledger's event bus. Each due tier runs on its own task; sweeps still
    /// in flight at shutdown are awaited before this returns.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.ledger().bus().subscribe();
        let started = Utc::now();
        info!(
            tick_secs = self.options.tick.as_secs(),
            tiers = ?self.tiers(),
            "scheduler started"
        );

        let mut ticker = tokio::time::interval(self.options.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut sweeps = JoinSet::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                event = events.recv() => match event {
                    Ok(Event::Shutdown) | Err(RecvError::Closed) => break,
                    _ => continue,
                },
            }

            while let Some(joined) = sweeps.try_join_next() {
                log_join_error(joined);
            }

            let now = Utc::now();
            self.ledger().bus().publish(Event::Heartbeat { timestamp: now });

            for tier in self.due_tiers(started, now) {
                if self.in_flight.lock().contains(&tier) {
                    debug!(%tier, "previous sweep still running, skipping");
                    continue;
                }
                let this = self.clone();
                sweeps.spawn(async move {
                    match this.run_tier_once(tier).await {
                        Ok(report) if report.is_failed() => warn!(
                            %tier,
                            error = report.discovery_error.as_deref().unwrap_or_default(),
                            "sweep failed"
                        ),
                        Ok(_) => {}
                        Err(e) => error!(%tier, error = %e, "sweep did not run"),
                    }
                });
            }
        }

        if !sweeps.is_empty() {
            info!(running = sweeps.len(), "waiting for in-flight sweeps");
        }
        while let Some(joined) = sweeps.join_next().await {
            log_join_error(joined);
        }
        info!("scheduler stopped");
    }

    /// Tiers whose next fire time has passed; marks them fired.
    fn due_tiers(&self, started: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Tier> {
        let mut last_fired = self.last_fired.lock();
        let mut due = Vec::new();
        for (tier, registration) in &self.tiers {
            let since = last_fired.get(tier).copied().unwrap_or(started);
            if registration.is_due(since, now) {
                last_fired.insert(*tier, now);
                due.push(*tier);
            }
        }
        due.sort();
        due
    }

    /// Run one sweep of `tier` now: discovery, per-candidate handling, then
    /// housekeeping. Fails only if the tier is unknown or already running.
    pub async fn run_tier_once(&self, tier: Tier) -> Result<SweepReport> {
        let registration = self
            .tiers
            .get(&tier)
            .ok_or_else(|| WardenError::Scheduler(format!("tier {tier} is not registered")))?;
        let _guard = InFlight::acquire(&self.in_flight, tier)?;

        let started_at = Utc::now();
        let mut report = SweepReport::new(tier, started_at);
        info!(%tier, provider = registration.provider.name(), "sweep started");

        let flagged = self.flagged_conditions();
        if tier == Tier::Remediation && flagged.is_empty() {
            debug!(%tier, "no flagged conditions, skipping discovery");
            report.skipped = true;
        } else {
            let ctx = TierContext {
                tier,
                fired_at: started_at,
                flagged_conditions: if tier == Tier::Remediation {
                    flagged.clone()
                } else {
                    Vec::new()
                },
            };
            let provider = registration.provider.clone();
            let discovery = self
                .options
                .retry
                .run("discover", || {
                    let provider = provider.clone();
                    let ctx = ctx.clone();
                    async move { provider.discover(&ctx).await }
                })
                .await;

            match discovery {
                Ok(discovery) => {
                    let mut new_flags = discovery.findings;
                    for spec in discovery.candidates {
                        let outcome = self.process_candidate(&spec).await;
                        if !outcome.is_success() && registration.provider.flags_on_failure(&spec) {
                            new_flags.push(format!("failed: {}", spec.description));
                        }
                        report.outcomes.push(outcome);
                    }
                    if tier == Tier::Diagnostics {
                        *self.flags.lock() = new_flags.clone();
                        report.flagged = new_flags;
                    } else {
                        report.flagged = if tier == Tier::Remediation {
                            flagged
                        } else {
                            new_flags
                        };
                    }
                }
                Err(exhausted) => {
                    error!(
                        %tier,
                        attempts = exhausted.attempts,
                        error = %exhausted.error,
                        "candidate discovery failed"
                    );
                    self.ledger().bus().publish(Event::SweepFailed {
                        tier,
                        attempts: exhausted.attempts,
                        error: exhausted.error.to_string(),
                    });
                    report.discovery_error = Some(exhausted.error.to_string());
                    if tier == Tier::Diagnostics {
                        let cleared = std::mem::take(&mut *self.flags.lock());
                        if !cleared.is_empty() {
                            warn!(%tier, cleared = cleared.len(), "flagged conditions cleared");
                        }
                    }
                }
            }
        }

        report.total = report.outcomes.len();
        report.successful = report.outcomes.iter().filter(|o| o.is_success()).count();
        report.failed = report.total - report.successful;

        report.housekeeping = self.housekeeping(Utc::now()).await;

        if !report.is_failed() {
            self.ledger().bus().publish(Event::SweepCompleted {
                tier,
                total: report.total,
                successful: report.successful,
                failed: report.failed,
            });
        }
        info!(
            %tier,
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            flagged = report.flagged.len(),
            dispatched = report.housekeeping.dispatched.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Create one candidate and, when policy allows, run it. Never errors.
    async fn process_candidate(&self, spec: &ActionSpec) -> ActionOutcome {
        let description = spec.description.as_str();
        let action = match self.ledger().create(spec.clone()).await {
            Ok(action) => action,
            Err(e) => {
                warn!(description, error = %e, "candidate not recorded");
                return ActionOutcome::failed(description, None, &e);
            }
        };

        if action.autonomy != AutonomyDecision::AutoExecute {
            return ActionOutcome::ok(description, action.id, OutcomeKind::AwaitingApproval);
        }

        match self.ledger().approve(action.id, AUTO_EXECUTE_ACTOR).await {
            Ok(_) => {}
            // Housekeeping elsewhere got to it first; the claim decides who runs it.
            Err(WardenError::InvalidTransition {
                from:
                    ActionStatus::Approved
                    | ActionStatus::Executing
                    | ActionStatus::Executed
                    | ActionStatus::Failed,
                ..
            }) => {}
            Err(e) => return ActionOutcome::failed(description, Some(action.id), &e),
        }
        self.execute(description, action.id).await
    }

    async fn execute(&self, description: &str, id: Uuid) -> ActionOutcome {
        match self.coordinator.execute(id).await {
            Ok(Execution::Finished(outcome)) if outcome.success() => {
                ActionOutcome::ok(description, id, OutcomeKind::Executed)
            }
            Ok(Execution::Finished(outcome)) => ActionOutcome {
                description: description.to_string(),
                action_id: Some(id),
                kind: OutcomeKind::Failed,
                error: outcome.result.error,
            },
            Ok(Execution::NotClaimed { .. }) => {
                ActionOutcome::ok(description, id, OutcomeKind::NotClaimed)
            }
            Err(e) => {
                warn!(action_id = %id, error = %e, "execution did not complete");
                ActionOutcome::failed(description, Some(id), &e)
            }
        }
    }

    /// Time-triggered transitions and dispatch. Each step is retried on
    /// infrastructure errors; a step that still fails is recorded and the
    /// remaining steps run anyway.
    pub async fn housekeeping(&self, now: DateTime<Utc>) -> Housekeeping {
        let mut hk = Housekeeping::default();
        let retry = &self.options.retry;
        let ledger = self.ledger();

        match retry.run("expire_sweep", move || ledger.expire_sweep(now)).await {
            Ok(ids) => hk.expired = ids,
            Err(e) => hk.errors.push(format!("expiry: {}", e.error)),
        }
        match retry.run("auto_approve_sweep", move || ledger.auto_approve_sweep(now)).await {
            Ok(ids) => hk.auto_approved = ids,
            Err(e) => hk.errors.push(format!("auto-approval: {}", e.error)),
        }
        let stale_after = self.options.stale_after;
        match retry
            .run("recover_stale_claims", move || {
                ledger.recover_stale_claims(now, stale_after)
            })
            .await
        {
            Ok(ids) => hk.recovered = ids,
            Err(e) => hk.errors.push(format!("stale-claim recovery: {}", e.error)),
        }

        if self.options.dispatch_approved {
            match self.dispatch(now).await {
                Ok(outcomes) => hk.dispatched = outcomes,
                Err(e) => hk.errors.push(format!("dispatch: {e}")),
            }
        }

        for err in &hk.errors {
            error!(error = %err, "housekeeping step failed");
        }
        if !hk.auto_approved.is_empty() || !hk.expired.is_empty() || !hk.recovered.is_empty() {
            info!(
                auto_approved = hk.auto_approved.len(),
                expired = hk.expired.len(),
                recovered = hk.recovered.len(),
                "housekeeping applied transitions"
            );
        }
        hk
    }

    /// Run every approved action, and every pending auto-execute action
    /// that was proposed outside a sweep.
    async fn dispatch(&self, now: DateTime<Utc>) -> Result<Vec<ActionOutcome>> {
        let ledger = self.ledger();
        let mut outcomes = Vec::new();

        for action in ledger.list_by_status(ActionStatus::Pending).await? {
            if action.autonomy != AutonomyDecision::AutoExecute || action.is_expired(now) {
                continue;
            }
            match ledger.approve(action.id, AUTO_EXECUTE_ACTOR).await {
                // Lost to a concurrent decision; the next listing sees its new state.
                Ok(_) | Err(WardenError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        for action in ledger.list_by_status(ActionStatus::Approved).await? {
            outcomes.push(self.execute(&action.description, action.id).await);
        }
        Ok(outcomes)
    }
}

/// Marks a tier as running for the lifetime of the guard.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Tier>>,
    tier: Tier,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<Tier>>, tier: Tier) -> Result<Self> {
        if !set.lock().insert(tier) {
            return Err(WardenError::Scheduler(format!(
                "{tier} sweep is already running"
            )));
        }
        Ok(Self { set, tier })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.tier);
    }
}
