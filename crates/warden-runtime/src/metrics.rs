use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use warden_core::{ActionStatus, ActionType, Result};
use warden_store::{ActionFilter, ActionStore, TimeField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFailures {
    pub action_type: ActionType,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyBucket {
    /// Start of the hour (UTC).
    pub hour: DateTime<Utc>,
    pub executed: usize,
    pub failed: usize,
}

/// Execution history over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub window_hours: u32,
    pub since: DateTime<Utc>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total * 100`; 100 when nothing ran.
    pub success_rate: f64,
    /// Most failing first.
    pub failures_by_type: Vec<TypeFailures>,
    /// Non-empty hours only, oldest first.
    pub hourly: Vec<HourlyBucket>,
    /// Mean `execution_time_ms` of successful executions.
    pub avg_execution_time_ms: Option<f64>,
    /// Actions currently waiting for a decision.
    pub pending: usize,
    /// Approved actions not yet claimed.
    pub approved: usize,
}

/// Read-only queries over the ledger's store.
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn ActionStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self { store }
    }

    pub async fn collect(&self, window_hours: u32) -> Result<MetricsReport> {
        self.collect_at(window_hours, Utc::now()).await
    }

    pub async fn collect_at(&self, window_hours: u32, now: DateTime<Utc>) -> Result<MetricsReport> {
        let since = Duration::try_hours(i64::from(window_hours))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let rows = self
            .store
            .list(&ActionFilter {
                since: Some(since),
                time_field: TimeField::ExecutedAt,
                ..Default::default()
            })
            .await?;

        let mut successful = 0;
        let mut failed = 0;
        let mut durations: Vec<u64> = Vec::new();
        let mut by_type: HashMap<ActionType, usize> = HashMap::new();
        let mut hourly: BTreeMap<DateTime<Utc>, HourlyBucket> = BTreeMap::new();

        for action in &rows {
            let Some(executed_at) = action.executed_at else {
                continue;
            };
            let succeeded = match action.status {
                ActionStatus::Executed => true,
                ActionStatus::Failed => false,
                _ => continue,
            };

            let hour = executed_at
                .duration_trunc(Duration::hours(1))
                .unwrap_or(executed_at);
            let bucket = hourly.entry(hour).or_insert_with(|| HourlyBucket {
                hour,
                executed: 0,
                failed: 0,
            });

            if succeeded {
                successful += 1;
                bucket.executed += 1;
                if let Some(ms) = action.execution_time_ms {
                    durations.push(ms);
                }
            } else {
                failed += 1;
                bucket.failed += 1;
                *by_type.entry(action.action_type).or_default() += 1;
            }
        }

        let total = successful + failed;
        let success_rate = if total == 0 {
            100.0
        } else {
            successful as f64 / total as f64 * 100.0
        };

        let mut failures_by_type: Vec<TypeFailures> = by_type
            .into_iter()
            .map(|(action_type, failures)| TypeFailures {
                action_type,
                failures,
            })
            .collect();
        failures_by_type.sort_by(|a, b| {
            b.failures
                .cmp(&a.failures)
                .then_with(|| a.action_type.as_str().cmp(b.action_type.as_str()))
        });

        let avg_execution_time_ms = (!durations.is_empty())
            .then(|| durations.iter().sum::<u64>() as f64 / durations.len() as f64);

        let pending = self.store.list(&ActionFilter::status(ActionStatus::Pending)).await?.len();
        let approved = self.store.list(&ActionFilter::status(ActionStatus::Approved)).await?.len();

        Ok(MetricsReport {
            window_hours,
            since,
            total,
            successful,
            failed,
            success_rate,
            failures_by_type,
            hourly: hourly.into_values().collect(),
            avg_execution_time_ms,
            pending,
            approved,
        })
    }
}
