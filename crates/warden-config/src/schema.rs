use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use warden_core::{ActionType, RiskLevel, Tier};

/// Root configuration: maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub ledger: LedgerConfig,
    pub execution: ExecutionConfig,
    pub retry: RetryConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

// ── Ledger ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Hours a pending action may wait for a decision before it is cancelled.
    pub default_ttl_hours: u64,
    /// Minutes after which a still-pending medium-risk action is approved by the system.
    pub auto_approve_grace_minutes: u64,
    /// Seconds an action may sit in `executing` before it is considered abandoned.
    pub stale_claim_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: 24,
            auto_approve_grace_minutes: 30,
            stale_claim_secs: 3600,
        }
    }
}

// ── Execution ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound for a single command, in seconds.
    pub timeout_secs: u64,
    /// Deployments tend to run longer; they get their own bound.
    pub deployment_timeout_secs: u64,
    /// Captured stdout/stderr is truncated to this many characters.
    pub max_output_chars: usize,
    /// Working directory for shell commands (None = inherit).
    pub working_dir: Option<PathBuf>,
    /// Optional command whose output is stored in checkpoints (e.g. a config backup).
    pub checkpoint_command: Option<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            deployment_timeout_secs: 900,
            max_output_chars: 10_000,
            working_dir: None,
            checkpoint_command: None,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout_for(&self, action_type: ActionType) -> std::time::Duration {
        let secs = match action_type {
            ActionType::Deployment => self.deployment_timeout_secs,
            ActionType::CommandExecution
            | ActionType::ConfigurationChange
            | ActionType::SystemModification => self.timeout_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}

// ── Retry ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per sweep when the candidate provider is unreachable.
    pub max_attempts: u32,
    /// Base backoff in milliseconds (doubles every attempt).
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the scheduler loop checks for due tiers.
    pub tick_secs: u64,
    /// Hand every approved action to the coordinator during housekeeping.
    pub dispatch_approved: bool,
    pub diagnostics: TierConfig,
    pub remediation: TierConfig,
    pub maintenance: TierConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            dispatch_approved: true,
            diagnostics: TierConfig::with_cron("*/5 * * * *"),
            remediation: TierConfig::with_cron("*/15 * * * *"),
            maintenance: TierConfig::with_cron("0 2 * * *"),
        }
    }
}

impl SchedulerConfig {
    pub fn tier(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Diagnostics => &self.diagnostics,
            Tier::Remediation => &self.remediation,
            Tier::Maintenance => &self.maintenance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron cadence; five-field expressions are accepted.
    pub cron: String,
    /// Statically declared candidates for this tier.
    #[serde(default)]
    pub candidates: Vec<CandidateConfig>,
}

impl TierConfig {
    fn with_cron(cron: &str) -> Self {
        Self {
            enabled: true,
            cron: cron.into(),
            candidates: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub rollback_command: Option<String>,
    #[serde(default = "default_action_type")]
    pub action_type: ActionType,
    #[serde(default = "default_risk_level")]
    pub risk_level: RiskLevel,
    /// When this candidate fails, the sweep flags a condition for remediation.
    #[serde(default = "default_true")]
    pub flag_on_failure: bool,
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("warden.db"),
        }
    }
}

// ── Metrics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub default_window_hours: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            default_window_hours: 24,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_action_type() -> ActionType {
    ActionType::CommandExecution
}

fn default_risk_level() -> RiskLevel {
    RiskLevel::Low
}

/// The `cron` crate expects a leading seconds field. Classic five-field
/// expressions get `0` seconds prepended; anything else passes through.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

/// Upper bound on `ledger.default_ttl_hours` (one year).
pub const MAX_TTL_HOURS: u64 = 24 * 365;
/// Upper bound on either command timeout (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;
/// Upper bound on `ledger.stale_claim_secs` (one week).
pub const MAX_STALE_CLAIM_SECS: u64 = 7 * 24 * 60 * 60;

impl WardenConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Ledger ───
        if self.ledger.default_ttl_hours == 0 {
            warnings.push(ConfigWarning {
                field: "ledger.default_ttl_hours".into(),
                message: "TTL is 0: every pending action would expire immediately".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 24".into()),
            });
        } else if self.ledger.default_ttl_hours > MAX_TTL_HOURS {
            warnings.push(ConfigWarning {
                field: "ledger.default_ttl_hours".into(),
                message: format!("TTL exceeds {MAX_TTL_HOURS} hours"),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 24".into()),
            });
        }
        if self.ledger.auto_approve_grace_minutes > MAX_TTL_HOURS * 60 {
            warnings.push(ConfigWarning {
                field: "ledger.auto_approve_grace_minutes".into(),
                message: format!("grace period exceeds {} minutes", MAX_TTL_HOURS * 60),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        }
        if self.ledger.auto_approve_grace_minutes == 0 {
            warnings.push(ConfigWarning {
                field: "ledger.auto_approve_grace_minutes".into(),
                message: "grace period is 0: medium-risk actions are approved on the next sweep".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Give humans a window to object, e.g. 30".into()),
            });
        } else if self.ledger.auto_approve_grace_minutes
            >= self.ledger.default_ttl_hours.saturating_mul(60)
        {
            warnings.push(ConfigWarning {
                field: "ledger.auto_approve_grace_minutes".into(),
                message: "grace period is not shorter than the TTL: actions expire before auto-approval".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Execution ───
        if self.execution.timeout_secs == 0 || self.execution.deployment_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "execution.timeout_secs".into(),
                message: "command timeouts must be greater than 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("No action may run unbounded; set e.g. 300".into()),
            });
        }
        let longest_timeout = self
            .execution
            .timeout_secs
            .max(self.execution.deployment_timeout_secs);
        if longest_timeout > MAX_TIMEOUT_SECS {
            warnings.push(ConfigWarning {
                field: "execution.timeout_secs".into(),
                message: format!("command timeouts may not exceed {MAX_TIMEOUT_SECS} seconds"),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.ledger.stale_claim_secs <= longest_timeout {
            warnings.push(ConfigWarning {
                field: "ledger.stale_claim_secs".into(),
                message: format!(
                    "stale-claim threshold ({}s) must exceed the longest command timeout ({longest_timeout}s)",
                    self.ledger.stale_claim_secs
                ),
                severity: WarningSeverity::Error,
                hint: Some("Running actions would be recovered as interrupted; set e.g. 3600".into()),
            });
        } else if self.ledger.stale_claim_secs > MAX_STALE_CLAIM_SECS {
            warnings.push(ConfigWarning {
                field: "ledger.stale_claim_secs".into(),
                message: format!("stale-claim threshold exceeds {MAX_STALE_CLAIM_SECS} seconds"),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Retry ───
        if self.retry.max_attempts == 0 {
            warnings.push(ConfigWarning {
                field: "retry.max_attempts".into(),
                message: "max_attempts is 0: sweeps would never call the candidate provider".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 3".into()),
            });
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            warnings.push(ConfigWarning {
                field: "retry.base_backoff_ms".into(),
                message: "base backoff exceeds max backoff".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Scheduler ───
        if self.scheduler.tick_secs == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.tick_secs".into(),
                message: "tick interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10".into()),
            });
        }
        for tier in Tier::ALL {
            let tier_config = self.scheduler.tier(tier);
            let field = format!("scheduler.{tier}");
            if tier_config.enabled
                && cron::Schedule::from_str(&normalize_cron(&tier_config.cron)).is_err()
            {
                warnings.push(ConfigWarning {
                    field: format!("{field}.cron"),
                    message: format!("invalid cron expression '{}'", tier_config.cron),
                    severity: WarningSeverity::Error,
                    hint: Some("Use e.g. '*/5 * * * *'".into()),
                });
            }
            for (i, candidate) in tier_config.candidates.iter().enumerate() {
                let cfield = format!("{field}.candidates[{i}]");
                if candidate.command.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        field: cfield.clone(),
                        message: "command is empty".into(),
                        severity: WarningSeverity::Error,
                        hint: None,
                    });
                }
                if candidate.risk_level == RiskLevel::Critical
                    && candidate.action_type.is_reversible()
                    && candidate.rollback_command.is_none()
                {
                    warnings.push(ConfigWarning {
                        field: cfield.clone(),
                        message: "critical reversible candidate has no rollback_command".into(),
                        severity: WarningSeverity::Error,
                        hint: None,
                    });
                }
                if tier == Tier::Diagnostics && candidate.risk_level > RiskLevel::Low {
                    warnings.push(ConfigWarning {
                        field: cfield,
                        message: format!(
                            "diagnostic candidate has {} risk: diagnostics should be read-only",
                            candidate.risk_level
                        ),
                        severity: WarningSeverity::Warning,
                        hint: Some("Move it to the remediation or maintenance tier".into()),
                    });
                }
            }
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
