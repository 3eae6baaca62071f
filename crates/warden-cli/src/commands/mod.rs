use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use std::path::PathBuf;
use uuid::Uuid;

use warden_config::{ConfigLoader, WardenConfig, WarningSeverity};
use warden_core::{ActionStatus, ActionType, RiskLevel, Tier};

mod actions;
pub mod render;
mod report;
mod start;

/// Warden: action governance and autonomous execution engine
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tiered scheduler until Ctrl-C
    Start,
    /// Run one sweep of a tier now: diagnostics, remediation or maintenance
    Sweep {
        tier: Tier,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run auto-approval, expiry, stale-claim recovery and dispatch once
    Housekeeping,
    /// Propose an action. Low-risk proposals run immediately.
    Propose {
        /// Shell command to run
        command: String,
        /// Human-readable description
        #[arg(short, long)]
        description: String,
        /// command_execution, deployment, configuration_change, system_modification
        #[arg(short = 't', long = "type", default_value = "command_execution")]
        action_type: ActionType,
        /// low, medium, high, critical
        #[arg(short, long, default_value = "low")]
        risk: RiskLevel,
        /// Compensating command, run if the action fails
        #[arg(long)]
        rollback: Option<String>,
        /// Who is asking
        #[arg(long, env = "WARDEN_ACTOR", default_value = "cli")]
        by: String,
        /// Requested on behalf of another agent; always waits for a human
        #[arg(long)]
        collaboration: bool,
    },
    /// List actions in the ledger
    List {
        #[arg(short, long)]
        status: Option<ActionStatus>,
        #[arg(short = 't', long = "type")]
        action_type: Option<ActionType>,
        #[arg(short, long)]
        risk: Option<RiskLevel>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one action in full
    Show {
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Approve a pending action
    Approve {
        id: Uuid,
        #[arg(long, env = "WARDEN_ACTOR", default_value = "cli")]
        by: String,
        /// Run it right away
        #[arg(long)]
        execute: bool,
    },
    /// Reject a pending action
    Reject {
        id: Uuid,
        #[arg(long)]
        reason: String,
        #[arg(long, env = "WARDEN_ACTOR", default_value = "cli")]
        by: String,
    },
    /// Cancel a pending or approved action
    Cancel {
        id: Uuid,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, env = "WARDEN_ACTOR", default_value = "cli")]
        by: String,
    },
    /// Run an approved action
    Execute { id: Uuid },
    /// Execution metrics over a trailing window
    Metrics {
        /// Window size in hours (default from config)
        #[arg(short, long)]
        window_hours: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent audit log entries
    Logs {
        /// Number of entries to show (default 50)
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Filter by event type (e.g. action_terminal, sweep_failed)
        #[arg(short = 't', long)]
        event_type: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and report issues
    Doctor,
    /// Initialize a new warden.toml in the current or home directory
    Init {
        /// Create in current directory instead of ~/.warden/
        #[arg(long)]
        local: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> warden_core::Result<()> {
        // Config first: it decides the log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };
        init_tracing(&config.logging.format, &log_level);

        match self.command {
            Commands::Start => start::cmd_start(config).await,
            Commands::Sweep { tier, json } => actions::cmd_sweep(config, tier, json).await,
            Commands::Housekeeping => actions::cmd_housekeeping(config).await,
            Commands::Propose {
                command,
                description,
                action_type,
                risk,
                rollback,
                by,
                collaboration,
            } => {
                let mut spec =
                    warden_core::ActionSpec::new(action_type, risk, command, description)
                        .requested_by(by);
                if let Some(rollback) = rollback {
                    spec = spec.with_rollback(rollback);
                }
                if collaboration {
                    spec = spec.with_origin(warden_core::ActionOrigin::Collaboration);
                }
                actions::cmd_propose(config, spec).await
            }
            Commands::List {
                status,
                action_type,
                risk,
                limit,
                json,
            } => {
                let filter = warden_store::ActionFilter {
                    status,
                    action_type,
                    risk_level: risk,
                    ..Default::default()
                }
                .with_limit(limit);
                actions::cmd_list(config, filter, json).await
            }
            Commands::Show { id, json } => actions::cmd_show(config, id, json).await,
            Commands::Approve { id, by, execute } => {
                actions::cmd_approve(config, id, &by, execute).await
            }
            Commands::Reject { id, reason, by } => {
                actions::cmd_reject(config, id, &by, &reason).await
            }
            Commands::Cancel { id, reason, by } => {
                actions::cmd_cancel(config, id, &by, reason.as_deref()).await
            }
            Commands::Execute { id } => actions::cmd_execute(config, id).await,
            Commands::Metrics { window_hours, json } => {
                report::cmd_metrics(config, window_hours, json).await
            }
            Commands::Logs {
                limit,
                event_type,
                json,
            } => report::cmd_logs(config, limit, event_type, json),
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Doctor => Self::cmd_doctor(config),
            Commands::Init { local } => Self::cmd_init(local),
            Commands::Completions { shell } => Self::cmd_completions(shell),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_config(config: WardenConfig, json: bool) -> warden_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| warden_core::WardenError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_doctor(config: WardenConfig) -> warden_core::Result<()> {
        println!("{}", style("Warden Doctor: configuration audit").bold());
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("  {}", style(e).red());
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        let scheduled: Vec<String> = Tier::ALL
            .into_iter()
            .filter(|tier| config.scheduler.tier(*tier).enabled)
            .map(|tier| format!("{tier} ({})", config.scheduler.tier(tier).cron))
            .collect();
        if scheduled.is_empty() {
            println!("  info: scheduler: no tier is enabled; sweeps only run on demand");
            info_count += 1;
        } else {
            println!("  scheduled tiers: {}", scheduled.join(", "));
        }

        println!();
        println!(
            "  {} warnings, {} suggestions",
            style(warn_count).yellow(),
            style(info_count).cyan()
        );
        Ok(())
    }

    fn cmd_init(local: bool) -> warden_core::Result<()> {
        let dir = if local {
            std::env::current_dir()?
        } else {
            ConfigLoader::home_dir()
        };
        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join("warden.toml");

        if config_path.exists() {
            println!("{} already exists", config_path.display());
            return Ok(());
        }

        std::fs::write(&config_path, STARTER_CONFIG)?;
        println!("Created {}", style(config_path.display()).green());
        Ok(())
    }

    fn cmd_version() -> warden_core::Result<()> {
        println!("Warden v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> warden_core::Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "warden", &mut std::io::stdout());
        Ok(())
    }
}

fn init_tracing(format: &str, level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

const STARTER_CONFIG: &str = r#"# Warden configuration

[ledger]
default_ttl_hours = 24
auto_approve_grace_minutes = 30
# stale_claim_secs = 3600

[execution]
timeout_secs = 300
deployment_timeout_secs = 900
# working_dir = "/srv/app"
# checkpoint_command = "git rev-parse HEAD"

[retry]
max_attempts = 3
base_backoff_ms = 500

[store]
db_path = "warden.db"

[scheduler]
tick_secs = 10

[scheduler.diagnostics]
cron = "*/5 * * * *"

[[scheduler.diagnostics.candidates]]
description = "disk usage"
command = "df -h /"

[scheduler.remediation]
cron = "*/15 * * * *"

# [[scheduler.remediation.candidates]]
# description = "prune docker images"
# command = "docker image prune -f"
# action_type = "system_modification"
# risk_level = "medium"

[scheduler.maintenance]
cron = "0 2 * * *"

[logging]
level = "info"
format = "pretty"
"#;
