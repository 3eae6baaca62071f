//! Plain-text rendering for terminal output.

use console::{StyledObject, style};

use warden_core::{Action, ActionStatus, RiskLevel};
use warden_runtime::{MetricsReport, OutcomeKind, SweepReport};
use warden_store::AuditEntry;

pub fn status_label(status: ActionStatus) -> StyledObject<&'static str> {
    let label = style(status.as_str());
    match status {
        ActionStatus::Executed => label.green(),
        ActionStatus::Failed | ActionStatus::Rejected => label.red(),
        ActionStatus::Pending | ActionStatus::Approved => label.yellow(),
        ActionStatus::Executing => label.cyan(),
        ActionStatus::Cancelled => label.dim(),
    }
}

pub fn risk_label(risk: RiskLevel) -> StyledObject<&'static str> {
    let label = style(risk.as_str());
    match risk {
        RiskLevel::Low => label.green(),
        RiskLevel::Medium => label.yellow(),
        RiskLevel::High => label.red(),
        RiskLevel::Critical => label.red().bold(),
    }
}

/// One line per action: short id, status, risk, type, description.
pub fn action_row(action: &Action) -> String {
    format!(
        "{}  {:<10} {:<8} {:<20} {}",
        short_id(&action.id.to_string()),
        status_label(action.status),
        risk_label(action.risk_level),
        action.action_type.as_str(),
        truncate_output(&action.description, 60),
    )
}

pub fn action_detail(action: &Action) -> String {
    let mut out = Vec::new();
    out.push(format!("{}", style(&action.description).bold()));
    out.push(format!("  id:           {}", action.id));
    out.push(format!("  status:       {}", status_label(action.status)));
    out.push(format!("  risk:         {}", risk_label(action.risk_level)));
    out.push(format!("  type:         {}", action.action_type));
    out.push(format!("  autonomy:     {}", action.autonomy));
    out.push(format!("  origin:       {}", action.origin));
    out.push(format!("  command:      {}", action.command));
    if let Some(ref rollback) = action.rollback_command {
        out.push(format!("  rollback:     {rollback}"));
    }
    out.push(format!(
        "  requested:    {} by {}",
        action.requested_at.to_rfc3339(),
        action.requested_by
    ));
    out.push(format!("  expires:      {}", action.expires_at.to_rfc3339()));
    if let Some(at) = action.auto_approve_after {
        out.push(format!("  auto-approve: {}", at.to_rfc3339()));
    }
    if let (Some(by), Some(at)) = (&action.approved_by, action.approved_at) {
        out.push(format!("  approved:     {} by {by}", at.to_rfc3339()));
    }
    if let (Some(by), Some(at)) = (&action.rejected_by, action.rejected_at) {
        out.push(format!(
            "  rejected:     {} by {by}: {}",
            at.to_rfc3339(),
            action.rejection_reason.as_deref().unwrap_or("")
        ));
    }
    if let (Some(by), Some(at)) = (&action.cancelled_by, action.cancelled_at) {
        out.push(format!(
            "  cancelled:    {} by {by}: {}",
            at.to_rfc3339(),
            action.cancellation_reason.as_deref().unwrap_or("")
        ));
    }
    if action.checkpoint_data.is_some() {
        out.push("  checkpoint:   recorded".to_string());
    }
    if let Some(ref result) = action.execution_result {
        out.push(format!(
            "  result:       exit={} duration={}ms{}",
            result
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into()),
            result.duration_ms,
            if result.timed_out { " (timed out)" } else { "" }
        ));
        if let Some(ref error) = result.error {
            out.push(format!("  error:        {}", style(error).red()));
        }
        if !result.stdout.is_empty() {
            out.push(format!("  stdout:       {}", truncate_output(&result.stdout, 120)));
        }
        if !result.stderr.is_empty() {
            out.push(format!("  stderr:       {}", truncate_output(&result.stderr, 120)));
        }
        if let Some(ref rollback) = result.rollback {
            out.push(format!(
                "  rolled back:  {} ({})",
                rollback.command,
                if rollback.success { "ok" } else { "failed" }
            ));
        }
    }
    out.join("\n")
}

pub fn sweep_summary(report: &SweepReport) -> String {
    let mut out = Vec::new();
    if report.skipped {
        out.push(format!("{} sweep skipped: nothing flagged", report.tier));
    } else if let Some(ref error) = report.discovery_error {
        out.push(format!(
            "{} sweep {}: {error}",
            report.tier,
            style("failed").red()
        ));
    } else {
        out.push(format!(
            "{} sweep: {} candidates, {} ok, {} failed",
            report.tier,
            report.total,
            style(report.successful).green(),
            style(report.failed).red()
        ));
    }
    for outcome in &report.outcomes {
        let kind = match outcome.kind {
            OutcomeKind::Executed => style("executed").green(),
            OutcomeKind::AwaitingApproval => style("awaiting").yellow(),
            OutcomeKind::NotClaimed => style("claimed").dim(),
            OutcomeKind::Invalid => style("invalid").red(),
            OutcomeKind::Failed => style("failed").red(),
        };
        let mut line = format!("  {kind:<10} {}", outcome.description);
        if let Some(ref error) = outcome.error {
            line.push_str(&format!(": {}", truncate_output(error, 80)));
        }
        out.push(line);
    }
    for flag in &report.flagged {
        out.push(format!("  flagged: {flag}"));
    }
    let hk = &report.housekeeping;
    if !hk.auto_approved.is_empty() || !hk.expired.is_empty() || !hk.recovered.is_empty() {
        out.push(format!(
            "  housekeeping: {} auto-approved, {} expired, {} recovered",
            hk.auto_approved.len(),
            hk.expired.len(),
            hk.recovered.len()
        ));
    }
    if !hk.dispatched.is_empty() {
        out.push(format!("  dispatched: {}", hk.dispatched.len()));
    }
    for err in &hk.errors {
        out.push(format!("  {} {err}", style("housekeeping error:").red()));
    }
    out.join("\n")
}

pub fn metrics_summary(report: &MetricsReport) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "{} (last {}h)",
        style("Execution metrics").bold(),
        report.window_hours
    ));
    out.push(format!(
        "  total {}  ok {}  failed {}  success rate {:.1}%",
        report.total, report.successful, report.failed, report.success_rate
    ));
    if let Some(avg) = report.avg_execution_time_ms {
        out.push(format!("  avg execution time {avg:.0}ms"));
    }
    out.push(format!(
        "  waiting: {} pending, {} approved",
        report.pending, report.approved
    ));
    if !report.failures_by_type.is_empty() {
        out.push("  failures by type:".to_string());
        for f in &report.failures_by_type {
            out.push(format!("    {:<22} {}", f.action_type.as_str(), f.failures));
        }
    }
    if !report.hourly.is_empty() {
        out.push("  hourly:".to_string());
        for bucket in &report.hourly {
            out.push(format!(
                "    {}  {} ok  {} failed",
                bucket.hour.format("%Y-%m-%d %H:00"),
                bucket.executed,
                bucket.failed
            ));
        }
    }
    out.join("\n")
}

pub fn audit_row(entry: &AuditEntry) -> String {
    let kind = match entry.event_type.as_str() {
        t if t.contains("failed") => style(t).red(),
        t if t.contains("approved") => style(t).yellow(),
        t if t.starts_with("action") => style(t).cyan(),
        t => style(t).white(),
    };
    let action = entry.action_id.as_deref().map(short_id).unwrap_or_default();
    format!("{}  {kind}  {action}", style(&entry.timestamp).dim())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate to `max` characters on one line, appending "..." if truncated.
pub fn truncate_output(s: &str, max: usize) -> String {
    let flat = s.trim().replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        format!("{}...", flat.chars().take(max).collect::<String>())
    }
}
