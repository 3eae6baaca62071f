use console::style;
use uuid::Uuid;

use warden_config::WardenConfig;
use warden_core::{ActionSpec, ActionStatus, Tier};
use warden_runtime::{Execution, Governance};
use warden_store::ActionFilter;

use super::render;

pub(super) async fn cmd_propose(config: WardenConfig, spec: ActionSpec) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let action = gov.audited(gov.propose(spec)).await?;

    match action.status {
        ActionStatus::Pending => {
            println!(
                "Proposed {} ({}), waiting for approval",
                style(action.id).bold(),
                action.autonomy
            );
            if let Some(at) = action.auto_approve_after {
                println!("   Auto-approves after {}", at.to_rfc3339());
            }
            println!("   Expires {}", action.expires_at.to_rfc3339());
        }
        _ => println!("{}", render::action_detail(&action)),
    }
    Ok(())
}

pub(super) async fn cmd_list(
    config: WardenConfig,
    filter: ActionFilter,
    json: bool,
) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let actions = gov.list(&filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
        return Ok(());
    }
    if actions.is_empty() {
        println!("No actions.");
        return Ok(());
    }
    for action in &actions {
        println!("{}", render::action_row(action));
    }
    Ok(())
}

pub(super) async fn cmd_show(config: WardenConfig, id: Uuid, json: bool) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let action = gov.get(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&action)?);
    } else {
        println!("{}", render::action_detail(&action));
    }
    Ok(())
}

pub(super) async fn cmd_approve(
    config: WardenConfig,
    id: Uuid,
    by: &str,
    execute: bool,
) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    if !execute {
        let action = gov.audited(gov.approve(id, by)).await?;
        println!("Approved {} by {by}", style(action.id).bold());
        return Ok(());
    }
    let execution = gov.audited(gov.approve_and_execute(id, by)).await?;
    print_execution(&gov, execution).await
}

pub(super) async fn cmd_reject(
    config: WardenConfig,
    id: Uuid,
    by: &str,
    reason: &str,
) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let action = gov.audited(gov.reject(id, by, reason)).await?;
    println!("Rejected {}: {reason}", style(action.id).bold());
    Ok(())
}

pub(super) async fn cmd_cancel(
    config: WardenConfig,
    id: Uuid,
    by: &str,
    reason: Option<&str>,
) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let action = gov.audited(gov.cancel(id, by, reason)).await?;
    println!("Cancelled {}", style(action.id).bold());
    Ok(())
}

pub(super) async fn cmd_execute(config: WardenConfig, id: Uuid) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let execution = gov.audited(gov.execute(id)).await?;
    print_execution(&gov, execution).await
}

async fn print_execution(gov: &Governance, execution: Execution) -> warden_core::Result<()> {
    match execution {
        Execution::Finished(outcome) => {
            let action = gov.get(outcome.action_id).await?;
            println!("{}", render::action_detail(&action));
        }
        Execution::NotClaimed { action_id } => {
            println!("{action_id} was already claimed by another worker");
        }
    }
    Ok(())
}

pub(super) async fn cmd_sweep(config: WardenConfig, tier: Tier, json: bool) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    // Remediation reads the flags left by diagnostics in the same process.
    let (diagnostics, report) = gov
        .audited(async {
            let diagnostics = match tier {
                Tier::Remediation => Some(gov.sweep(Tier::Diagnostics).await?),
                _ => None,
            };
            Ok::<_, warden_core::WardenError>((diagnostics, gov.sweep(tier).await?))
        })
        .await?;
    if let Some(diagnostics) = diagnostics.filter(|_| !json) {
        println!("{}", render::sweep_summary(&diagnostics));
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render::sweep_summary(&report));
    }
    Ok(())
}

pub(super) async fn cmd_housekeeping(config: WardenConfig) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let hk = gov.audited(gov.housekeeping()).await;
    println!(
        "{} auto-approved, {} expired, {} recovered, {} dispatched",
        hk.auto_approved.len(),
        hk.expired.len(),
        hk.recovered.len(),
        hk.dispatched.len()
    );
    for err in &hk.errors {
        eprintln!("{} {err}", style("error:").red());
    }
    Ok(())
}
