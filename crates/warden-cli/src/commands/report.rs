use console::style;

use warden_config::WardenConfig;
use warden_runtime::Governance;
use warden_store::SqliteStore;

use super::render;

pub(super) async fn cmd_metrics(
    config: WardenConfig,
    window_hours: Option<u32>,
    json: bool,
) -> warden_core::Result<()> {
    let gov = Governance::from_config(config)?;
    let report = gov.metrics(window_hours).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render::metrics_summary(&report));
    }
    Ok(())
}

pub(super) fn cmd_logs(
    config: WardenConfig,
    limit: usize,
    event_type: Option<String>,
    json: bool,
) -> warden_core::Result<()> {
    let store = SqliteStore::open(&config.store.db_path)?;
    let entries = store.audit_log(limit, event_type.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!(
            "No audit log entries{}",
            event_type
                .as_ref()
                .map(|t| format!(" matching '{t}'"))
                .unwrap_or_default()
        );
        return Ok(());
    }

    println!("{} ({} entries)", style("Audit Log").bold(), entries.len());
    println!("{}", "-".repeat(80));
    for entry in &entries {
        println!("{}", render::audit_row(entry));
        if let Some(ref details) = entry.details {
            println!("   {}", style(render::truncate_output(details, 120)).dim());
        }
    }

    if let Some(broken) = store.verify_audit_chain()? {
        println!();
        println!(
            "{} audit chain broken at entry {broken}",
            style("warning:").red().bold()
        );
    }
    Ok(())
}
