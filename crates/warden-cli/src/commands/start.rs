use console::style;
use tracing::{info, warn};

use warden_config::WardenConfig;
use warden_core::{Event, Tier};
use warden_runtime::Governance;

pub(super) async fn cmd_start(config: WardenConfig) -> warden_core::Result<()> {
    println!("{} v{}", style("Warden").bold(), env!("CARGO_PKG_VERSION"));
    println!("   Store: {}", config.store.db_path.display());
    for tier in Tier::ALL {
        let tier_config = config.scheduler.tier(tier);
        if tier_config.enabled {
            println!(
                "   {tier}: {} ({} candidates)",
                tier_config.cron,
                tier_config.candidates.len()
            );
        } else {
            println!("   {tier}: {}", style("on demand only").dim());
        }
    }
    println!();

    let gov = Governance::from_config(config)?;

    let recorder = gov
        .audit_recorder()
        .map(|recorder| recorder.spawn());
    let scheduler = tokio::spawn(gov.scheduler().run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    gov.bus().publish(Event::Shutdown);

    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    if let Some(recorder) = recorder {
        if let Err(e) = recorder.await {
            warn!(error = %e, "audit recorder ended abnormally");
        }
    }
    println!("Stopped.");
    Ok(())
}
