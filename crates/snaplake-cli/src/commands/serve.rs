//! Serve command
//!
//! Usage: snaplake serve
//!
//! Runs the startup sequence, then keeps scheduled snapshots and the stale
//! sweep running until Ctrl-C.

use clap::Args;
use snaplake_engine::Runtime;

#[derive(Debug, Args)]
pub struct ServeArgs {}

pub async fn execute(runtime: &Runtime, _args: ServeArgs) -> anyhow::Result<()> {
    let services = runtime.services()?;
    let report = services.supervisor.start()?;
    println!(
        "SnapLake running: {} scheduled, {} recovered, {} credentials sealed",
        report.scheduled, report.recovered, report.sealed_credentials
    );
    for task in services.scheduler.list_scheduled() {
        println!("  {}\t{}", task.datasource_name, task.cron);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    services.supervisor.shutdown();
    Ok(())
}
