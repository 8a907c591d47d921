//! Snapshot command
//!
//! Usage: snaplake snapshot [--datasource <NAME|all>]
//!
//! With `all` every enabled datasource is snapshotted in turn. A failure is
//! reported and the batch moves on; the exit status is non-zero if any run
//! did not complete. A named datasource must be enabled.

use anyhow::{anyhow, bail};
use clap::Args;
use snaplake_core::model::{Datasource, SnapshotMeta, SnapshotStatus};
use snaplake_engine::errors::Result;
use snaplake_engine::{Runtime, SnapshotOrchestrator};

pub const ALL: &str = "all";

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Datasource name, or `all` for every enabled datasource
    #[arg(long, default_value = ALL)]
    pub datasource: String,
}

fn report(datasource: &Datasource, outcome: &Result<SnapshotMeta>) {
    match outcome {
        Ok(snapshot) => {
            let rows: u64 = snapshot.tables().iter().map(|t| t.row_count).sum();
            println!(
                "{}\t{}\t{}\ttables={}\trows={}",
                datasource.name(),
                snapshot.status(),
                snapshot.id(),
                snapshot.tables().len(),
                rows
            );
            if let Some(message) = snapshot.error_message() {
                println!("  error: {}", message);
            }
        }
        Err(e) => println!("{}\tERROR\t{}", datasource.name(), e),
    }
}

fn completed(outcome: &Result<SnapshotMeta>) -> bool {
    matches!(outcome, Ok(s) if s.status() == SnapshotStatus::Completed)
}

async fn snapshot_one(orchestrator: &SnapshotOrchestrator, datasource: &Datasource) -> bool {
    let outcome = orchestrator.take_snapshot(datasource.id()).await;
    if let Err(e) = &outcome {
        tracing::warn!(datasource_id = datasource.id(), error = %e, "Snapshot not started");
    }
    report(datasource, &outcome);
    completed(&outcome)
}

pub async fn execute(runtime: &Runtime, args: SnapshotArgs) -> anyhow::Result<()> {
    let services = runtime.services()?;

    if args.datasource.eq_ignore_ascii_case(ALL) {
        let targets: Vec<Datasource> = services
            .datasources
            .list()?
            .into_iter()
            .filter(Datasource::is_enabled)
            .collect();
        if targets.is_empty() {
            println!("No enabled datasources");
            return Ok(());
        }

        let mut incomplete = 0;
        for datasource in &targets {
            if !snapshot_one(&services.orchestrator, datasource).await {
                incomplete += 1;
            }
        }
        if incomplete > 0 {
            bail!("{} of {} snapshots did not complete", incomplete, targets.len());
        }
        return Ok(());
    }

    let datasource = services
        .datasources
        .find_by_name(&args.datasource)?
        .ok_or_else(|| anyhow!("Datasource '{}' does not exist", args.datasource))?;
    if !datasource.is_enabled() {
        bail!(
            "Datasource '{}' is disabled; enable it with `snaplake datasource enable {}`",
            datasource.name(),
            datasource.name()
        );
    }
    if !snapshot_one(&services.orchestrator, &datasource).await {
        bail!("Snapshot of '{}' did not complete", datasource.name());
    }
    Ok(())
}
