//! Query command
//!
//! Usage: snaplake query --sql <SQL> [--snapshot <ALIAS>=<DATASOURCE>[@<YYYY-MM-DD>]]...
//!
//! Each `--snapshot` mounts a completed snapshot as schema `ALIAS`. Without a
//! date the latest completed snapshot is used. Results print as JSON.

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::Args;
use snaplake_core::model::{SnapshotMeta, SnapshotStatus};
use snaplake_engine::{QueryRequest, Runtime, SnapshotSelection, SnapshotViews};
use std::str::FromStr;

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// A single SELECT or WITH statement
    #[arg(long)]
    pub sql: String,

    /// `alias=datasource` or `alias=datasource@YYYY-MM-DD`; repeatable
    #[arg(long = "snapshot")]
    pub snapshots: Vec<SnapshotRef>,

    #[arg(long, default_value_t = 100)]
    pub limit: u64,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub alias: String,
    pub datasource: String,
    pub date: Option<NaiveDate>,
}

impl FromStr for SnapshotRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alias, target) = s
            .split_once('=')
            .ok_or_else(|| format!("expected alias=datasource[@date], got '{}'", s))?;
        let (datasource, date) = match target.rsplit_once('@') {
            Some((name, date)) => {
                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map_err(|e| format!("invalid date '{}': {}", date, e))?;
                (name, Some(date))
            }
            None => (target, None),
        };
        if alias.trim().is_empty() || datasource.trim().is_empty() {
            return Err(format!("expected alias=datasource[@date], got '{}'", s));
        }
        Ok(Self {
            alias: alias.trim().to_string(),
            datasource: datasource.trim().to_string(),
            date,
        })
    }
}

/// Latest COMPLETED snapshot by logical date, then start time
fn latest_completed(snapshots: Vec<SnapshotMeta>) -> Option<SnapshotMeta> {
    snapshots
        .into_iter()
        .filter(|s| s.status() == SnapshotStatus::Completed)
        .max_by(|a, b| {
            a.snapshot_date()
                .cmp(&b.snapshot_date())
                .then_with(|| a.started_at().cmp(&b.started_at()))
        })
}

fn resolve(runtime: &Runtime, reference: &SnapshotRef) -> anyhow::Result<SnapshotMeta> {
    let datasource = runtime
        .datasources
        .find_by_name(&reference.datasource)?
        .ok_or_else(|| anyhow!("Datasource '{}' does not exist", reference.datasource))?;

    let found = match reference.date {
        Some(date) => runtime.snapshots.find_completed_on(datasource.id(), date)?,
        None => latest_completed(runtime.snapshots.list_by_datasource(datasource.id())?),
    };
    found.ok_or_else(|| match reference.date {
        Some(date) => anyhow!(
            "No completed snapshot of '{}' on {}",
            reference.datasource,
            date
        ),
        None => anyhow!("No completed snapshot of '{}'", reference.datasource),
    })
}

pub async fn execute(runtime: &Runtime, args: QueryArgs) -> anyhow::Result<()> {
    let services = runtime.services()?;

    let mut selections = Vec::with_capacity(args.snapshots.len());
    for reference in &args.snapshots {
        let snapshot = resolve(runtime, reference)
            .with_context(|| format!("resolving --snapshot {}", reference.alias))?;
        selections.push(SnapshotSelection::new(reference.alias.clone(), snapshot));
    }

    let mut request = QueryRequest::new(args.sql);
    request.limit = args.limit;
    request.offset = args.offset;
    request.storage = Some(services.storage_config.clone());
    request.view_setup = SnapshotViews::statements(&selections, services.storage.as_ref()).await?;

    let result = services.sandbox.execute_query(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
