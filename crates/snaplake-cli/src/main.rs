//! SnapLake CLI
//!
//! Command-line interface for SnapLake

use clap::{Parser, Subcommand};
use snaplake_core::logging_facility;
use snaplake_core::AppConfig;
use snaplake_engine::Runtime;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "snaplake")]
#[command(about = "SnapLake - Relational snapshots into a queryable Parquet lake", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./snaplake.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the operator account and local lake storage
    Setup(commands::setup::SetupArgs),
    /// Snapshot one datasource or all enabled ones
    Snapshot(commands::snapshot::SnapshotArgs),
    /// Manage datasources
    Datasource(commands::datasource::DatasourceArgs),
    /// Run read-only SQL against snapshots
    Query(commands::query::QueryArgs),
    /// Run the scheduler and recovery sweep until interrupted
    Serve(commands::serve::ServeArgs),
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    logging_facility::init(config.profile);
    let runtime = Runtime::open(config)?;

    match cli.command {
        Commands::Setup(args) => commands::setup::execute(&runtime, args),
        Commands::Snapshot(args) => commands::snapshot::execute(&runtime, args).await,
        Commands::Datasource(args) => commands::datasource::execute(&runtime, args).await,
        Commands::Query(args) => commands::query::execute(&runtime, args).await,
        Commands::Serve(args) => commands::serve::execute(&runtime, args).await,
    }
}

#[tokio::main]
async fn main() {
    // A missing .env is normal
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
