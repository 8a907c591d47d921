//! System setup command
//!
//! Usage: snaplake setup --username <NAME> --password <PASSWORD> [--storage-path <DIR>]

use clap::Args;
use snaplake_core_types::Sensitive;
use snaplake_engine::Runtime;

#[derive(Debug, Args)]
pub struct SetupArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub password: String,

    /// Local lake directory
    #[arg(long)]
    pub storage_path: Option<String>,
}

pub fn execute(runtime: &Runtime, args: SetupArgs) -> anyhow::Result<()> {
    let password = Sensitive::new(args.password);
    let user = runtime
        .setup()
        .initialize(&args.username, &password, args.storage_path.as_deref())?;

    println!("System initialized");
    println!("  user: {} ({})", user.username, user.id);
    let storage = runtime.storage_config()?;
    println!(
        "  storage: {} at {}",
        storage.kind,
        storage.local_path.as_deref().unwrap_or_default()
    );
    Ok(())
}
