//! Datasource management commands
//!
//! Usage:
//!   snaplake datasource add --name <NAME> --type <TYPE> --database <DB> [options]
//!   snaplake datasource list
//!   snaplake datasource enable|disable|remove|test <NAME>

use anyhow::anyhow;
use clap::{Args, Subcommand};
use snaplake_core::model::{Datasource, NewDatasource, RetentionPolicy, SourceType};
use snaplake_core_types::Sensitive;
use snaplake_engine::{DatasourceService, Runtime};

#[derive(Debug, Args)]
pub struct DatasourceArgs {
    #[command(subcommand)]
    pub command: DatasourceCommand,
}

#[derive(Debug, Subcommand)]
pub enum DatasourceCommand {
    /// Register a new datasource
    Add(AddArgs),
    /// List datasources
    List,
    /// Enable scheduled snapshots
    Enable(NameArg),
    /// Disable scheduled snapshots
    Disable(NameArg),
    /// Delete a datasource with its snapshots and lake files
    Remove(NameArg),
    /// Check that the source is reachable
    Test(NameArg),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub name: String,

    /// SQLITE, POSTGRESQL or MYSQL
    #[arg(long = "type")]
    pub source_type: String,

    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Defaults to the source type's standard port
    #[arg(long)]
    pub port: Option<u32>,

    /// Database name, or the file path for SQLite
    #[arg(long)]
    pub database: String,

    #[arg(long, default_value = "")]
    pub username: String,

    #[arg(long, default_value = "")]
    pub password: String,

    /// Schema to snapshot; repeatable
    #[arg(long = "schema")]
    pub schemas: Vec<String>,

    /// Restrict to these tables (`table` or `schema.table`); repeatable
    #[arg(long = "include")]
    pub include_tables: Vec<String>,

    /// Cron expression (5, 6 or 7 fields)
    #[arg(long)]
    pub cron: Option<String>,

    /// Daily snapshots to keep; 0 keeps all
    #[arg(long, default_value_t = 0)]
    pub daily_max: u32,

    /// Monthly snapshots to keep; 0 keeps all
    #[arg(long, default_value_t = 0)]
    pub monthly_max: u32,
}

#[derive(Debug, Args)]
pub struct NameArg {
    pub name: String,
}

impl AddArgs {
    fn into_new_datasource(self) -> anyhow::Result<NewDatasource> {
        let source_type: SourceType = self.source_type.parse()?;
        let schemas = if self.schemas.is_empty() {
            match source_type.default_schema() {
                // MySQL schemas are databases
                "" => vec![self.database.clone()],
                schema => vec![schema.to_string()],
            }
        } else {
            self.schemas
        };

        Ok(NewDatasource {
            name: self.name,
            source_type,
            host: self.host,
            port: self
                .port
                .unwrap_or_else(|| u32::from(source_type.default_port())),
            database: self.database,
            username: self.username,
            password: Sensitive::new(self.password),
            schemas,
            include_tables: (!self.include_tables.is_empty()).then_some(self.include_tables),
            cron: self.cron,
            retention: RetentionPolicy::new(self.daily_max, self.monthly_max),
        })
    }
}

fn by_name(service: &DatasourceService, name: &str) -> anyhow::Result<Datasource> {
    service
        .find_by_name(name)?
        .ok_or_else(|| anyhow!("Datasource '{}' does not exist", name))
}

pub async fn execute(runtime: &Runtime, args: DatasourceArgs) -> anyhow::Result<()> {
    let services = runtime.services()?;
    let service = &services.datasources;

    match args.command {
        DatasourceCommand::Add(add) => {
            let datasource = service.create(add.into_new_datasource()?)?;
            println!("Datasource created");
            println!("  id: {}", datasource.id());
            println!("  name: {}", datasource.name());
        }
        DatasourceCommand::List => {
            let datasources = service.list()?;
            if datasources.is_empty() {
                println!("No datasources");
            }
            for ds in datasources {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    ds.name(),
                    ds.source_type(),
                    if ds.is_enabled() { "enabled" } else { "disabled" },
                    ds.cron().unwrap_or("-"),
                    ds.id()
                );
            }
        }
        DatasourceCommand::Enable(arg) => {
            let ds = by_name(service, &arg.name)?;
            service.set_enabled(ds.id(), true)?;
            println!("Datasource '{}' enabled", ds.name());
        }
        DatasourceCommand::Disable(arg) => {
            let ds = by_name(service, &arg.name)?;
            service.set_enabled(ds.id(), false)?;
            println!("Datasource '{}' disabled", ds.name());
        }
        DatasourceCommand::Remove(arg) => {
            let ds = by_name(service, &arg.name)?;
            service.delete(ds.id()).await?;
            println!("Datasource '{}' removed", ds.name());
        }
        DatasourceCommand::Test(arg) => {
            let ds = by_name(service, &arg.name)?;
            let check = service.test_connection(ds.id()).await?;
            if !check.success {
                return Err(anyhow!("Connection to '{}' failed: {}", ds.name(), check.message));
            }
            println!("{}", check.message);
        }
    }
    Ok(())
}
