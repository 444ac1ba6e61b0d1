//! cfgstore CLI - read and write scoped configuration values
//!
//! Subcommands:
//! - `init`: create the backing table
//! - `get`: print the value stored for a scope and path
//! - `set`: insert or overwrite a value

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use cfgstore_core::{ConfigValue, ScopeId};
use cfgstore_db::{connect, create_config_table, DbStorage, SqlitePool, Tables};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cfgstore",
    author,
    version,
    about = "Scoped configuration values backed by SQLite"
)]
struct Cli {
    /// Config file (defaults to ~/.cfgstore/config.toml when present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Database URL, e.g. sqlite://config.db
    #[arg(long, global = true, env = "CFGSTORE_DATABASE_URL")]
    database: Option<String>,

    /// Override the backing table name
    #[arg(long, global = true)]
    table: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the configuration table if it does not exist
    Init,
    /// Print the value stored for a path
    Get(GetArgs),
    /// Store a value for a path
    Set(SetArgs),
}

#[derive(Parser, Debug)]
struct GetArgs {
    /// Scope, e.g. "default", "websites/1", "stores/2"
    scope: ScopeId,

    /// Configuration path, e.g. "general/locale/code"
    path: String,
}

#[derive(Parser, Debug)]
struct SetArgs {
    /// Scope, e.g. "default", "websites/1", "stores/2"
    scope: ScopeId,

    /// Configuration path, e.g. "general/locale/code"
    path: String,

    /// Value to store
    #[arg(required_unless_present = "null", conflicts_with = "null")]
    value: Option<String>,

    /// Store NULL instead of a value
    #[arg(long)]
    null: bool,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing().ok();
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(table) = cli.table {
        config.storage.table_name = Some(table);
    }
    let url = cli
        .database
        .or_else(|| config.database.url.clone())
        .context("No database configured\n\nPass --database or set CFGSTORE_DATABASE_URL")?;

    let pool = connect(&url, config.database.max_connections)
        .await
        .context(format!("Failed to open database: {}", url))?;

    match cli.command {
        Commands::Init => {
            let table = config.storage.table_name();
            create_config_table(&pool, table).await?;
            info!("Configuration table '{}' is ready", table);
        }
        Commands::Get(args) => {
            let storage = open_storage(&pool, &config).await?;
            let result = storage.get(args.scope, &args.path).await;
            finish(&storage).await?;
            match result? {
                Some(value) => println!("{}", value),
                None => bail!("No value for '{}' in scope {}", args.path, args.scope),
            }
        }
        Commands::Set(args) => {
            let storage = open_storage(&pool, &config).await?;
            let value = match args.value {
                Some(text) => ConfigValue::from(text),
                None => ConfigValue::null(),
            };
            let result = storage.set(args.scope, &args.path, value).await;
            finish(&storage).await?;
            result?;
        }
    }

    pool.close().await;
    Ok(())
}

async fn open_storage(pool: &SqlitePool, config: &CliConfig) -> Result<DbStorage> {
    let tables = Tables::load(pool.clone()).await?;
    DbStorage::new(&tables, config.storage.clone()).context(
        "Failed to open configuration storage\n\nRun: cfgstore init",
    )
}

async fn finish(storage: &DbStorage) -> Result<()> {
    let (read, write) = storage.statistics();
    debug!(%read, %write, "statement statistics");
    storage.close().await?;
    Ok(())
}
