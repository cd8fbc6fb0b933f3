//! settle-engine binary
//!
//! ```text
//! settle-engine serve   [--env dev] [--port 8080]   # HTTP gateway
//! settle-engine migrate [--env dev]                 # apply PostgreSQL schema
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use settle_engine::config::AppConfig;
use settle_engine::db::Database;
use settle_engine::gateway::{self, state::AppState};
use settle_engine::settlement::{LedgerStore, MemoryStore, PgStore, SettlementService};

#[derive(Parser, Debug)]
#[command(name = "settle-engine", version, about = "Card-game session settlement engine")]
struct Cli {
    /// Config environment, loads config/{env}.yaml
    #[arg(short, long, global = true, default_value = "dev")]
    env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Override gateway.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply the ledger schema to PostgreSQL
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.env)?;
    let _log_guard = settle_engine::logging::init_logging(&config)?;
    info!(env = %cli.env, "settle-engine starting");

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Command::Migrate => migrate(&config).await,
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Option<Database>> {
    let Some(url) = config.postgres_url.as_deref() else {
        return Ok(None);
    };
    let db = Database::connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;
    Ok(Some(db))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let lock_timeout = config.settlement.lock_timeout();
    let store: Arc<dyn LedgerStore> = match connect(&config).await? {
        Some(db) => {
            db.migrate().await.context("schema migration failed")?;
            Arc::new(PgStore::new(db.pool().clone(), lock_timeout))
        }
        None => {
            warn!("postgres_url not set, using in-memory ledger (data is lost on exit)");
            Arc::new(MemoryStore::new(lock_timeout))
        }
    };

    let service = Arc::new(SettlementService::new(store, config.settlement.clone()));
    let state = Arc::new(AppState::new(service));
    gateway::run_server(&config.gateway, state).await
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let db = connect(config)
        .await?
        .context("postgres_url is required for migrate")?;
    db.migrate().await.context("schema migration failed")?;
    info!("Migrations applied");
    Ok(())
}
