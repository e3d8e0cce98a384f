//! nested-todo
//!
//! HTTP backend for hierarchical todo lists: accounts, lists and
//! arbitrarily nested tasks stored in SQLite.

use anyhow::{Context, Result, bail};
use clap::Parser;
use nested_todo::api::{AppState, start_server};
use nested_todo::auth::{TokenSigner, generate_secret};
use nested_todo::cli::{Cli, Command};
use nested_todo::config::Config;
use nested_todo::db::Database;
use nested_todo::logging::{self, LogTarget};
use nested_todo::types::write_forest_json;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let (mut config, config_path) = Config::discover(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Using config file");
    }

    // CLI overrides config and environment
    if let Some(db_path) = &cli.database {
        config.server.db_path = Some(db_path.clone());
    }
    if cli.no_database {
        config.server.db_path = None;
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command {
        Some(Command::Stats { list_id }) => {
            let db = require_database(&config)?;
            let stats = db.get_list_stats(list_id)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Some(Command::Tree { list_id }) => {
            let db = require_database(&config)?;
            if db.get_list(list_id)?.is_none() {
                bail!("List {} not found", list_id);
            }
            let tree = db.get_list_tasks(list_id)?;
            let mut out = std::io::stdout().lock();
            write_forest_json(&tree, &mut out)?;
            writeln!(out)?;
        }
        Some(Command::Serve) | None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

/// Open the configured database, creating its directory if needed.
fn open_database(config: &Config) -> Result<Option<Database>> {
    let Some(path) = &config.server.db_path else {
        return Ok(None);
    };
    config.ensure_db_dir()?;
    let db = Database::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Some(db))
}

fn require_database(config: &Config) -> Result<Database> {
    match open_database(config)? {
        Some(db) => Ok(db),
        None => bail!("No database configured"),
    }
}

async fn run_server(config: Config) -> Result<()> {
    let db = open_database(&config)?.map(Arc::new);
    match &config.server.db_path {
        Some(path) => info!(path = %path.display(), "Database opened"),
        None => warn!("Running without a database: reads return empty results, writes fail"),
    }

    let secret = match &config.auth.session_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("No session secret configured; sessions will not survive a restart");
            generate_secret()
        }
    };
    let signer = TokenSigner::new(secret);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = AppState::new(db, &config, signer);
    let server = start_server(state, addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    server.shutdown().await;

    Ok(())
}
