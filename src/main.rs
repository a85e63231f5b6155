use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invitekeeper::commands::{ManualUpdate, UpdateReply};
use invitekeeper::config::Config;
use invitekeeper::manager::InviteManager;
use invitekeeper::remote::HttpRemoteClient;
use invitekeeper::status::{self, AppState};
use invitekeeper::storage::create_sqlite_repositories;

#[derive(Parser)]
#[command(
    name = "invitekeeper",
    version,
    about = "Keeps a working invite link on file for every listed chat server",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation loop and the status server
    Run,

    /// Store a new invite for a server on behalf of its owner
    Update {
        /// Server identifier
        server_id: String,

        /// Invite URL (https://discord.gg/<code>)
        invite_url: String,

        /// Owner user identifier
        #[arg(long)]
        owner: String,
    },

    /// List stored server records
    Servers {
        /// Only show disabled servers
        #[arg(long, default_value = "false")]
        disabled: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Run => {
            tracing::info!(
                api_url = %config.remote.api_url,
                sqlite_path = %config.database.sqlite_path.display(),
                "Starting run command"
            );
            run(config).await?;
        }

        Commands::Update {
            server_id,
            invite_url,
            owner,
        } => {
            tracing::info!(server_id = %server_id, owner = %owner, "Starting update command");
            update(config, server_id, invite_url, owner).await?;
        }

        Commands::Servers { disabled } => {
            servers(config, disabled)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("invitekeeper=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("invitekeeper={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    if let Err(e) = invitekeeper::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let (servers, updates) = create_sqlite_repositories(&config.database.sqlite_path)?;
    let remote = Arc::new(HttpRemoteClient::new(&config.remote)?);
    let manager = InviteManager::new(&config, servers, updates, remote)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid status server address")?;

    let (events_tx, events_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_handle = tokio::spawn(
        manager
            .scheduler
            .clone()
            .run(events_rx, shutdown_rx.clone()),
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    let state = AppState::new(
        manager.scheduler.clone(),
        events_tx,
        config.manager.liveness_threshold(),
    );
    let mut server_shutdown = shutdown_rx.clone();
    status::serve(addr, state, async move {
        let _ = server_shutdown.changed().await;
    })
    .await?;

    loop_handle.await.context("Reconciliation loop panicked")??;
    tracing::info!("invitekeeper stopped");
    Ok(())
}

async fn update(config: Config, server_id: String, invite_url: String, owner: String) -> Result<()> {
    let (servers, _) = create_sqlite_repositories(&config.database.sqlite_path)?;
    let remote = Arc::new(HttpRemoteClient::new(&config.remote)?);
    let command = ManualUpdate::new(servers, remote);

    let text = format!("update {server_id} {invite_url}");
    let reply = command.handle(&owner, &text, true).await?;

    match reply {
        UpdateReply::Ignored => {
            anyhow::bail!("Not a valid update: expected a discord.gg or discordapp.com/invite URL")
        }
        UpdateReply::Updated { .. } => {
            if let Some(message) = reply.message() {
                println!("{message}");
            }
        }
        _ => {
            if let Some(message) = reply.message() {
                anyhow::bail!(message);
            }
        }
    }

    Ok(())
}

fn servers(config: Config, only_disabled: bool) -> Result<()> {
    let (servers, _) = create_sqlite_repositories(&config.database.sqlite_path)?;

    let records = servers.find_all()?;
    let shown: Vec<_> = records
        .iter()
        .filter(|s| !only_disabled || !s.enabled)
        .collect();

    println!(
        "{:<20} {:<8} {:<8} {:<12} NAME",
        "ID", "ENABLED", "LISTING", "INVITE"
    );
    for server in &shown {
        println!(
            "{:<20} {:<8} {:<8} {:<12} {}",
            server.identifier,
            server.enabled,
            server.visibility,
            server.usable_invite().unwrap_or("-"),
            server.name.trim()
        );
    }
    println!("{} of {} servers", shown.len(), records.len());

    Ok(())
}
