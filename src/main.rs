//! dte-transmitter - signing, transmission and contingency recovery for DTEs

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dte_transmitter::background::BackgroundJobRunner;
use dte_transmitter::clients::{HttpAuthorityClient, HttpSigningClient};
use dte_transmitter::config::Config;
use dte_transmitter::storage::{SqliteConfig, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "dte-transmitter")]
#[command(about = "Signs, transmits and retransmits electronic tax documents")]
struct Args {
    /// Path to SQLite database
    #[arg(long, env = "DTE_DATABASE_PATH", default_value = "./dte.db")]
    database: String,

    /// Log level
    #[arg(long, env = "DTE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Timeout per signing call in seconds
    #[arg(long, env = "DTE_SIGNER_TIMEOUT_SECS", default_value = "30")]
    signer_timeout_secs: u64,

    /// Tax authority base URL
    #[arg(long, env = "DTE_AUTHORITY_BASE_URL")]
    authority_url: Option<String>,

    /// Run a single retransmission cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting dte-transmitter v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    config.database_path = args.database;
    config.log_level = args.log_level;
    config.signer_timeout_secs = args.signer_timeout_secs;
    if let Some(url) = args.authority_url {
        config.authority.base_url = url;
    }

    let store = SqliteStore::with_config(SqliteConfig::for_path(config.database_path.as_str()))
    .with_context(|| format!("failed to open database {}", config.database_path))?;
    store.initialize().context("failed to initialize database schema")?;
    let store = Arc::new(store);

    tracing::info!(
        database = %store.config().path,
        wal = store.config().wal_mode,
        authority = %config.authority.base_url,
        "Storage ready"
    );

    let signing = Arc::new(
        HttpSigningClient::new(
            config.signer_timeout_secs,
            config.background.health_check.timeout_secs,
        )
        .context("failed to build signing client")?,
    );
    let authority = Arc::new(
        HttpAuthorityClient::new(config.authority.clone())
            .context("failed to build authority client")?,
    );

    if args.once {
        let job = dte_transmitter::background::RetransmissionJob::new(
            Arc::clone(&store),
            signing,
            authority,
            config.background.retransmission.clone(),
        );
        let report = job.tick().await;
        tracing::info!(?report, "Retransmission cycle finished");
        return Ok(());
    }

    let runner = BackgroundJobRunner::new(store, signing, authority, config.background.clone());
    let handles = runner.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    runner.shutdown();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background job ended abnormally");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
