//! Ascension Tracker CLI

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, warn};

use ascension_tracker::crawling::{IngestSettings, IngestionOrchestrator, WorkerPool};
use ascension_tracker::infrastructure::config::AppConfig;
use ascension_tracker::infrastructure::logging::log_system_info;
use ascension_tracker::infrastructure::session::Session;
use ascension_tracker::infrastructure::{
    ConfigManager, DatabaseConnection, MemoryRecordStore, RecordStore, SessionWorker, SqliteRecordStore,
    init_logging_with_config,
};
use ascension_tracker::tagging::TaggingEngine;

mod cli;

use cli::{Cli, Commands, GlobalArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.global).await?;
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let store = open_store(&cli.global, &config).await?;

    match cli.command {
        Commands::Tag => {
            let report = TaggingEngine::new(store, config.tagging.ns13_cutoff).run().await?;
            print_report(&report)
        }
        Commands::Discover => {
            let mut orchestrator = orchestrator(store, &config).await?;
            print_report(&orchestrator.discover_new_players().await?)
        }
        Commands::Scan(args) => {
            let mut orchestrator = orchestrator(store, &config).await?;
            print_report(&orchestrator.scan_range(args.from, args.to).await?)
        }
        Commands::Ids(args) => {
            let mut orchestrator = orchestrator(store, &config).await?;
            print_report(&orchestrator.ingest_ids(args.ids).await?)
        }
        Commands::Recent => {
            let mut orchestrator = orchestrator(store, &config).await?;
            print_report(&orchestrator.ingest_recent_ascenders().await?)
        }
        Commands::Reparse(args) => {
            let mut orchestrator = orchestrator(store, &config).await?;
            print_report(&orchestrator.reparse_players(args.ids).await?)
        }
    }
}

fn print_report(report: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Logs in every configured session and wires Ctrl-C to the stop flag
async fn orchestrator(store: Arc<dyn RecordStore>, config: &AppConfig) -> Result<IngestionOrchestrator> {
    let pool = login_sessions(config).await?;
    let orchestrator = IngestionOrchestrator::new(store, pool, IngestSettings::from_config(config));

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight players");
            stop.store(true, Ordering::SeqCst);
        }
    });

    Ok(orchestrator)
}

async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let manager = match &global.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    if let Some(url) = &global.database_url {
        config.database.url.clone_from(url);
    }
    Ok(config)
}

async fn open_store(global: &GlobalArgs, config: &AppConfig) -> Result<Arc<dyn RecordStore>> {
    if global.dry_run {
        info!("🧪 Dry run: records are kept in memory only");
        return Ok(Arc::new(MemoryRecordStore::new()));
    }

    let connection = DatabaseConnection::new(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database.url))?;
    connection.migrate().await?;
    Ok(Arc::new(SqliteRecordStore::new(connection.into_pool())))
}

async fn login_sessions(config: &AppConfig) -> Result<WorkerPool> {
    if config.sessions.is_empty() {
        return Err(anyhow!("No session credentials configured"));
    }

    let workers = try_join_all(
        config
            .sessions
            .iter()
            .map(|credentials| SessionWorker::login(&config.remote, credentials)),
    )
    .await?;
    info!("🔐 Logged in {} sessions", workers.len());

    let sessions: Vec<Box<dyn Session>> = workers
        .into_iter()
        .map(|worker| Box::new(worker) as Box<dyn Session>)
        .collect();
    WorkerPool::new(sessions).ok_or_else(|| anyhow!("Session pool could not be built"))
}
