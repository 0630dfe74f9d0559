// File: chatgate-server/src/main.rs

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chatgate_common::models::Platform;
use chatgate_common::traits::repository_traits::{CooldownRepository, ViewerRepository};
use chatgate_core::eventbus::EventBus;
use chatgate_core::eventbus::observer::spawn_observer;
use chatgate_core::repositories::{InMemoryCooldownRepository, InMemoryViewerRepository};
use chatgate_core::services::{
    CommandRegistry, CooldownGovernor, Dispatcher, HandlerRegistry, OutboundRouter,
    PlatformLimits, StartingBalance, ViewerService,
};
use chatgate_core::tasks::{restore_cooldowns, spawn_cooldown_flush_task};
use chatgate_core::utils::time::{Clock, SystemClock};
use chatgate_core::{Database, Error, GovernanceConfig};

mod console;
use console::{spawn_console_connector, ChatLog, CommandAudit, ConsoleSender};

#[derive(Parser, Debug, Clone)]
#[command(name = "chatgate")]
#[command(author, version, about = "ChatGate - chat command dispatch with cooldown and quota governance")]
struct Args {
    /// Path to the JSON governance configuration.
    #[arg(long, default_value = "chatgate.json")]
    config: PathBuf,

    /// Postgres connection URL. Falls back to DATABASE_URL; without either, state is kept in memory.
    #[arg(long)]
    db_url: Option<String>,

    /// Quiet period before cooldown state is written back to storage.
    #[arg(long, default_value = "5")]
    cooldown_flush_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("chatgate=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("ChatGate starting. config={}", args.config.display());

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn open_repositories(
    db_url: Option<String>,
) -> Result<(Arc<dyn ViewerRepository>, Arc<dyn CooldownRepository>), Error> {
    match db_url.or_else(|| std::env::var("DATABASE_URL").ok()) {
        Some(url) => {
            let db = Database::open(&url).await?;
            Ok((
                Arc::new(db.viewer_repository()),
                Arc::new(db.cooldown_repository()),
            ))
        }
        None => {
            warn!("No database configured; viewers and cooldowns live in memory only.");
            Ok((
                Arc::new(InMemoryViewerRepository::new()),
                Arc::new(InMemoryCooldownRepository::new()),
            ))
        }
    }
}

async fn run_server(args: Args) -> Result<(), Error> {
    // 1) Configuration
    let config = GovernanceConfig::load(&args.config).await?;
    for cmd in config.unrecognized_permissions() {
        warn!(
            "Command '{}' has unrecognized permission '{}'; it will deny everyone",
            cmd.name, cmd.permission
        );
    }

    // 2) Storage
    let (viewer_repo, cooldown_repo) = open_repositories(args.db_url.clone()).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 3) Governor state, restored before any message is accepted
    let event_bus = Arc::new(EventBus::new());
    let governor = Arc::new(CooldownGovernor::new(config.quota.clone()));
    if let Err(e) = restore_cooldowns(&governor, cooldown_repo.as_ref()).await {
        warn!("Could not restore cooldown state, starting fresh: {:?}", e);
    }
    // Stopped separately, after the dispatcher has drained.
    let (flush_stop_tx, flush_stop_rx) = watch::channel(false);
    let flush_handle = spawn_cooldown_flush_task(
        governor.clone(),
        cooldown_repo.clone(),
        Duration::from_secs(args.cooldown_flush_secs),
        flush_stop_rx,
    );

    // 4) Outbound
    let router = Arc::new(OutboundRouter::default());
    let console_limits = config
        .platforms
        .get(&Platform::Console)
        .copied()
        .unwrap_or_else(|| PlatformLimits::for_platform(Platform::Console));
    router.register_sender(Platform::Console, Arc::new(ConsoleSender), console_limits);

    // 5) Dispatcher
    let viewer_service = Arc::new(ViewerService::new(
        viewer_repo,
        clock.clone(),
        StartingBalance {
            coins: config.starting_coins,
            karma: config.starting_karma,
        },
    ));
    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::new(CommandRegistry::new()),
            governor,
            HandlerRegistry::with_builtins(),
            viewer_service,
            router.clone(),
            event_bus.clone(),
            clock,
        )
        .with_passive_handler(Arc::new(ChatLog)),
    );
    dispatcher.apply_config(&config);

    let audit_handle = spawn_observer(&event_bus, Arc::new(CommandAudit), None);
    let console_handle = spawn_console_connector(
        dispatcher.clone(),
        event_bus.clone(),
        args.config.clone(),
    );

    // 6) Handle Ctrl-C to signal shutdown
    let eb_clone = event_bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_clone.shutdown();
    });

    // 7) Wait for shutdown
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    info!("Shutdown signaled; draining in-flight messages.");

    dispatcher.shutdown();
    dispatcher.drain().await;
    router.close().await;
    let _ = flush_stop_tx.send(true);

    for (name, handle) in [
        ("console connector", console_handle),
        ("cooldown flush", flush_handle),
        ("command audit", audit_handle),
    ] {
        if let Err(e) = handle.await {
            error!("{} task ended abnormally: {:?}", name, e);
        }
    }

    info!("Server shutdown complete.");
    Ok(())
}
