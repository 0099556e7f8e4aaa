//! PulseWatch CLI
//!
//! Runs the monitoring and notification service, and talks to a running
//! notifier from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pulsewatch::alerting::{DispatchWorker, NotificationSender};
use pulsewatch::api::HttpServer;
use pulsewatch::client::NotifierClient;
use pulsewatch::config::LoggingConfig;
use pulsewatch::db::Database;
use pulsewatch::models::{Notification, NotificationKind};
use pulsewatch::monitor::MonitorService;
use pulsewatch::notification::{NotificationHub, NotificationQueue};
use pulsewatch::scheduler::Scheduler;
use pulsewatch::Config;

/// PulseWatch - HTTP monitoring with notifications
#[derive(Parser)]
#[command(name = "pulsewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "PULSEWATCH_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API, monitor scheduler and dispatch worker
    Serve {
        /// HTTP API port (overrides server.port)
        #[arg(long, env = "PULSEWATCH_HTTP_PORT")]
        port: Option<u16>,

        /// Keep all state in memory instead of Redis
        #[arg(long)]
        memory: bool,
    },

    /// Register a notification with a notifier and print its api key
    Register {
        /// Notification id
        id: String,

        /// Notification type (email, webhook, slack)
        #[arg(long = "type")]
        kind: String,

        /// JSON file holding the notification
        #[arg(long)]
        file: PathBuf,

        /// Notifier base URL
        #[arg(long, default_value = "http://localhost:8080", env = "PULSEWATCH_NOTIFIER")]
        notifier: String,
    },

    /// Ask a notifier to deliver a registered notification
    Trigger {
        /// Notification id
        id: String,

        /// Api key returned at registration
        #[arg(long, env = "PULSEWATCH_API_KEY")]
        key: String,

        /// Replace the notification text for this delivery
        #[arg(long)]
        text: Option<String>,

        /// Notifier base URL
        #[arg(long, default_value = "http://localhost:8080", env = "PULSEWATCH_NOTIFIER")]
        notifier: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve { port, memory } => run_serve(config, port, memory).await,
        Commands::Register {
            id,
            kind,
            file,
            notifier,
        } => run_register(&config, &id, &kind, &file, &notifier).await,
        Commands::Trigger {
            id,
            key,
            text,
            notifier,
        } => run_trigger(&config, &id, &key, text.as_deref(), &notifier).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_serve(config: Config, port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    let db = if memory {
        info!("Using in-memory stores");
        Database::in_memory()
    } else {
        Database::redis(&config.redis).context("connecting to Redis")?
    };
    if let Err(e) = db.health_check().await {
        warn!(error = %e, "Store health check failed, continuing");
    }

    let hub = Arc::new(NotificationHub::from_database(&db));
    let scheduler = Arc::new(Scheduler::new(&config.scheduler));
    let monitors = Arc::new(MonitorService::from_config(
        &config,
        scheduler.clone(),
        hub.clone(),
        db.status.clone(),
    )?);

    let sender = Arc::new(NotificationSender::new(&config.dispatch)?);
    let worker = DispatchWorker::new(
        NotificationQueue::new(db.queue.clone()),
        sender,
        config.dispatch.pop_timeout,
    );

    let shutdown = CancellationToken::new();

    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };
    let worker_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            info!("Shutting down...");
            shutdown.cancel();
        });
    }

    let addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let served = HttpServer::new(hub, Some(monitors)).serve(&addr, shutdown.clone()).await;

    shutdown.cancel();
    scheduler.shutdown();
    let (scheduler_done, worker_done) = tokio::join!(scheduler_task, worker_task);
    if let Err(e) = scheduler_done.and(worker_done) {
        warn!(error = %e, "Background task ended abnormally");
    }

    served?;
    Ok(())
}

async fn run_register(
    config: &Config,
    id: &str,
    kind: &str,
    file: &Path,
    notifier: &str,
) -> anyhow::Result<()> {
    let kind: NotificationKind = kind.parse()?;
    let payload = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let notification = Notification::from_payload(kind, &payload)?;

    let client = NotifierClient::new(notifier, config.dispatch.request_timeout)?;
    let api_key = client.register(id, &notification).await?;

    println!("{api_key}");
    Ok(())
}

async fn run_trigger(
    config: &Config,
    id: &str,
    key: &str,
    text: Option<&str>,
    notifier: &str,
) -> anyhow::Result<()> {
    let client = NotifierClient::new(notifier, config.dispatch.request_timeout)?;
    client.remember_key(id, key);
    client.trigger(id, text).await?;

    println!("Notification: {id} reserved.");
    Ok(())
}
