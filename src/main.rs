use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use a3s_outbox::{
    AppConfig, ContextFactory, FileEventLogStore, MessageBus, NatsBus, OutboxRelay, RelayContext,
};

/// A3S Outbox - relay event log entries to NATS JetStream
#[derive(Debug, Parser)]
#[command(name = "a3s-outbox-relay", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, short, default_value = "a3s-outbox.toml")]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

/// Re-opens the event log file for every cycle; the bus connection is shared.
struct FileContextFactory {
    path: PathBuf,
    bus: Arc<dyn MessageBus>,
}

#[async_trait]
impl ContextFactory for FileContextFactory {
    async fn create(&self) -> a3s_outbox::Result<RelayContext> {
        let store = FileEventLogStore::open(&self.path).await?;
        Ok(RelayContext::new(Arc::new(store), self.bus.clone()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting outbox relay");
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Outbox relay terminated unexpectedly");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(&cli.config)?;
    tracing::info!(
        config = %cli.config.display(),
        store = %config.store.path.display(),
        nats = %config.nats.url,
        "Loaded relay configuration"
    );

    let bus = NatsBus::connect(config.nats.clone()).await?;
    let factory = FileContextFactory {
        path: config.store.path.clone(),
        bus: Arc::new(bus),
    };
    let relay = OutboxRelay::new(&config.relay, factory);

    if cli.once {
        let report = relay.run_cycle(&CancellationToken::new()).await?;
        tracing::info!(
            selected = report.selected,
            published = report.published,
            failed = report.failed,
            "Single cycle completed"
        );
        return Ok(());
    }

    let handle = relay.spawn();
    shutdown_signal().await;
    handle.shutdown().await;

    tracing::info!("Outbox relay shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping relay"),
        () = terminate => tracing::info!("Received SIGTERM, stopping relay"),
    }
}
