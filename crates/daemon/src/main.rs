use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use shardvault_daemon::{DaemonConfig, DaemonError, Reclaimer, factory, telemetry};

/// Shardvault control-plane daemon.
#[derive(Parser, Debug)]
#[command(name = "shardvault-daemon", about = "Shardvault control-plane daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "shardvault.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume shard deletion notifications and forward them to storage
    /// nodes (default).
    Reclaim,
    /// Validate the configuration and the channel connection, then exit.
    Check,
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let cli = Cli::parse();
    telemetry::init();

    let config = DaemonConfig::load(&cli.config)?;
    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let channel = factory::create_channel(&config.channel).await?;

    match cli.command.unwrap_or(Commands::Reclaim) {
        Commands::Check => {
            factory::create_audit_store(&config.audit)?;
            factory::create_node_client(&config)?;
            info!("configuration ok");
        }
        Commands::Reclaim => {
            let nodes = factory::create_node_client(&config)?;
            let reclaimer = Reclaimer::new(
                Arc::clone(&channel),
                nodes,
                config.channel.reclaim_stream.clone(),
                &config.reclaimer,
            );
            reclaimer.run(shutdown_signal()).await?;
        }
    }

    channel.close().await;
    info!("channel closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
