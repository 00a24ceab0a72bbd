//! filegate command-line entrypoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filegate::config::GatewayConfig;
use filegate::http::{AppState, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "filegate")]
#[command(about = "File-hosting gateway with access control and lazy moderation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit logs as JSON lines
        #[arg(long)]
        log_json: bool,
    },
    /// Validate a configuration file and exit
    Check {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, log_json } => {
            init_stdout_logging(log_json);
            serve(config).await
        },
        Command::Check { config } => check(config),
    }
}

/// Initialize stdout logging.
fn init_stdout_logging(json: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

fn load_config(path: Option<PathBuf>) -> Result<GatewayConfig> {
    let config = GatewayConfig::load(path.as_deref())?;
    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    Ok(config)
}

async fn serve(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    let addr = config.listen_addr()?;

    info!(
        auth = config.auth.credentials().is_some(),
        index = config.index.is_some(),
        blob = config.blob.is_some(),
        moderation = config.moderation.api_key.is_some(),
        whitelist_only = config.access.whitelist_only,
        "filegate v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let state = Arc::new(AppState::from_config(config)?);
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn check(path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load(path.as_deref())?;
    let validation = config.validate()?;
    for warning in &validation.warnings {
        println!("warning: {warning}");
    }
    println!("Configuration OK");
    Ok(())
}
