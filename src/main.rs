use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use admission_guard::config::GuardConfig;
use admission_guard::http::{cors_layer, router, AppState, HttpServer};
use admission_guard::ratelimit::{spawn_sweeper, SystemClock};
use admission_guard::validation::ValidationService;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "admission-guard", version)]
#[command(about = "Per-client request admission guard for a validation endpoint")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .with(filter)
            .init();
    }

    info!("Starting Admission Guard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GuardConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    config.validate()?;
    info!(
        bind_addr = %config.server.bind_addr,
        algorithm = %config.rate_limiting.algorithm,
        client_ip = ?config.server.client_ip,
        "Configuration loaded"
    );

    let service = ValidationService::from_config(&config, Arc::new(SystemClock));
    let sweeper = spawn_sweeper(
        service.limiter().clone(),
        config.rate_limiting.store.sweep_interval(),
    );

    let state = Arc::new(AppState {
        service,
        client_ip: config.server.client_ip.clone(),
    });
    let app = router(state, cors_layer(&config.server.cors)?);

    // Run the server with graceful shutdown on Ctrl+C
    let result = HttpServer::new(config.server.bind_addr, app)
        .serve_with_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    result?;

    info!("Admission Guard stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
