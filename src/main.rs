mod aggregate;
mod cache;
mod config;
mod error;
mod fallback;
mod filter;
mod model;
mod protocol;
mod routes;
mod server;
mod session;
mod state;
mod store;

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use config::{CliArgs, DashboardConfig};
use state::DashboardState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gha_dashboard=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!("Starting gha-dashboard v{}", env!("CARGO_PKG_VERSION"));
    info!("Collector backend: {}", args.backend_url);

    let config = DashboardConfig::from_args(args);
    let port = config.port;
    info!("Cache database: {:?}", config.cache_db);

    let state = Arc::new(DashboardState::new(config)?);

    // Surface where the previous session left off; a complete cache lets the
    // dashboard render without re-streaming.
    if let Ok(Some(repo)) = state.cache.current_repo() {
        match state.cache.cache_status(&repo) {
            Ok(status) if status.exists => {
                info!(
                    %repo,
                    total_runs = status.total_runs,
                    is_complete = status.is_complete,
                    "found cached collection"
                );
            }
            _ => {}
        }
    }

    // Build and start HTTP server
    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("Dashboard service listening on http://0.0.0.0:{port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("Dashboard service shutting down");

    // Cancel any in-flight collection so the collector is freed
    if session::cancel_session(&state, None).await {
        info!("Cancelled active collection before exit");
    }

    Ok(())
}

async fn shutdown_signal(state: Arc<DashboardState>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal");
    let _ = state.shutdown_tx.send(());
}
