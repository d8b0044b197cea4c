//! wxnorm daemon: HTTP intake and read API over MySQL

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use wxnorm_config::AppConfig;
use wxnorm_db::{DbClient, MeasurementStore, MemoryCache};
use wxnorm_server::ServerSettings;

#[tokio::main]
async fn main() -> Result<()> {
    // Observability
    wxnorm_obs::init("wxnormd");

    // Config
    let cfg = AppConfig::load().context("Failed to load configuration")?;
    let settings = ServerSettings::from_config(&cfg).context("Invalid configuration")?;
    let database_url = cfg
        .database_url()
        .context("No database URL configured (set DATABASE_URL or [database] url)")?;

    // Storage
    let db = DbClient::new(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.ping().await.context("Database ping failed")?;
    db.ensure_schema()
        .await
        .context("Failed to create tables")?;
    info!("Database connection verified");

    let (app, state) =
        wxnorm_server::build_app(Arc::new(db.clone()), Arc::new(MemoryCache::new()), settings)
        .context("Failed to build HTTP app")?;

    // Start HTTP server
    let addr: SocketAddr = cfg
        .http_bind()
        .parse()
        .context("Invalid HTTP bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind TCP listener")?;

    // Mark ready just before serving
    wxnorm_server::set_ready(&state, true);

    info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown signal received");
    wxnorm_server::shutdown(state).await;
    db.close().await;

    info!("wxnormd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
