use anyhow::Context;
use tracing_subscriber::EnvFilter;

use nidhi_api::config::{config, Environment};
use nidhi_api::database::DatabaseManager;
use nidhi_api::server::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config();
    tracing::info!("Starting Nidhi API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        if matches!(config.environment, Environment::Production) {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        tracing::warn!("JWT_SECRET is empty; every bearer token will be rejected");
    }

    let manager = DatabaseManager::from_config(&config.database).context("invalid database configuration")?;
    if config.database.run_migrations {
        manager.run_migrations().await.context("failed to migrate request directory")?;
    }

    let router = app(
        AppState::from_config(config, manager.clone()),
        &config.api,
        &config.security,
    );

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Nidhi API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
