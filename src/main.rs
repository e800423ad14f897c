use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shipnology_tenancy::app;
use shipnology_tenancy::auth::JwtKeys;
use shipnology_tenancy::config;
use shipnology_tenancy::database::{
    ConnectionParams, Connector, DatabaseManager, ManagerSettings, PgConnector, PgTenantRegistry,
};
use shipnology_tenancy::state::AppState;
use shipnology_tenancy::tenant::TenantResolver;

#[derive(Debug, Parser)]
#[command(name = "shipnology-tenancy", about = "Multi-tenant ERP API server")]
struct Args {
    /// Port to listen on (falls back to PORT, then 3000)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = config::config();
    tracing::info!("Starting Shipnology tenancy API in {:?} mode", config.environment);

    let database_url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let settings = ManagerSettings::new(database_url, config.database.connect_timeout())
        .context("DATABASE_URL is not a valid URL")?;

    let connector = PgConnector::new(config.database.pool_options());
    let registry_params =
        ConnectionParams::for_database(&settings.base_url, &config.database.registry_database, None)?;
    let registry_pool = connector
        .connect(&registry_params)
        .await
        .with_context(|| format!("connecting to registry database {:?}", registry_params))?;
    let registry = Arc::new(PgTenantRegistry::new(registry_pool));

    let pools = Arc::new(DatabaseManager::new(connector, registry.clone(), settings));
    let resolver = TenantResolver::new(config.tenant.default_context());
    let jwt = JwtKeys::from_secret(&config.security.jwt_secret).context("JWT_SECRET must be set")?;

    let state = AppState::new(pools.clone(), resolver, jwt);
    let router = app::router(state);

    let port = args
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(3000);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pools.close_all().await;
    registry.close().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
