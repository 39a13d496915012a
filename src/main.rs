//! Storefront API server.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::auth::JwtKeys;
use storefront::config::StorageConfig;
use storefront::messaging::EventPublisher;
use storefront::payment::{PaymentVerifier, PortOneGateway};
use storefront::repository::Store;
use storefront::{api, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let addr = config.server.addr()?;

    let store = match &config.storage {
        StorageConfig::Postgres { url, max_connections } => {
            let pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .connect(url)
                .await
                .context("failed to connect to PostgreSQL")?;
            sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;
            Store::postgres(pool)
        }
        StorageConfig::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            Store::memory()
        }
    };

    let events = EventPublisher::connect(config.nats_url.as_deref()).await;
    let gateway = PortOneGateway::new(&config.portone).context("failed to build payment gateway client")?;
    let state = AppState::new(
        store,
        JwtKeys::new(&config.jwt),
        PaymentVerifier::new(Arc::new(gateway)),
        events,
    );
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "storefront API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
