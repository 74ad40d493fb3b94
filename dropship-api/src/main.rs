use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dropship_api::{
    app,
    state::{AppState, AuthConfig, Backends, ServiceSettings},
    worker,
};
use dropship_core::transport::LogTransport;
use dropship_store::app_config::{Config, StorageBackend};
use dropship_store::{DbClient, MemoryCatalog, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropship_api=debug,dropship_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting settlement API on port {}", config.server.port);

    let backends = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Backends::memory(Arc::new(MemoryStore::new()), Arc::new(MemoryCatalog::new()))
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Backends::postgres(&db)
        }
    };

    let transport = Arc::new(LogTransport::new(config.notifications.sender.clone()));
    let (app_state, _dispatch_handle) = AppState::build(
        backends,
        transport,
        ServiceSettings::from_config(&config),
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    );

    tokio::spawn(worker::start_notification_worker(
        app_state.retries.clone(),
        config.notifications.retry_interval(),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;
    Ok(())
}
