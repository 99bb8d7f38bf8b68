use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use ecommerce_api_rust::config::config;
use ecommerce_api_rust::database::memory::{MemoryDiscountStore, MemoryKeyStoreRepository, MemoryProductCatalog};
use ecommerce_api_rust::database::postgres::{PgDiscountStore, PgKeyStoreRepository, PgProductCatalog};
use ecommerce_api_rust::database::{DatabaseManager, DiscountStore, KeyStoreRepository, ProductCatalog};
use ecommerce_api_rust::handlers;
use ecommerce_api_rust::is_production;
use ecommerce_api_rust::services::DiscountService;
use ecommerce_api_rust::types::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, APP_ENV, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    tracing::info!("Starting E-commerce API in {:?} mode", config.environment);

    let (discounts, products, key_stores): (
        Arc<dyn DiscountStore>,
        Arc<dyn ProductCatalog>,
        Arc<dyn KeyStoreRepository>,
    ) = if config.database.url.is_some() {
        let pool = DatabaseManager::connect(&config.database)
            .await
            .context("failed to connect to database")?;
        (
            Arc::new(PgDiscountStore::new(pool.clone())),
            Arc::new(PgProductCatalog::new(pool.clone())),
            Arc::new(PgKeyStoreRepository::new(pool)),
        )
    } else {
        if is_production!() {
            anyhow::bail!("DATABASE_URL is required in production");
        }
        tracing::warn!("DATABASE_URL not set, using in-memory stores");
        (
            Arc::new(MemoryDiscountStore::new()),
            Arc::new(MemoryProductCatalog::new()),
            Arc::new(MemoryKeyStoreRepository::new()),
        )
    };

    let state = AppState {
        discounts: DiscountService::new(discounts, products, config.pagination.clone()),
        key_stores,
        security: config.security.clone(),
    };
    let app = handlers::router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("E-commerce API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
