#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use ecommerce_api_rust::auth::{create_token_pair, TokenPair, TokenPayload};
use ecommerce_api_rust::config::AppConfig;
use ecommerce_api_rust::database::memory::{
    CatalogProduct, MemoryDiscountStore, MemoryKeyStoreRepository, MemoryProductCatalog,
};
use ecommerce_api_rust::database::models::KeyStore;
use ecommerce_api_rust::database::{DiscountStore, KeyStoreRepository};
use ecommerce_api_rust::handlers;
use ecommerce_api_rust::services::DiscountService;
use ecommerce_api_rust::types::AppState;

/// One router bound to a free port, backed by memory stores
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
    pub discounts: Arc<MemoryDiscountStore>,
    pub catalog: Arc<MemoryProductCatalog>,
    pub key_stores: Arc<MemoryKeyStoreRepository>,
}

/// A user with a key store and a freshly issued token pair
pub struct TestUser {
    pub id: Uuid,
    pub tokens: TokenPair,
}

impl TestServer {
    async fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = AppConfig::development();
        let discounts = Arc::new(MemoryDiscountStore::new());
        let catalog = Arc::new(MemoryProductCatalog::new());
        let key_stores = Arc::new(MemoryKeyStoreRepository::new());
        let state = AppState {
            discounts: DiscountService::new(discounts.clone(), catalog.clone(), config.pagination),
            key_stores: key_stores.clone(),
            security: config.security,
        };

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, handlers::router(state)).await;
        });

        Ok(Self {
            port,
            base_url,
            client: reqwest::Client::new(),
            discounts,
            catalog,
            key_stores,
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register a key store for a new user and sign a token pair for it
    pub async fn user(&self) -> Result<TestUser> {
        let id = Uuid::new_v4();
        let access_key = Uuid::new_v4().to_string();
        let refresh_key = Uuid::new_v4().to_string();

        let tokens = create_token_pair(
            &TokenPayload {
                user_id: id,
                email: format!("{}@shop.test", id),
            },
            &access_key,
            &refresh_key,
            &AppConfig::development().security,
        )?;

        let mut key_store = KeyStore::new(id, access_key, refresh_key);
        key_store.refresh_token = Some(tokens.refresh_token.clone());
        self.key_stores.save(&key_store).await?;

        Ok(TestUser { id, tokens })
    }

    /// Codes can only be created with a future start; move it into the past
    pub async fn start_now(&self, shop: Uuid, code: &str) -> Result<()> {
        let mut discount = self
            .discounts
            .find_by_code(shop, code)
            .await?
            .context("discount code not stored")?;
        discount.start_date = Utc::now() - chrono::Duration::hours(1);
        self.discounts.replace(shop, code, &discount).await?;
        Ok(())
    }

    /// Add a published product owned by `owner`
    pub fn product(&self, owner: Uuid, name: &str, price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add(CatalogProduct {
            id,
            owner,
            name: name.to_string(),
            price,
            is_published: true,
            created_at: Utc::now(),
        });
        id
    }
}

impl TestUser {
    /// Attach `x-client-id` and the access token
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-client-id", self.id.to_string())
            .header("authorization", format!("Bearer {}", self.tokens.access_token))
    }
}

pub async fn spawn_server() -> Result<TestServer> {
    let server = TestServer::spawn().await?;
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Decimal fields serialize as strings
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap_or_else(|e| panic!("not a decimal {:?}: {}", s, e)),
        other => other.to_string().parse().unwrap_or_else(|e| panic!("not a decimal {}: {}", other, e)),
    }
}
