//! Store traits consumed by the services.
//!
//! Every mutation that touches usage counters is a single store-level
//! operation, so concurrent redemptions never race on read-modify-write.

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Discount, KeyStore, ProductFilter, ProductSummary};

pub type StoreResult<T> = Result<T, DatabaseError>;

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub page: u32,
}

impl PageRequest {
    /// Fills in the default limit, caps it at `max_limit` and clamps page to 1.
    pub fn new(limit: Option<u32>, page: Option<u32>, default_limit: u32, max_limit: u32) -> Self {
        let limit = limit.filter(|l| *l > 0).unwrap_or(default_limit).min(max_limit);
        let page = page.unwrap_or(1).max(1);
        Self { limit, page }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[async_trait]
pub trait DiscountStore: Send + Sync {
    async fn find_by_code(&self, shop_owner: Uuid, code: &str) -> StoreResult<Option<Discount>>;

    async fn insert(&self, discount: &Discount) -> StoreResult<Discount>;

    /// Replace every mutable field of the discount identified by owner + code.
    async fn replace(&self, shop_owner: Uuid, code: &str, discount: &Discount) -> StoreResult<Option<Discount>>;

    async fn delete(&self, shop_owner: Uuid, code: &str) -> StoreResult<Option<Discount>>;

    /// Active discounts of one owner, oldest first.
    async fn list_active(&self, shop_owner: Uuid, page: PageRequest) -> StoreResult<Vec<Discount>>;

    /// Decrement `max_use`, increment `use_count` and append the user, only when
    /// uses remain and the per-user cap still allows it.
    async fn record_use(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Discount>>;

    /// Inverse of `record_use`: remove one occurrence of the user, increment
    /// `max_use` and decrement `use_count`.
    async fn release_use(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Discount>>;

    async fn health_check(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Published products matching the filter, sorted by creation time ascending.
    async fn find_published(&self, filter: &ProductFilter, page: PageRequest) -> StoreResult<Vec<ProductSummary>>;
}

#[async_trait]
pub trait KeyStoreRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<KeyStore>>;

    async fn save(&self, key_store: &KeyStore) -> StoreResult<()>;

    /// Swap the current refresh token for `new_token`, remembering `old_token`
    /// as used. A key store with no current token accepts any `old_token` not
    /// yet used. Returns false when `old_token` is no longer current.
    async fn rotate_refresh_token(&self, user_id: Uuid, old_token: &str, new_token: &str) -> StoreResult<bool>;
}
