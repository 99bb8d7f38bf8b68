//! In-process stores used when no `DATABASE_URL` is configured and by the
//! test suites. Each mutation runs under a single lock acquisition so the
//! counter updates keep the same atomicity as the Postgres statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::database::models::{Discount, KeyStore, ProductFilter, ProductSummary};
use crate::database::store::{DiscountStore, KeyStoreRepository, PageRequest, ProductCatalog, StoreResult};

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

#[derive(Default)]
pub struct MemoryDiscountStore {
    discounts: Mutex<Vec<Discount>>,
}

impl MemoryDiscountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the record addressed by owner + code, preferring the active one.
    fn position(discounts: &[Discount], shop_owner: Uuid, code: &str) -> Option<usize> {
        let matching = || {
            discounts
                .iter()
                .enumerate()
                .filter(|(_, d)| d.shop_owner == shop_owner && d.code == code)
        };
        matching()
            .filter(|(_, d)| d.is_active)
            .map(|(i, _)| i)
            .last()
            .or_else(|| matching().map(|(i, _)| i).last())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Discount>> {
        // A poisoned lock only means another test thread panicked mid-update
        self.discounts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DiscountStore for MemoryDiscountStore {
    async fn find_by_code(&self, shop_owner: Uuid, code: &str) -> StoreResult<Option<Discount>> {
        let discounts = self.lock();
        Ok(Self::position(&discounts, shop_owner, code).map(|i| discounts[i].clone()))
    }

    async fn insert(&self, discount: &Discount) -> StoreResult<Discount> {
        self.lock().push(discount.clone());
        Ok(discount.clone())
    }

    async fn replace(&self, shop_owner: Uuid, code: &str, discount: &Discount) -> StoreResult<Option<Discount>> {
        let mut discounts = self.lock();
        let Some(i) = Self::position(&discounts, shop_owner, code) else {
            return Ok(None);
        };
        let current = &mut discounts[i];
        let replaced = Discount {
            id: current.id,
            code: current.code.clone(),
            shop_owner: current.shop_owner,
            created_at: current.created_at,
            ..discount.clone()
        };
        *current = replaced.clone();
        Ok(Some(replaced))
    }

    async fn delete(&self, shop_owner: Uuid, code: &str) -> StoreResult<Option<Discount>> {
        let mut discounts = self.lock();
        Ok(Self::position(&discounts, shop_owner, code).map(|i| discounts.remove(i)))
    }

    async fn list_active(&self, shop_owner: Uuid, page: PageRequest) -> StoreResult<Vec<Discount>> {
        let mut active: Vec<Discount> = self
            .lock()
            .iter()
            .filter(|d| d.shop_owner == shop_owner && d.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|d| d.created_at);
        Ok(paginate(active, page))
    }

    async fn record_use(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Discount>> {
        let mut discounts = self.lock();
        let Some(discount) = discounts.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        let per_user_ok = discount.max_use_per_user == 0
            || discount.uses_by(user_id) < discount.max_use_per_user as usize;
        if !discount.is_active || discount.max_use <= 0 || !per_user_ok {
            return Ok(None);
        }
        discount.max_use -= 1;
        discount.use_count += 1;
        discount.users_used.push(user_id);
        discount.updated_at = Utc::now();
        Ok(Some(discount.clone()))
    }

    async fn release_use(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Discount>> {
        let mut discounts = self.lock();
        let Some(discount) = discounts.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        if let Some(pos) = discount.users_used.iter().position(|u| *u == user_id) {
            discount.users_used.remove(pos);
        }
        discount.max_use += 1;
        discount.use_count -= 1;
        discount.updated_at = Utc::now();
        Ok(Some(discount.clone()))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Catalog entry held by the memory catalog
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryProductCatalog {
    products: Mutex<Vec<CatalogProduct>>,
}

impl MemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, product: CatalogProduct) {
        self.products
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(product);
    }
}

#[async_trait]
impl ProductCatalog for MemoryProductCatalog {
    async fn find_published(&self, filter: &ProductFilter, page: PageRequest) -> StoreResult<Vec<ProductSummary>> {
        let mut matching: Vec<CatalogProduct> = self
            .products
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| p.is_published)
            .filter(|p| match filter {
                ProductFilter::Owner(owner) => p.owner == *owner,
                ProductFilter::Ids(ids) => ids.contains(&p.id),
            })
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);

        Ok(paginate(matching, page)
            .into_iter()
            .map(|p| ProductSummary {
                id: p.id,
                name: p.name,
                price: p.price,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryKeyStoreRepository {
    key_stores: Mutex<HashMap<Uuid, KeyStore>>,
}

impl MemoryKeyStoreRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStoreRepository for MemoryKeyStoreRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<KeyStore>> {
        Ok(self
            .key_stores
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned())
    }

    async fn save(&self, key_store: &KeyStore) -> StoreResult<()> {
        self.key_stores
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_store.user_id, key_store.clone());
        Ok(())
    }

    async fn rotate_refresh_token(&self, user_id: Uuid, old_token: &str, new_token: &str) -> StoreResult<bool> {
        let mut key_stores = self.key_stores.lock().unwrap_or_else(|e| e.into_inner());
        let Some(key_store) = key_stores.get_mut(&user_id) else {
            return Ok(false);
        };
        let current_ok = key_store.refresh_token.as_deref().map_or(true, |t| t == old_token);
        if !current_ok || key_store.refresh_tokens_used.iter().any(|t| t == old_token) {
            return Ok(false);
        }
        key_store.refresh_tokens_used.push(old_token.to_string());
        key_store.refresh_token = Some(new_token.to_string());
        key_store.updated_at = Utc::now();
        Ok(true)
    }
}
