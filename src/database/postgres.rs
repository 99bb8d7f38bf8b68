use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::DatabaseManager;
use crate::database::models::{Discount, DiscountRow, KeyStore, ProductFilter, ProductSummary};
use crate::database::store::{DiscountStore, KeyStoreRepository, PageRequest, ProductCatalog, StoreResult};

const DISCOUNT_COLUMNS: &str = "id, code, shop_owner, name, description, discount_type, value, max_value, \
     min_order_value, start_date, end_date, max_use, use_count, max_use_per_user, users_used, \
     is_active, apply_to, product_ids, created_at, updated_at";

fn into_discount(row: Option<DiscountRow>) -> StoreResult<Option<Discount>> {
    row.map(Discount::try_from).transpose()
}

#[derive(Clone)]
pub struct PgDiscountStore {
    pool: PgPool,
}

impl PgDiscountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscountStore for PgDiscountStore {
    async fn find_by_code(&self, shop_owner: Uuid, code: &str) -> StoreResult<Option<Discount>> {
        // Prefer the active record when an inactive one shares the code
        let sql = format!(
            "SELECT {} FROM discounts WHERE shop_owner = $1 AND code = $2 \
             ORDER BY is_active DESC, created_at DESC LIMIT 1",
            DISCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(shop_owner)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        into_discount(row)
    }

    async fn insert(&self, discount: &Discount) -> StoreResult<Discount> {
        let sql = format!(
            "INSERT INTO discounts ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) \
             RETURNING {cols}",
            cols = DISCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(discount.id)
            .bind(&discount.code)
            .bind(discount.shop_owner)
            .bind(&discount.name)
            .bind(&discount.description)
            .bind(discount.discount_type.as_str())
            .bind(discount.value)
            .bind(discount.max_value)
            .bind(discount.min_order_value)
            .bind(discount.start_date)
            .bind(discount.end_date)
            .bind(discount.max_use)
            .bind(discount.use_count)
            .bind(discount.max_use_per_user)
            .bind(&discount.users_used)
            .bind(discount.is_active)
            .bind(discount.apply_to.as_str())
            .bind(&discount.product_ids)
            .bind(discount.created_at)
            .bind(discount.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Discount::try_from(row)
    }

    async fn replace(&self, shop_owner: Uuid, code: &str, discount: &Discount) -> StoreResult<Option<Discount>> {
        let sql = format!(
            "UPDATE discounts SET \
                name = $3, description = $4, discount_type = $5, value = $6, max_value = $7, \
                min_order_value = $8, start_date = $9, end_date = $10, max_use = $11, use_count = $12, \
                max_use_per_user = $13, users_used = $14, is_active = $15, apply_to = $16, \
                product_ids = $17, updated_at = $18 \
             WHERE id = (SELECT id FROM discounts WHERE shop_owner = $1 AND code = $2 \
                         ORDER BY is_active DESC, created_at DESC LIMIT 1) \
             RETURNING {}",
            DISCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(shop_owner)
            .bind(code)
            .bind(&discount.name)
            .bind(&discount.description)
            .bind(discount.discount_type.as_str())
            .bind(discount.value)
            .bind(discount.max_value)
            .bind(discount.min_order_value)
            .bind(discount.start_date)
            .bind(discount.end_date)
            .bind(discount.max_use)
            .bind(discount.use_count)
            .bind(discount.max_use_per_user)
            .bind(&discount.users_used)
            .bind(discount.is_active)
            .bind(discount.apply_to.as_str())
            .bind(&discount.product_ids)
            .bind(discount.updated_at)
            .fetch_optional(&self.pool)
            .await?;
        into_discount(row)
    }

    async fn delete(&self, shop_owner: Uuid, code: &str) -> StoreResult<Option<Discount>> {
        let sql = format!(
            "DELETE FROM discounts WHERE id = (SELECT id FROM discounts WHERE shop_owner = $1 AND code = $2 \
                                               ORDER BY is_active DESC, created_at DESC LIMIT 1) \
             RETURNING {}",
            DISCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(shop_owner)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        into_discount(row)
    }

    async fn list_active(&self, shop_owner: Uuid, page: PageRequest) -> StoreResult<Vec<Discount>> {
        let sql = format!(
            "SELECT {} FROM discounts WHERE shop_owner = $1 AND is_active = TRUE \
             ORDER BY created_at ASC LIMIT $2 OFFSET $3",
            DISCOUNT_COLUMNS
        );
        let rows = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(shop_owner)
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Discount::try_from).collect()
    }

    async fn record_use(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Discount>> {
        let sql = format!(
            "UPDATE discounts SET \
                max_use = max_use - 1, \
                use_count = use_count + 1, \
                users_used = array_append(users_used, $2), \
                updated_at = now() \
             WHERE id = $1 AND is_active = TRUE AND max_use > 0 \
               AND (max_use_per_user = 0 OR cardinality(array_positions(users_used, $2)) < max_use_per_user) \
             RETURNING {}",
            DISCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        into_discount(row)
    }

    async fn release_use(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Discount>> {
        // Removes the first occurrence only; other recorded uses stay
        let sql = format!(
            "UPDATE discounts SET \
                users_used = CASE \
                    WHEN array_position(users_used, $2) IS NULL THEN users_used \
                    ELSE users_used[:array_position(users_used, $2) - 1] \
                         || users_used[array_position(users_used, $2) + 1:] \
                END, \
                max_use = max_use + 1, \
                use_count = use_count - 1, \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {}",
            DISCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        into_discount(row)
    }

    async fn health_check(&self) -> StoreResult<()> {
        DatabaseManager::health_check(&self.pool).await
    }
}

#[derive(Clone)]
pub struct PgProductCatalog {
    pool: PgPool,
}

impl PgProductCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn find_published(&self, filter: &ProductFilter, page: PageRequest) -> StoreResult<Vec<ProductSummary>> {
        let limit = i64::from(page.limit);
        let offset = page.offset() as i64;

        let rows = match filter {
            ProductFilter::Owner(owner) => {
                sqlx::query_as::<_, ProductSummary>(
                    "SELECT id, name, price FROM products \
                     WHERE owner = $1 AND is_published = TRUE \
                     ORDER BY created_at ASC LIMIT $2 OFFSET $3",
                )
                .bind(owner)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            ProductFilter::Ids(ids) => {
                sqlx::query_as::<_, ProductSummary>(
                    "SELECT id, name, price FROM products \
                     WHERE id = ANY($1) AND is_published = TRUE \
                     ORDER BY created_at ASC LIMIT $2 OFFSET $3",
                )
                .bind(ids)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }
}

#[derive(Clone)]
pub struct PgKeyStoreRepository {
    pool: PgPool,
}

impl PgKeyStoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyStoreRepository for PgKeyStoreRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<KeyStore>> {
        let key_store = sqlx::query_as::<_, KeyStore>(
            "SELECT user_id, access_key, refresh_key, refresh_token, refresh_tokens_used, updated_at \
             FROM key_stores WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key_store)
    }

    async fn save(&self, key_store: &KeyStore) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO key_stores (user_id, access_key, refresh_key, refresh_token, refresh_tokens_used, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET \
                access_key = EXCLUDED.access_key, \
                refresh_key = EXCLUDED.refresh_key, \
                refresh_token = EXCLUDED.refresh_token, \
                refresh_tokens_used = EXCLUDED.refresh_tokens_used, \
                updated_at = EXCLUDED.updated_at",
        )
        .bind(key_store.user_id)
        .bind(&key_store.access_key)
        .bind(&key_store.refresh_key)
        .bind(&key_store.refresh_token)
        .bind(&key_store.refresh_tokens_used)
        .bind(key_store.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(&self, user_id: Uuid, old_token: &str, new_token: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE key_stores SET \
                refresh_token = $3, \
                refresh_tokens_used = array_append(refresh_tokens_used, $2), \
                updated_at = now() \
             WHERE user_id = $1 \
               AND (refresh_token = $2 OR refresh_token IS NULL) \
               AND NOT ($2 = ANY(refresh_tokens_used))",
        )
        .bind(user_id)
        .bind(old_token)
        .bind(new_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
