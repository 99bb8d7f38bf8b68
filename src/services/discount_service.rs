use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PaginationConfig;
use crate::database::manager::DatabaseError;
use crate::database::models::{
    ApplyTo, Discount, DiscountAmount, DiscountPayload, DiscountType, DiscountView, OrderItem, ProductFilter,
    ProductSummary,
};
use crate::database::store::{DiscountStore, PageRequest, ProductCatalog};
use crate::services::discount_validator;

#[derive(Debug, thiserror::Error)]
pub enum DiscountError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Infrastructure(#[from] DatabaseError),
}

impl DiscountError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        DiscountError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DiscountError::NotFound(message.into())
    }
}

pub type DiscountResult<T> = Result<T, DiscountError>;

/// Query for the products a discount code can be applied to
#[derive(Debug, Clone)]
pub struct DiscountProductsQuery {
    pub code: String,
    pub shop_id: Uuid,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

/// Query for the active discount codes of one shop
#[derive(Debug, Clone)]
pub struct ShopDiscountsQuery {
    pub shop_owner: Uuid,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

/// Create, update, list, validate, redeem, cancel and delete discount codes
#[derive(Clone)]
pub struct DiscountService {
    discounts: Arc<dyn DiscountStore>,
    products: Arc<dyn ProductCatalog>,
    pagination: PaginationConfig,
}

impl DiscountService {
    pub fn new(
        discounts: Arc<dyn DiscountStore>,
        products: Arc<dyn ProductCatalog>,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            discounts,
            products,
            pagination,
        }
    }

    /// Create a discount code owned by `shop_owner`
    pub async fn create(&self, shop_owner: Uuid, payload: DiscountPayload) -> DiscountResult<Discount> {
        let now = Utc::now();
        Self::validate_payload(&payload, now)?;

        if let Some(existing) = self.discounts.find_by_code(shop_owner, &payload.code).await? {
            if existing.is_active {
                debug!(%shop_owner, code = %payload.code, "Rejected duplicate discount code");
                return Err(DiscountError::bad_request("Discount code already exists"));
            }
        }

        let discount = Discount::from_payload(shop_owner, payload, now);
        let created = self.discounts.insert(&discount).await?;

        info!(%shop_owner, code = %created.code, "Created discount code");
        Ok(created)
    }

    /// Replace every field of an existing discount code
    pub async fn update(&self, shop_owner: Uuid, payload: DiscountPayload) -> DiscountResult<Discount> {
        let now = Utc::now();
        Self::validate_payload(&payload, now)?;

        let code = payload.code.clone();
        let mut discount = self
            .discounts
            .find_by_code(shop_owner, &code)
            .await?
            .ok_or_else(|| DiscountError::not_found("Discount code not found"))?;

        discount.apply_payload(payload, now);
        let updated = self
            .discounts
            .replace(shop_owner, &code, &discount)
            .await?
            .ok_or_else(|| DiscountError::not_found("Discount code not found"))?;

        info!(%shop_owner, %code, "Updated discount code");
        Ok(updated)
    }

    /// Published products a discount code can be applied to
    pub async fn list_products_for_discount(&self, query: DiscountProductsQuery) -> DiscountResult<Vec<ProductSummary>> {
        let discount = self.find_active(query.shop_id, &query.code).await?;
        let page = self.page(query.limit, query.page);

        let filter = match discount.apply_to {
            ApplyTo::All => ProductFilter::Owner(query.shop_id),
            ApplyTo::Specific => ProductFilter::Ids(discount.product_ids),
        };

        Ok(self.products.find_published(&filter, page).await?)
    }

    /// Active discount codes of one shop, without the owner field
    pub async fn list_by_shop(&self, query: ShopDiscountsQuery) -> DiscountResult<Vec<DiscountView>> {
        let page = self.page(query.limit, query.page);
        let discounts = self.discounts.list_active(query.shop_owner, page).await?;
        Ok(discounts.into_iter().map(DiscountView::from).collect())
    }

    /// Compute the discount a user would get on an order, without recording a use
    pub async fn amount(
        &self,
        shop_owner: Uuid,
        code: &str,
        user_id: Uuid,
        items: &[OrderItem],
    ) -> DiscountResult<DiscountAmount> {
        let discount = self.discounts.find_by_code(shop_owner, code).await?;
        discount_validator::check_amount(discount.as_ref(), user_id, items, Utc::now())
    }

    /// Validate the order and record one use of the code by `user_id`
    pub async fn redeem(
        &self,
        shop_owner: Uuid,
        code: &str,
        user_id: Uuid,
        items: &[OrderItem],
    ) -> DiscountResult<DiscountAmount> {
        let discount = self.discounts.find_by_code(shop_owner, code).await?;
        let amount = discount_validator::check_amount(discount.as_ref(), user_id, items, Utc::now())?;

        // check_amount rejects a missing discount, so this is always Some
        let Some(discount) = discount else {
            return Err(DiscountError::not_found("Discount code not found"));
        };

        // A concurrent redemption may have used the last slot since the check
        self.discounts
            .record_use(discount.id, user_id)
            .await?
            .ok_or_else(|| DiscountError::not_found("Discount code has been fully redeemed"))?;

        info!(%shop_owner, %code, %user_id, "Redeemed discount code");
        Ok(amount)
    }

    /// Delete a discount code regardless of recorded uses
    pub async fn delete(&self, shop_owner: Uuid, code: &str) -> DiscountResult<Discount> {
        let deleted = self
            .discounts
            .delete(shop_owner, code)
            .await?
            .ok_or_else(|| DiscountError::not_found("Discount code not found"))?;

        if deleted.use_count > 0 {
            warn!(%shop_owner, %code, use_count = deleted.use_count, "Deleted discount code with recorded uses");
        }
        info!(%shop_owner, %code, "Deleted discount code");
        Ok(deleted)
    }

    /// Give back one use of the code recorded for `user_id`
    pub async fn cancel(&self, shop_id: Uuid, user_id: Uuid, code: &str) -> DiscountResult<Discount> {
        let discount = self.find_active(shop_id, code).await?;

        let released = self
            .discounts
            .release_use(discount.id, user_id)
            .await?
            .ok_or_else(|| DiscountError::not_found("Discount code not found"))?;

        info!(shop_owner = %shop_id, %code, %user_id, "Cancelled discount code use");
        Ok(released)
    }

    /// Store connectivity, for the health endpoint
    pub async fn health_check(&self) -> DiscountResult<()> {
        Ok(self.discounts.health_check().await?)
    }

    async fn find_active(&self, shop_owner: Uuid, code: &str) -> DiscountResult<Discount> {
        self.discounts
            .find_by_code(shop_owner, code)
            .await?
            .filter(|d| d.is_active)
            .ok_or_else(|| DiscountError::not_found("Discount code not found"))
    }

    fn page(&self, limit: Option<u32>, page: Option<u32>) -> PageRequest {
        PageRequest::new(limit, page, self.pagination.default_limit, self.pagination.max_limit)
    }

    fn validate_payload(payload: &DiscountPayload, now: DateTime<Utc>) -> DiscountResult<()> {
        if payload.code.trim().is_empty() {
            return Err(DiscountError::bad_request("Discount code must not be empty"));
        }

        if now > payload.start_date || now > payload.end_date {
            return Err(DiscountError::bad_request("Discount code has expired"));
        }

        if payload.start_date >= payload.end_date {
            return Err(DiscountError::bad_request("Start date must be before end date"));
        }

        if payload.value < Decimal::ZERO {
            return Err(DiscountError::bad_request("Discount value must not be negative"));
        }

        if payload.discount_type == DiscountType::Percentage && payload.value > Decimal::ONE_HUNDRED {
            return Err(DiscountError::bad_request("Percentage discount cannot exceed 100"));
        }

        if payload.max_value.is_some_and(|m| m < Decimal::ZERO) || payload.min_order_value < Decimal::ZERO {
            return Err(DiscountError::bad_request("Order thresholds must not be negative"));
        }

        if payload.max_use < 0 || payload.use_count < 0 || payload.max_use_per_user < 0 {
            return Err(DiscountError::bad_request("Usage limits must not be negative"));
        }

        if payload.apply_to == ApplyTo::Specific && payload.product_ids.is_empty() {
            return Err(DiscountError::bad_request(
                "A discount for specific products needs at least one product id",
            ));
        }

        Ok(())
    }
}
