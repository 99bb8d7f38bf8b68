// handlers/protected/discount.rs - /api/discount handlers
//
// The caller (`x-client-id`) is the shop owner for create, update, list and
// delete, and the buying user for amount, redeem and cancel.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::{DiscountAmount, DiscountPayload, DiscountView, OrderItem, ProductSummary};
use crate::handlers::json_body;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{DiscountProductsQuery, ShopDiscountsQuery};
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub shop_id: Uuid,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

/// Body of amount and redeem
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderRequest {
    pub code: String,
    pub shop_id: Uuid,
    #[serde(default)]
    pub products: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelRequest {
    pub code: String,
    pub shop_id: Uuid,
}

/// POST /api/discount - create a discount code for the caller's shop
///
/// Input: a discount payload (`code`, `name`, `type`, `value`, `start_date`,
/// `end_date`, `max_use`, ...). Output: the stored code, 201.
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<DiscountPayload>, JsonRejection>,
) -> ApiResult<DiscountView> {
    let payload = json_body(body)?;
    let discount = state.discounts.create(auth.user_id, payload).await?;
    Ok(ApiResponse::created(discount.into()))
}

/// PUT /api/discount - replace the fields of an existing code, matched by `code`
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<DiscountPayload>, JsonRejection>,
) -> ApiResult<DiscountView> {
    let payload = json_body(body)?;
    let discount = state.discounts.update(auth.user_id, payload).await?;
    Ok(ApiResponse::success(discount.into()))
}

/// GET /api/discount?limit&page - active codes of the caller's shop
pub async fn list_by_shop(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<DiscountView>> {
    let discounts = state
        .discounts
        .list_by_shop(ShopDiscountsQuery {
            shop_owner: auth.user_id,
            limit: query.limit,
            page: query.page,
        })
        .await?;
    Ok(ApiResponse::success(discounts))
}

/// GET /api/discount/:code/products?shop_id&limit&page
pub async fn products(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ProductsQuery>,
) -> ApiResult<Vec<ProductSummary>> {
    let products = state
        .discounts
        .list_products_for_discount(DiscountProductsQuery {
            code,
            shop_id: query.shop_id,
            limit: query.limit,
            page: query.page,
        })
        .await?;
    Ok(ApiResponse::success(products))
}

/// POST /api/discount/amount - price an order with a code, nothing recorded
///
/// Input:
/// ```json
/// { "code": "SALE10", "shop_id": "...", "products": [{ "product_id": "...", "quantity": 2, "price": "50000" }] }
/// ```
pub async fn amount(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult<DiscountAmount> {
    let order = json_body(body)?;
    let amount = state
        .discounts
        .amount(order.shop_id, &order.code, auth.user_id, &order.products)
        .await?;
    Ok(ApiResponse::success(amount))
}

/// POST /api/discount/redeem - price an order and record one use by the caller
pub async fn redeem(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult<DiscountAmount> {
    let order = json_body(body)?;
    let amount = state
        .discounts
        .redeem(order.shop_id, &order.code, auth.user_id, &order.products)
        .await?;
    Ok(ApiResponse::success(amount))
}

/// POST /api/discount/cancel - give back one of the caller's uses
pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> ApiResult<DiscountView> {
    let request = json_body(body)?;
    let discount = state
        .discounts
        .cancel(request.shop_id, auth.user_id, &request.code)
        .await?;
    Ok(ApiResponse::success(discount.into()))
}

/// DELETE /api/discount/:code
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<DiscountView> {
    let discount = state.discounts.delete(auth.user_id, &code).await?;
    Ok(ApiResponse::success(discount.into()))
}
