use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Name and price projection of a published product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
}

/// Which published products a catalog lookup should return
#[derive(Debug, Clone, PartialEq)]
pub enum ProductFilter {
    /// Every published product of one shop
    Owner(Uuid),
    /// Published products whose id is in the set
    Ids(Vec<Uuid>),
}
