use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::manager::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    FixedAmount,
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::FixedAmount => "fixed_amount",
            DiscountType::Percentage => "percentage",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DatabaseError> {
        match s {
            "fixed_amount" => Ok(DiscountType::FixedAmount),
            "percentage" => Ok(DiscountType::Percentage),
            other => Err(DatabaseError::InvalidRecord(format!("unknown discount type '{}'", other))),
        }
    }
}

/// Which products a discount applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyTo {
    #[default]
    All,
    Specific,
}

impl ApplyTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyTo::All => "all",
            ApplyTo::Specific => "specific",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DatabaseError> {
        match s {
            "all" => Ok(ApplyTo::All),
            "specific" => Ok(ApplyTo::Specific),
            other => Err(DatabaseError::InvalidRecord(format!("unknown apply_to scope '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub id: Uuid,
    pub code: String,
    pub shop_owner: Uuid,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub max_value: Option<Decimal>,
    pub min_order_value: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_use: i32,
    pub use_count: i32,
    pub max_use_per_user: i32,
    pub users_used: Vec<Uuid>,
    pub is_active: bool,
    pub apply_to: ApplyTo,
    pub product_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Discount {
    /// Builds a new record owned by `shop_owner` from a validated payload.
    pub fn from_payload(shop_owner: Uuid, payload: DiscountPayload, now: DateTime<Utc>) -> Self {
        let product_ids = payload.normalized_product_ids();
        Self {
            id: Uuid::new_v4(),
            code: payload.code,
            shop_owner,
            name: payload.name,
            description: payload.description,
            discount_type: payload.discount_type,
            value: payload.value,
            max_value: payload.max_value,
            min_order_value: payload.min_order_value,
            start_date: payload.start_date,
            end_date: payload.end_date,
            max_use: payload.max_use,
            use_count: payload.use_count,
            max_use_per_user: payload.max_use_per_user,
            users_used: payload.users_used,
            is_active: payload.is_active,
            apply_to: payload.apply_to,
            product_ids,
            created_at: now,
            updated_at: now,
        }
    }

    /// Full-field replace. Identity, owner and creation time are kept.
    pub fn apply_payload(&mut self, payload: DiscountPayload, now: DateTime<Utc>) {
        let product_ids = payload.normalized_product_ids();
        self.code = payload.code;
        self.name = payload.name;
        self.description = payload.description;
        self.discount_type = payload.discount_type;
        self.value = payload.value;
        self.max_value = payload.max_value;
        self.min_order_value = payload.min_order_value;
        self.start_date = payload.start_date;
        self.end_date = payload.end_date;
        self.max_use = payload.max_use;
        self.use_count = payload.use_count;
        self.max_use_per_user = payload.max_use_per_user;
        self.users_used = payload.users_used;
        self.is_active = payload.is_active;
        self.apply_to = payload.apply_to;
        self.product_ids = product_ids;
        self.updated_at = now;
    }

    /// Number of recorded uses by one user.
    pub fn uses_by(&self, user_id: Uuid) -> usize {
        self.users_used.iter().filter(|u| **u == user_id).count()
    }

    pub fn applies_to_product(&self, product_id: Uuid) -> bool {
        match self.apply_to {
            ApplyTo::All => true,
            ApplyTo::Specific => self.product_ids.contains(&product_id),
        }
    }
}

/// Raw `discounts` row; enum columns are stored as text
#[derive(Debug, Clone, FromRow)]
pub struct DiscountRow {
    pub id: Uuid,
    pub code: String,
    pub shop_owner: Uuid,
    pub name: String,
    pub description: String,
    pub discount_type: String,
    pub value: Decimal,
    pub max_value: Option<Decimal>,
    pub min_order_value: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_use: i32,
    pub use_count: i32,
    pub max_use_per_user: i32,
    pub users_used: Vec<Uuid>,
    pub is_active: bool,
    pub apply_to: String,
    pub product_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DiscountRow> for Discount {
    type Error = DatabaseError;

    fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            code: row.code,
            shop_owner: row.shop_owner,
            name: row.name,
            description: row.description,
            discount_type: DiscountType::parse(&row.discount_type)?,
            value: row.value,
            max_value: row.max_value,
            min_order_value: row.min_order_value,
            start_date: row.start_date,
            end_date: row.end_date,
            max_use: row.max_use,
            use_count: row.use_count,
            max_use_per_user: row.max_use_per_user,
            users_used: row.users_used,
            is_active: row.is_active,
            apply_to: ApplyTo::parse(&row.apply_to)?,
            product_ids: row.product_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn default_active() -> bool {
    true
}

/// Every field a shop may set when creating or replacing a discount code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscountPayload {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default)]
    pub max_value: Option<Decimal>,
    #[serde(default)]
    pub min_order_value: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_use: i32,
    #[serde(default)]
    pub use_count: i32,
    #[serde(default)]
    pub max_use_per_user: i32,
    #[serde(default)]
    pub users_used: Vec<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub apply_to: ApplyTo,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

impl DiscountPayload {
    /// `all` scope never carries product ids.
    pub fn normalized_product_ids(&self) -> Vec<Uuid> {
        match self.apply_to {
            ApplyTo::All => Vec::new(),
            ApplyTo::Specific => {
                let mut ids = self.product_ids.clone();
                ids.sort();
                ids.dedup();
                ids
            }
        }
    }
}

/// Listing projection: owner field omitted
#[derive(Debug, Clone, Serialize)]
pub struct DiscountView {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub max_value: Option<Decimal>,
    pub min_order_value: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_use: i32,
    pub use_count: i32,
    pub max_use_per_user: i32,
    pub users_used: Vec<Uuid>,
    pub is_active: bool,
    pub apply_to: ApplyTo,
    pub product_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Discount> for DiscountView {
    fn from(d: Discount) -> Self {
        Self {
            id: d.id,
            code: d.code,
            name: d.name,
            description: d.description,
            discount_type: d.discount_type,
            value: d.value,
            max_value: d.max_value,
            min_order_value: d.min_order_value,
            start_date: d.start_date,
            end_date: d.end_date,
            max_use: d.max_use,
            use_count: d.use_count,
            max_use_per_user: d.max_use_per_user,
            users_used: d.users_used,
            is_active: d.is_active,
            apply_to: d.apply_to,
            product_ids: d.product_ids,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// One line of a candidate order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
}

impl OrderItem {
    /// `quantity * price`, or None on overflow
    pub fn line_total(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountAmount {
    pub total_order: Decimal,
    pub discount_amount: Decimal,
    pub total_order_after_discount: Decimal,
}
