pub mod discount_service;
pub mod discount_validator;

pub use discount_service::{DiscountError, DiscountProductsQuery, DiscountResult, DiscountService, ShopDiscountsQuery};
pub use discount_validator::check_amount;
