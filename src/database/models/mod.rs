pub mod discount;
pub mod key_store;
pub mod product;

pub use discount::{
    ApplyTo, Discount, DiscountAmount, DiscountPayload, DiscountRow, DiscountType, DiscountView,
    OrderItem,
};
pub use key_store::KeyStore;
pub use product::{ProductFilter, ProductSummary};
