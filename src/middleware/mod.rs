pub mod auth;
pub mod response;

pub use auth::{authentication, AuthUser};
pub use response::{ApiResponse, ApiResult};
