// handlers/protected/mod.rs - Protected handlers
//
// Every route here sits behind middleware::auth::authentication, which
// injects the caller as an `AuthUser` extension.

pub mod auth;
pub mod discount;
