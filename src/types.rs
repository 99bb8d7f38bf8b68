/// Shared types used across the codebase

use std::sync::Arc;

use crate::config::SecurityConfig;
use crate::database::store::KeyStoreRepository;
use crate::services::DiscountService;

/// Router state handed to every handler and middleware
#[derive(Clone)]
pub struct AppState {
    pub discounts: DiscountService,
    pub key_stores: Arc<dyn KeyStoreRepository>,
    pub security: SecurityConfig,
}
