// handlers/mod.rs - Handler tiers
//
// Public (no auth) → Protected (x-client-id + token, see middleware::auth)

pub mod protected;
pub mod public;

use axum::{
    extract::rejection::JsonRejection,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::middleware::authentication;
use crate::types::AppState;

/// Full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Protected
        .merge(protected_routes(state.clone()))
        .fallback(|| async { ApiError::not_found("Route not found") })
        // Global middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{auth, discount};

    Router::new()
        .route("/api/auth/refresh", post(auth::refresh))
        .route(
            "/api/discount",
            get(discount::list_by_shop)
                .post(discount::create)
                .put(discount::update),
        )
        .route("/api/discount/amount", post(discount::amount))
        .route("/api/discount/redeem", post(discount::redeem))
        .route("/api/discount/cancel", post(discount::cancel))
        .route("/api/discount/:code", delete(discount::delete))
        .route("/api/discount/:code/products", get(discount::products))
        .route_layer(middleware::from_fn_with_state(state, authentication))
}

/// Unwrap a JSON body, reporting malformed input as `INVALID_JSON`
pub(crate) fn json_body<T: DeserializeOwned>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))
}
