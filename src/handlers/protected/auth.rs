// handlers/protected/auth.rs - POST /api/auth/refresh handler

use axum::{extract::State, Extension};

use crate::auth::{create_token_pair, AuthError, TokenPair};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::types::AppState;

/// POST /api/auth/refresh - Exchange the current refresh token for a new pair
///
/// Requires `x-client-id` and `x-rtoken-id`. A refresh token that was already
/// exchanged once is treated as stolen and rejected with 403.
///
/// Output:
/// ```json
/// { "success": true, "data": { "access_token": "...", "refresh_token": "..." } }
/// ```
pub async fn refresh(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<TokenPair> {
    let refresh_token = auth
        .refresh_token
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Refresh token required"))?;

    if auth.key_store.refresh_tokens_used.iter().any(|t| t == refresh_token) {
        tracing::warn!(user_id = %auth.user_id, "Refresh token reuse detected");
        return Err(AuthError::RefreshTokenReused.into());
    }

    // No stored token yet means this is the first exchange for the key store
    if auth.key_store.refresh_token.as_deref().is_some_and(|t| t != refresh_token) {
        return Err(ApiError::unauthorized("Refresh token is not current"));
    }

    let pair = create_token_pair(
        &auth.claims.payload(),
        &auth.key_store.access_key,
        &auth.key_store.refresh_key,
        &state.security,
    )?;

    // Compare-and-set, so only one of two concurrent exchanges wins
    if !state
        .key_stores
        .rotate_refresh_token(auth.user_id, refresh_token, &pair.refresh_token)
        .await?
    {
        tracing::warn!(user_id = %auth.user_id, "Concurrent refresh token exchange rejected");
        return Err(AuthError::RefreshTokenReused.into());
    }

    tracing::info!(user_id = %auth.user_id, "Refreshed token pair");
    Ok(ApiResponse::success(pair))
}
