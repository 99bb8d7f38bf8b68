use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::{verify_token, AuthError, Claims};
use crate::database::models::KeyStore;
use crate::error::ApiError;
use crate::types::AppState;

pub const HEADER_CLIENT_ID: &str = "x-client-id";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_REFRESH_TOKEN: &str = "x-rtoken-id";

/// Authenticated caller, injected into request extensions
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub claims: Claims,
    pub key_store: KeyStore,
    /// Present when the request authenticated with a refresh token
    pub refresh_token: Option<String>,
}

/// Resolves the caller's key store from `x-client-id`, then verifies the
/// refresh token (`x-rtoken-id`) if sent, otherwise the access token
/// (`authorization`). The token's user id must match the client id.
pub async fn authentication(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let user_id = header_str(headers, HEADER_CLIENT_ID)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(AuthError::InvalidRequest)?;

    let key_store = state
        .key_stores
        .find_by_user_id(user_id)
        .await?
        .ok_or(AuthError::KeyStoreNotFound)?;

    if let Some(refresh_token) = header_str(headers, HEADER_REFRESH_TOKEN) {
        let claims = verify_token(refresh_token, &key_store.refresh_key)?;
        if claims.user_id != user_id {
            return Err(AuthError::UserMismatch);
        }
        return Ok(AuthUser {
            user_id,
            claims,
            refresh_token: Some(refresh_token.to_string()),
            key_store,
        });
    }

    let access_token = header_str(headers, HEADER_AUTHORIZATION)
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::InvalidRequest)?;

    let claims = verify_token(access_token, &key_store.access_key)?;
    if claims.user_id != user_id {
        return Err(AuthError::UserMismatch);
    }

    Ok(AuthUser {
        user_id,
        claims,
        key_store,
        refresh_token: None,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token_pair, TokenPayload};
    use crate::config::AppConfig;
    use crate::database::memory::{MemoryDiscountStore, MemoryKeyStoreRepository, MemoryProductCatalog};
    use crate::database::store::KeyStoreRepository;
    use crate::services::DiscountService;
    use axum::http::HeaderValue;
    use std::sync::Arc;

    async fn state_with_user(user_id: Uuid) -> AppState {
        let config = AppConfig::development();
        let key_stores = Arc::new(MemoryKeyStoreRepository::new());
        key_stores
            .save(&KeyStore::new(user_id, "access-key", "refresh-key"))
            .await
            .unwrap();
        AppState {
            discounts: DiscountService::new(
                Arc::new(MemoryDiscountStore::new()),
                Arc::new(MemoryProductCatalog::new()),
                config.pagination,
            ),
            key_stores,
            security: config.security,
        }
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn tokens(user_id: Uuid) -> crate::auth::TokenPair {
        let payload = TokenPayload {
            user_id,
            email: "shop@example.com".to_string(),
        };
        create_token_pair(&payload, "access-key", "refresh-key", &AppConfig::development().security).unwrap()
    }

    #[tokio::test]
    async fn accepts_access_token_with_or_without_bearer() {
        let user = Uuid::new_v4();
        let state = state_with_user(user).await;
        let pair = tokens(user);

        let plain = headers(&[(HEADER_CLIENT_ID, user.to_string()), (HEADER_AUTHORIZATION, pair.access_token.clone())]);
        let auth = authenticate(&state, &plain).await.unwrap();
        assert_eq!(auth.user_id, user);
        assert!(auth.refresh_token.is_none());

        let bearer = headers(&[
            (HEADER_CLIENT_ID, user.to_string()),
            (HEADER_AUTHORIZATION, format!("Bearer {}", pair.access_token)),
        ]);
        assert!(authenticate(&state, &bearer).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_header_takes_precedence() {
        let user = Uuid::new_v4();
        let state = state_with_user(user).await;
        let pair = tokens(user);

        let h = headers(&[(HEADER_CLIENT_ID, user.to_string()), (HEADER_REFRESH_TOKEN, pair.refresh_token.clone())]);
        let auth = authenticate(&state, &h).await.unwrap();
        assert_eq!(auth.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));

        // an access token is not a valid refresh token
        let h = headers(&[(HEADER_CLIENT_ID, user.to_string()), (HEADER_REFRESH_TOKEN, pair.access_token)]);
        assert!(matches!(authenticate(&state, &h).await, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn rejects_missing_headers_and_unknown_users() {
        let user = Uuid::new_v4();
        let state = state_with_user(user).await;

        let err = authenticate(&state, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest));

        let err = authenticate(&state, &headers(&[(HEADER_CLIENT_ID, user.to_string())])).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest));

        let stranger = Uuid::new_v4();
        let err = authenticate(&state, &headers(&[(HEADER_CLIENT_ID, stranger.to_string())]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::KeyStoreNotFound));
    }

    #[tokio::test]
    async fn rejects_token_for_another_user() {
        let user = Uuid::new_v4();
        let state = state_with_user(user).await;
        let foreign = tokens(Uuid::new_v4());

        let h = headers(&[(HEADER_CLIENT_ID, user.to_string()), (HEADER_AUTHORIZATION, foreign.access_token)]);
        assert!(matches!(authenticate(&state, &h).await, Err(AuthError::UserMismatch)));
    }
}
