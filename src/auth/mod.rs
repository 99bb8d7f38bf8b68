use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::database::manager::DatabaseError;

/// Identity carried by both tokens of a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    /// Unique per token, so pairs issued within the same second differ
    pub jti: Uuid,
}

impl Claims {
    pub fn new(payload: &TokenPayload, ttl_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(ttl_hours as i64)).timestamp();

        Self {
            user_id: payload.user_id,
            email: payload.email.clone(),
            exp,
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        }
    }

    pub fn payload(&self) -> TokenPayload {
        TokenPayload {
            user_id: self.user_id,
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    #[error("Signing key is empty")]
    InvalidSecret,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid request")]
    InvalidRequest,

    #[error("Invalid user id")]
    UserMismatch,

    #[error("KeyStore not found")]
    KeyStoreNotFound,

    #[error("Refresh token has already been used")]
    RefreshTokenReused,

    #[error("Key store error: {0}")]
    Store(#[from] DatabaseError),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Sign an access token with `access_key` and a refresh token with
/// `refresh_key`, lifetimes taken from the security config.
pub fn create_token_pair(
    payload: &TokenPayload,
    access_key: &str,
    refresh_key: &str,
    security: &SecurityConfig,
) -> AuthResult<TokenPair> {
    let access_token = sign(&Claims::new(payload, security.access_token_ttl_hours), access_key)?;
    let refresh_token = sign(&Claims::new(payload, security.refresh_token_ttl_hours), refresh_key)?;

    match verify_token(&access_token, access_key) {
        Ok(claims) => tracing::debug!(user_id = %claims.user_id, "Issued token pair"),
        Err(e) => tracing::error!(error = %e, "Freshly issued access token failed verification"),
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Decode and validate a token signed with `key`
pub fn verify_token(token: &str, key: &str) -> AuthResult<Claims> {
    if key.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(key.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}

fn sign(claims: &Claims, key: &str) -> AuthResult<String> {
    if key.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(key.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn payload() -> TokenPayload {
        TokenPayload {
            user_id: Uuid::new_v4(),
            email: "shop@example.com".to_string(),
        }
    }

    #[test]
    fn token_pair_verifies_with_matching_keys() {
        let security = AppConfig::development().security;
        let payload = payload();
        let pair = create_token_pair(&payload, "access-secret", "refresh-secret", &security).unwrap();

        let access = verify_token(&pair.access_token, "access-secret").unwrap();
        assert_eq!(access.payload(), payload);
        assert_eq!(access.exp - access.iat, 48 * 3600);

        let refresh = verify_token(&pair.refresh_token, "refresh-secret").unwrap();
        assert_eq!(refresh.user_id, payload.user_id);
        assert_eq!(refresh.exp - refresh.iat, 168 * 3600);
    }

    #[test]
    fn tokens_do_not_verify_with_the_other_key() {
        let security = AppConfig::development().security;
        let pair = create_token_pair(&payload(), "access-secret", "refresh-secret", &security).unwrap();

        assert!(matches!(
            verify_token(&pair.access_token, "refresh-secret"),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verify_token(&pair.refresh_token, "access-secret"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        let security = AppConfig::development().security;
        assert!(matches!(
            create_token_pair(&payload(), "", "refresh-secret", &security),
            Err(AuthError::InvalidSecret)
        ));
    }

    #[test]
    fn consecutive_pairs_are_distinct() {
        let security = AppConfig::development().security;
        let payload = payload();
        let first = create_token_pair(&payload, "access-secret", "refresh-secret", &security).unwrap();
        let second = create_token_pair(&payload, "access-secret", "refresh-secret", &security).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(&payload(), 1);
        claims.iat -= 3 * 3600;
        claims.exp = claims.iat + 60;
        let token = sign(&claims, "access-secret").unwrap();
        assert!(matches!(verify_token(&token, "access-secret"), Err(AuthError::InvalidToken(_))));
    }
}
