use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-user signing keys for the access/refresh token pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct KeyStore {
    pub user_id: Uuid,
    /// Signs and verifies access tokens
    pub access_key: String,
    /// Signs and verifies refresh tokens
    pub refresh_key: String,
    pub refresh_token: Option<String>,
    pub refresh_tokens_used: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl KeyStore {
    pub fn new(user_id: Uuid, access_key: impl Into<String>, refresh_key: impl Into<String>) -> Self {
        Self {
            user_id,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
            refresh_token: None,
            refresh_tokens_used: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}
