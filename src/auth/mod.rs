use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantContext;

/// Token claims issued by the login flow. Tenant fields are optional on the
/// wire so that tokens minted before multi-tenancy still decode and can be
/// rejected with a precise reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        tenant: &TenantContext,
        expiry_hours: u64,
    ) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id.into(),
            username: Some(username.into()),
            database_name: Some(tenant.database_name.clone()),
            organisation_id: Some(tenant.organisation_id),
            organisation_name: Some(tenant.organisation_name.clone()),
            role: None,
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Role allowed to manage its organisation's shared resources.
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated principal extracted from a verified JWT
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub username: Option<String>,
    pub database_name: Option<String>,
    pub organisation_id: Option<i32>,
    pub organisation_name: Option<String>,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            database_name: claims.database_name,
            organisation_id: claims.organisation_id,
            organisation_name: claims.organisation_name,
            role: claims.role,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
}

/// HS256 signing and verification keys.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn generate(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| JwtError::TokenGeneration(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| JwtError::InvalidToken(e.to_string()))
    }
}
