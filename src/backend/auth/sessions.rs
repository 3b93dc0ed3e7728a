/**
 * Session Tokens
 *
 * This module handles JWT token generation and validation for user sessions.
 * Tokens are HS256-signed and never stored server-side; the secret and the
 * lifetime come from `AppConfig`.
 */

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::store::User;

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Email
    pub email: String,
    /// Display name
    pub name: String,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Who is on the other end of an authenticated request or connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

impl TryFrom<Claims> for Identity {
    type Error = BackendError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| BackendError::not_authorized("invalid session token"))?;
        Ok(Identity {
            user_id,
            email: claims.email,
            name: claims.name,
        })
    }
}

/// Issues and verifies session tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Create a JWT token for a user
    pub fn issue(&self, user: &User) -> Result<String, BackendError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, BackendError> {
        encode(&Header::default(), claims, &self.encoding).map_err(|e| {
            tracing::error!("[Auth] Failed to create token: {:?}", e);
            BackendError::internal("failed to create session token")
        })
    }

    /// Verify and decode a JWT token
    ///
    /// Expired, malformed and wrongly signed tokens are all `NotAuthorized`.
    pub fn verify(&self, token: &str) -> Result<Claims, BackendError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("[Auth] Token rejected: {}", e);
                BackendError::not_authorized("invalid or expired session token")
            })
    }
}
