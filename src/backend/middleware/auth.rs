/**
 * Authentication Extractor
 *
 * `AuthUser` pulls the bearer token from the `Authorization` header,
 * verifies it with the `CredentialService` and hands the handler an
 * `Identity`. A missing or bad token rejects the request with
 * `401 not_authorized` before the handler runs.
 */

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;

use crate::backend::auth::{CredentialService, Identity};
use crate::backend::error::BackendError;

/// The token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for the authenticated caller
#[derive(Clone, Debug)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<CredentialService>: FromRef<S>,
{
    type Rejection = BackendError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            tracing::debug!("[Auth] Missing or malformed Authorization header");
            BackendError::not_authorized("missing bearer token")
        })?;
        let credentials = Arc::<CredentialService>::from_ref(state);
        Ok(AuthUser(credentials.authenticate(token)?))
    }
}
