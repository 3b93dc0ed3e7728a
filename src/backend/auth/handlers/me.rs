/**
 * Get Current User Handler
 *
 * GET /api/auth/me with `Authorization: Bearer <token>`. Returns the user
 * without the password hash; a token for a user that no longer exists is
 * `401`.
 */

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::backend::auth::credentials::CredentialService;
use crate::backend::auth::handlers::types::UserResponse;
use crate::backend::error::BackendError;
use crate::backend::middleware::AuthUser;

pub async fn get_me(
    State(credentials): State<Arc<CredentialService>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<UserResponse>, BackendError> {
    let user = credentials.user(identity.user_id).await?;
    Ok(Json(user.into()))
}
