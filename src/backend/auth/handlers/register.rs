/**
 * Register Handler
 *
 * POST /api/auth/register
 *
 * ```http
 * POST /api/auth/register HTTP/1.1
 * Content-Type: application/json
 *
 * {"name": "Alice", "email": "alice@example.com", "password": "secret1"}
 * ```
 *
 * Responds `201 Created` with an `AuthResponse`. Invalid input is
 * `400 validation_error`, a taken email is `409 conflict`.
 */

use axum::{extract::State, http::StatusCode, response::Json};
use std::sync::Arc;

use crate::backend::auth::credentials::CredentialService;
use crate::backend::auth::handlers::types::{AuthResponse, RegisterRequest};
use crate::backend::error::BackendError;
use crate::backend::middleware::ApiJson;

pub async fn register(
    State(credentials): State<Arc<CredentialService>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), BackendError> {
    let (user, token) = credentials
        .register(&request.name, &request.email, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}
