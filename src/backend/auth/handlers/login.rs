/**
 * Login Handler
 *
 * POST /api/auth/login
 *
 * # Security
 *
 * - Unknown emails and wrong passwords both return
 *   `401 {"error": "invalid email or password", "kind": "not_authorized"}`
 * - Passwords are never logged or returned in responses
 *
 * # Example Response
 *
 * ```json
 * {
 *   "token": "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...",
 *   "user": {
 *     "id": "123e4567-e89b-12d3-a456-426614174000",
 *     "name": "Alice",
 *     "email": "alice@example.com",
 *     "created_at": "2025-01-01T00:00:00Z"
 *   }
 * }
 * ```
 */

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::backend::auth::credentials::CredentialService;
use crate::backend::auth::handlers::types::{AuthResponse, LoginRequest};
use crate::backend::error::BackendError;
use crate::backend::middleware::ApiJson;

pub async fn login(
    State(credentials): State<Arc<CredentialService>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, BackendError> {
    let (user, token) = credentials.login(&request.email, &request.password).await?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}
