/**
 * Router Configuration
 *
 * Combines the API routes with the non-API endpoints:
 *
 * - `GET /collab/{document_id}` - Document session WebSocket
 * - `GET /files/download/{*key}` - Signed file download
 * - `GET /health` - Liveness
 *
 * Unknown paths get the standard JSON error body with `404 not_found`.
 * Every request is traced and CORS is open so browser clients on another
 * origin can call the API with a bearer token.
 */

use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backend::collab::handlers::document_session;
use crate::backend::error::BackendError;
use crate::backend::objects::signing::DOWNLOAD_PATH;
use crate::backend::resources::handlers::download_file;
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> BackendError {
    BackendError::not_found("No such endpoint")
}

pub fn create_router(app_state: AppState) -> Router<()> {
    let max_upload_bytes = app_state.resources.max_upload_bytes();

    let router = Router::new()
        .route("/health", get(health))
        .route("/collab/{document_id}", get(document_session))
        .route(&format!("{}/{{*key}}", DOWNLOAD_PATH), get(download_file));

    let router = configure_api_routes(router, max_upload_bytes);

    router
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
