/**
 * API Routes
 *
 * Every route here takes a bearer token except register and login.
 *
 * ## Authentication
 * - `POST /api/auth/register` - Create an account
 * - `POST /api/auth/login` - Exchange credentials for a token
 * - `GET /api/auth/me` - The caller's account
 *
 * ## Groups
 * - `POST /api/groups`, `GET /api/groups`
 * - `POST /api/groups/join`
 * - `POST /api/groups/{code}/leave`, `DELETE /api/groups/{code}`
 * - `GET /api/groups/{code}/members`
 * - `GET|POST /api/groups/{code}/announcements`, `DELETE /api/announcements/{id}`
 *
 * ## Documents and resources
 * - `GET|POST /api/groups/{code}/documents`
 * - `GET /api/groups/{code}/resources`
 * - `GET /api/groups/{code}/usage`
 * - `POST /api/files/upload`
 */

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::backend::auth::{get_me, login, register};
use crate::backend::collab::handlers::{create_document, list_documents};
use crate::backend::groups::handlers::{
    create_group, delete_announcement, delete_group, join_group, leave_group, list_announcements, list_groups,
    list_members, post_announcement,
};
use crate::backend::resources::handlers::{group_usage, list_resources, upload_file, UPLOAD_OVERHEAD_BYTES};
use crate::backend::server::state::AppState;

pub fn configure_api_routes(router: Router<AppState>, max_upload_bytes: u64) -> Router<AppState> {
    let upload_body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(UPLOAD_OVERHEAD_BYTES);

    router
        // Authentication
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(get_me))
        // Groups and membership
        .route("/api/groups", post(create_group).get(list_groups))
        .route("/api/groups/join", post(join_group))
        .route("/api/groups/{code}", delete(delete_group))
        .route("/api/groups/{code}/leave", post(leave_group))
        .route("/api/groups/{code}/members", get(list_members))
        .route(
            "/api/groups/{code}/announcements",
            get(list_announcements).post(post_announcement),
        )
        .route("/api/announcements/{id}", delete(delete_announcement))
        // Documents and resources
        .route(
            "/api/groups/{code}/documents",
            get(list_documents).post(create_document),
        )
        .route("/api/groups/{code}/resources", get(list_resources))
        .route("/api/groups/{code}/usage", get(group_usage))
        .route(
            "/api/files/upload",
            post(upload_file).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
}
