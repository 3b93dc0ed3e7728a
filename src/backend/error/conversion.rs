/**
 * Error Conversion
 *
 * All backend errors implement `IntoResponse` from Axum, allowing them to be
 * returned directly from handlers.
 *
 * # Response Format
 *
 * ```json
 * {
 *   "error": "Error message",
 *   "kind": "not_authorized",
 *   "status": 401
 * }
 * ```
 */

use axum::{
    response::{IntoResponse, Json, Response},
};

use crate::backend::error::types::BackendError;
use crate::shared::ErrorBody;

impl BackendError {
    /// The JSON body this error renders as
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message(),
            kind: self.kind(),
            status: self.status_code().as_u16(),
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("[Error] {} ({})", self.message(), self.kind());
        } else {
            tracing::debug!("[Error] {} ({})", self.message(), self.kind());
        }
        (status, Json(self.to_body())).into_response()
    }
}
