//! Mapping between store errors and HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use cstore_contracts::{ConsentError, ErrorKind};

use crate::dto::ErrorResponse;

/// Status code a given error kind is served with.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotLatestInChain => StatusCode::CONFLICT,
        ErrorKind::Storage | ErrorKind::Config | ErrorKind::Transport => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Inverse of `status_for`, used by the remote client.
pub fn kind_for(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::NotLatestInChain,
        _ => ErrorKind::Storage,
    }
}

/// A `ConsentError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ConsentError);

impl From<ConsentError> for ApiError {
    fn from(err: ConsentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}
