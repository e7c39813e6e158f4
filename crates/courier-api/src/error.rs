use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use courier_db::StoreError;

/// API-level error taxonomy. Every variant carries a human-readable
/// message; `into_response` maps the kind to a status code and a JSON body
/// of the form `{"error": {"code", "message"}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("username already taken: {0}")]
    DuplicateIdentity(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid or malformed token")]
    InvalidToken,

    #[error("you do not have access to this resource")]
    Forbidden,

    #[error("message is already marked read")]
    AlreadyRead,

    #[error("storage failure")]
    Persistence(#[source] StoreError),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::DuplicateIdentity(_) => (StatusCode::BAD_REQUEST, "duplicate_identity"),
            ApiError::InvalidCredentials => (StatusCode::BAD_REQUEST, "invalid_credentials"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ApiError::AlreadyRead => (StatusCode::BAD_REQUEST, "already_read"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Persistence(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.code();

        // Server faults are logged in full and reported opaquely.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = ?self, "request failed");
            "internal server error".to_owned()
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": { "code": code, "message": message } }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername(u) => ApiError::DuplicateIdentity(u),
            StoreError::UnknownUser(u) => ApiError::NotFound(format!("no such user: {u}")),
            StoreError::UnknownMessage(id) => ApiError::NotFound(format!("no such message: {id}")),
            StoreError::AlreadyRead(_) => ApiError::AlreadyRead,
            e @ (StoreError::Poisoned | StoreError::Sqlite(_)) => ApiError::Persistence(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}
