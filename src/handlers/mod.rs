//! HTTP handlers

pub mod health;
pub mod users;

pub use health::health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::StoreError;

/// JSON body carried by every non-200 response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An HTTP-mapped failure: a status code plus an `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserExists(id) => Self {
                status: StatusCode::BAD_REQUEST,
                message: format!("user with id {id} already exists"),
            },
            StoreError::UserNotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("user with id {id} does not exist"),
            },
            StoreError::Database(e) => {
                // Internal detail goes to the operator log, not the client.
                error!("Storage error: {}", e);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal server error".to_string(),
                }
            }
        }
    }
}
