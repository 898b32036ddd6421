//! HTTP error bodies.
//!
//! Authorization failures carry their machine code; every other failure gets
//! one fixed body per status.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use crate::auth::AuthorizationError;
use crate::drinks::DrinkError;

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "code": self.code(),
            "description": self.description(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthorizationError),
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => e.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // One fixed message per status; the detail only goes to the log.
        let (message, detail) = match self {
            ApiError::Auth(e) => return e.into_response(),
            ApiError::BadRequest(detail) => ("could not process request", detail),
            ApiError::NotFound(detail) => ("resource not found", detail),
            ApiError::Unprocessable(detail) => ("unprocessable", detail),
        };
        debug!("Request rejected with {}: {}", status, detail);

        let body = json!({
            "success": false,
            "error": status.as_u16(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<DrinkError> for ApiError {
    fn from(err: DrinkError) -> Self {
        match err {
            DrinkError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DrinkError::DuplicateTitle(_) | DrinkError::Invalid(_) => {
                ApiError::Unprocessable(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::Unprocessable(e.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        // Ids that cannot be parsed name no drink.
        ApiError::NotFound(rejection.body_text())
    }
}
