pub mod auth;
pub mod health;
pub mod password_reset;

use axum::{http::StatusCode, Json};
use flux_auth::{AuthError, Error, ResetError};
use flux_database::DatabaseError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: &str, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(error, message)))
}

/// Map a service error onto a status code and a client-safe body. Store and
/// crypto failures are logged and reported generically.
pub fn error_response(err: Error) -> ApiError {
    match err {
        Error::Policy(e) => api_error(StatusCode::BAD_REQUEST, "weak_password", &e.to_string()),
        Error::Auth(AuthError::Unauthenticated) => api_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "Authentication required",
        ),
        Error::Auth(e) => {
            tracing::debug!("Token rejected: {}", e);
            api_error(StatusCode::UNAUTHORIZED, "invalid_token", "Invalid or expired token")
        }
        Error::Reset(ResetError::NotFound) => api_error(
            StatusCode::BAD_REQUEST,
            "invalid_reset_token",
            "Invalid or unknown reset token",
        ),
        Error::Reset(ResetError::Expired) => api_error(
            StatusCode::BAD_REQUEST,
            "reset_token_expired",
            "Reset token has expired",
        ),
        Error::Reset(ResetError::AlreadyUsed) => api_error(
            StatusCode::BAD_REQUEST,
            "reset_token_used",
            "Reset token has already been used",
        ),
        Error::InvalidCredentials => api_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid email or password",
        ),
        Error::EmailTaken => api_error(
            StatusCode::CONFLICT,
            "email_taken",
            "Email already registered",
        ),
        Error::Database(DatabaseError::NotFound(_)) => {
            api_error(StatusCode::NOT_FOUND, "not_found", "Resource not found")
        }
        Error::Validation(msg) => api_error(StatusCode::BAD_REQUEST, "validation_error", &msg),
        Error::Delivery(msg) => {
            tracing::error!("Notification delivery failed: {}", msg);
            api_error(
                StatusCode::BAD_GATEWAY,
                "delivery_failed",
                "Failed to send email, please try again later",
            )
        }
        other => {
            tracing::error!("Request failed: {}", other);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}
