use super::{api_error, error_response, ApiError, MessageResponse};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists with that email, a password reset link has been sent";

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetTokenQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResetTokenResponse {
    pub valid: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Request a password reset email. The response does not reveal whether the
/// address is registered.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .password_reset_service
        .request_reset(&request.email)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

/// Check a reset token without consuming it
pub async fn verify_reset_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyResetTokenQuery>,
) -> Result<Json<VerifyResetTokenResponse>, ApiError> {
    let token = state
        .password_reset_service
        .inspect(&query.token)
        .await
        .map_err(error_response)?;

    Ok(Json(VerifyResetTokenResponse {
        valid: true,
        expires_at: token.expires_at,
    }))
}

/// Set a new password with a reset token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if request.new_password != request.confirm_password {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "password_mismatch",
            "Passwords do not match",
        ));
    }

    state
        .password_reset_service
        .consume(&request.token, &request.new_password)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}
