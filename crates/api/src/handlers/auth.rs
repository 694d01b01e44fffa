use super::{error_response, ApiError, MessageResponse};
use crate::middleware::AuthUser;
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use flux_auth::AuthSession;
use flux_models::CredentialProfile;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Register a new user
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthSession>), ApiError> {
    let session = state
        .auth_service
        .register(&request.name, &request.email, &request.password)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthSession>, ApiError> {
    let session = state
        .auth_service
        .login(&request.email, &request.password)
        .await
        .map_err(error_response)?;

    tracing::info!(user_id = %session.user.id, "User logged in");

    Ok(Json(session))
}

/// Get current user info
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CredentialProfile>, ApiError> {
    let profile = state
        .auth_service
        .profile(user.user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(profile))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth_service
        .change_password(user.user_id, &request.current_password, &request.new_password)
        .await
        .map_err(error_response)?;

    tracing::info!(user_id = %user.user_id, email = %user.email, "Password changed via API");

    Ok(Json(MessageResponse::new("Password changed successfully")))
}
