use crate::handlers;
use crate::middleware;
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        // Auth routes
        .route("/api/v1/auth/register", post(handlers::auth::register))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        // Session-authenticated routes
        .route("/api/v1/auth/me", get(handlers::auth::me))
        .route("/api/v1/auth/password", put(handlers::auth::change_password))
        // Password reset
        .route(
            "/api/v1/auth/password-reset/request",
            post(handlers::password_reset::request_password_reset),
        )
        .route(
            "/api/v1/auth/password-reset/verify",
            get(handlers::password_reset::verify_reset_token),
        )
        .route(
            "/api/v1/auth/password-reset/confirm",
            post(handlers::password_reset::reset_password),
        )
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .with_state(state)
}
