use crate::handlers::{error_response, ApiError};
use crate::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap, Uri},
};
use flux_auth::{AuthError, SessionClaims, TokenService};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated user context
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

impl From<SessionClaims> for AuthUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Pull a session token from the `Authorization: Bearer` header, falling back
/// to a `?token=` query parameter when no header is sent.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::Malformed)?;
        return value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::Malformed);
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthenticated)
}

/// Resolve the caller from request headers in one call.
pub fn authenticate(
    tokens: &TokenService,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<AuthUser, AuthError> {
    let token = extract_token(headers, uri)?;
    let claims = tokens.verify(&token)?;
    Ok(AuthUser::from(claims))
}

/// Handlers that take an `AuthUser` only run for requests carrying a valid
/// session token.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&state.auth_service.jwt, &parts.headers, &parts.uri).map_err(|e| {
            tracing::debug!("Rejected request to {}: {}", parts.uri.path(), e);
            error_response(e.into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn uri(raw: &str) -> Uri {
        raw.parse().unwrap()
    }

    #[test]
    fn test_bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));

        let token = extract_token(&headers, &uri("/me?token=other")).unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn test_query_fallback() {
        let token = extract_token(&HeaderMap::new(), &uri("/me?token=abc")).unwrap();
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(
            extract_token(&HeaderMap::new(), &uri("/me")),
            Err(AuthError::Unauthenticated)
        );
        assert_eq!(
            extract_token(&HeaderMap::new(), &uri("/me?token=")),
            Err(AuthError::Unauthenticated)
        );
    }

    #[test]
    fn test_wrong_scheme_is_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&headers, &uri("/me")), Err(AuthError::Malformed));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers, &uri("/me")), Err(AuthError::Malformed));
    }

    #[test]
    fn test_authenticate() {
        let tokens = TokenService::new("test-secret-key-min-32-characters-long");
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, "alice@example.com").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let user = authenticate(&tokens, &headers, &uri("/me")).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email, "alice@example.com");

        let forged = authenticate(&tokens, &HeaderMap::new(), &uri("/me?token=a.b.c"));
        assert_eq!(forged.unwrap_err(), AuthError::Malformed);
    }
}
