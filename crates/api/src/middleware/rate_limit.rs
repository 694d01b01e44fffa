use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct RateLimitError {
    error: String,
    message: String,
    retry_after: u64,
}

/// Extract the client address. Forwarding headers (first `X-Forwarded-For`
/// hop, then `X-Real-IP`) are only honoured behind a trusted proxy;
/// otherwise any client could rotate them to get a fresh bucket.
fn extract_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    headers
                        .get("x-real-ip")
                        .and_then(|h| h.to_str().ok())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                })
        })
        .flatten();

    forwarded
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Per-client token bucket applied to every route.
pub async fn rate_limit(
    State(state): State<Arc<crate::AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract_ip(request.headers(), peer, state.trust_forwarded);

    if state.rate_limiter.allow(&ip) {
        return next.run(request).await;
    }

    let retry_after = state
        .rate_limiter
        .config()
        .refill_interval()
        .as_secs()
        .max(1);

    tracing::warn!("Rate limit exceeded for IP: {}", ip);

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        Json(RateLimitError {
            error: "rate_limit_exceeded".to_string(),
            message: format!("Too many requests. Please try again in {} seconds.", retry_after),
            retry_after,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.1 , 172.16.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers
    }

    #[test]
    fn test_forwarded_for_first_hop_when_trusted() {
        assert_eq!(extract_ip(&forwarded_headers(), None, true), "10.0.0.1");
    }

    #[test]
    fn test_forwarded_headers_ignored_when_untrusted() {
        let peer: SocketAddr = "192.168.1.7:5000".parse().unwrap();

        assert_eq!(extract_ip(&forwarded_headers(), Some(peer), false), "192.168.1.7");
        assert_eq!(extract_ip(&forwarded_headers(), None, false), "unknown");
    }

    #[test]
    fn test_real_ip_then_peer() {
        let peer: SocketAddr = "192.168.1.7:5000".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_ip(&headers, Some(peer), true), "10.0.0.2");

        assert_eq!(extract_ip(&HeaderMap::new(), Some(peer), true), "192.168.1.7");
        assert_eq!(extract_ip(&HeaderMap::new(), None, true), "unknown");
    }
}
