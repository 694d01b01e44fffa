use flux_auth::{PasswordPolicy, DEV_FALLBACK_SECRET};
use flux_cache::RateLimitConfig;
use flux_database::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub app_env: String,
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    pub password_policy: PasswordPolicy,
    pub rate_limit: RateLimitConfig,
    /// Key rate limiting on `X-Forwarded-For`/`X-Real-IP`. Only enable
    /// behind a proxy that overwrites those headers.
    pub trust_forwarded: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            app_env: std::env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()),
            database: DatabaseConfig::from_env(),
            jwt_secret: std::env::var("JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| {
                    tracing::warn!("⚠️  JWT_SECRET is not set, using the development fallback secret");
                    DEV_FALLBACK_SECRET.to_string()
                }),
            password_policy: PasswordPolicy::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            trust_forwarded: std::env::var("RATE_LIMIT_TRUST_FORWARDED")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}
