// Flux API Server
// HTTP surface over the credential, session and password-reset services

mod config;
mod handlers;
mod middleware;
mod routes;

use config::Config;
use dotenvy::dotenv;
use flux_auth::{
    AuthService, LogNotifier, Notifier, PasswordResetService, SmtpNotifier, TokenService,
};
use flux_cache::RateLimiter;
use flux_database::{CredentialStore, Database, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct AppState {
    pub auth_service: AuthService,
    pub password_reset_service: PasswordResetService,
    pub rate_limiter: RateLimiter,
    pub trust_forwarded: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,flux_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    init_tracing();

    tracing::info!("🚀 Starting Flux API Server");
    tracing::info!("📦 Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    tracing::info!("🌍 Environment: {}", config.app_env);

    let migrate_only = std::env::args().nth(1).as_deref() == Some("migrate");

    // Initialize credential store
    let store: Arc<dyn CredentialStore> = if config.database.is_memory() {
        if migrate_only {
            anyhow::bail!("migrate needs a PostgreSQL DATABASE_URL");
        }
        tracing::warn!("⚠️  Using in-memory credential store, data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("🗄️  Connecting to database...");
        let database = Database::new(config.database.clone()).await?;
        database.ping().await?;
        tracing::info!("✅ Database connected");

        if migrate_only {
            database.migrate().await?;
            tracing::info!("✅ Migrations applied");
            database.close().await;
            return Ok(());
        }

        Arc::new(database)
    };

    let jwt = Arc::new(TokenService::new(&config.jwt_secret));
    tracing::info!("🔐 Token service initialized");

    let auth_service = AuthService::new(store.clone(), jwt, config.password_policy.clone());
    tracing::info!("🔑 Auth service initialized");

    let notifier: Arc<dyn Notifier> = if config.is_production() {
        Arc::new(SmtpNotifier::from_env()?)
    } else {
        Arc::new(LogNotifier::from_env())
    };
    tracing::info!("📧 Notifier initialized");

    let password_reset_service =
        PasswordResetService::new(store, notifier, config.password_policy.clone());
    tracing::info!("🔑 Password reset service initialized");

    let rate_limiter = RateLimiter::new(config.rate_limit);
    rate_limiter.start();
    tracing::info!(
        "🛡️  Rate limiter: {} requests per {:?}",
        config.rate_limit.requests_per_window,
        config.rate_limit.window
    );
    if config.trust_forwarded {
        tracing::info!("Rate limiter keys on X-Forwarded-For / X-Real-IP");
    }

    let state = Arc::new(AppState {
        auth_service,
        password_reset_service,
        rate_limiter: rate_limiter.clone(),
        trust_forwarded: config.trust_forwarded,
    });

    let app = routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!("📡 Routes configured:");
    tracing::info!("   GET  /health");
    tracing::info!("   POST /api/v1/auth/register");
    tracing::info!("   POST /api/v1/auth/login");
    tracing::info!("   GET  /api/v1/auth/me");
    tracing::info!("   PUT  /api/v1/auth/password");
    tracing::info!("   POST /api/v1/auth/password-reset/request");
    tracing::info!("   GET  /api/v1/auth/password-reset/verify");
    tracing::info!("   POST /api/v1/auth/password-reset/confirm");

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("✅ Server ready at http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    rate_limiter.stop();
    tracing::info!("👋 Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
