pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod names;
pub mod rate_limit;
pub mod realtime;

use api::{ApiContext, create_api_router};
use auth::{CookieConfig, FederatedVerifier, PasswordHasher};
use axum::Router;
use chrono::Duration;
use clock::Clock;
use db::Database;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use realtime::ConnectionRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    pub access_ttl: Duration,
    /// Secret for signing refresh tokens, distinct from `access_secret`
    pub refresh_secret: Vec<u8>,
    /// Lifetime of refresh tokens and their sessions
    pub refresh_ttl: Duration,
    /// Secret for signing the refresh cookie
    pub cookie_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// bcrypt work factor for new password hashes
    pub bcrypt_cost: u32,
    /// Verifier for federated ID tokens; federated login is off when `None`
    pub federated: Option<Arc<dyn FederatedVerifier>>,
    /// Time source for token and session expiry
    pub clock: Arc<dyn Clock>,
    /// Live realtime connections, shared with any server code that emits events
    pub registry: Arc<ConnectionRegistry>,
    pub rate_limits: RateLimitConfig,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(
        &config.access_secret,
        config.access_ttl,
        &config.refresh_secret,
        config.refresh_ttl,
        config.clock.clone(),
    ));
    let cookies = Arc::new(CookieConfig::new(
        &config.cookie_secret,
        config.secure_cookies,
    ));

    let api_router = create_api_router(ApiContext {
        db: config.db.clone(),
        jwt,
        cookies,
        passwords: PasswordHasher::new(config.bcrypt_cost),
        federated: config.federated.clone(),
        registry: config.registry.clone(),
        rate_limit_config: Arc::new(config.rate_limits.clone()),
    });

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    cleanup::run_cleanup(&config.db, config.clock.now()).await;
    cleanup::spawn_cleanup_scheduler(config.db.clone(), config.clock.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
