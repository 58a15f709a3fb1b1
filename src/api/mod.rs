mod auth;
mod error;
mod ws;

use axum::Router;
use std::sync::Arc;

use crate::auth::{CookieConfig, FederatedVerifier, PasswordHasher};
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::realtime::ConnectionRegistry;

pub use auth::AuthState;
pub use error::ApiError;
pub use ws::WsState;

/// Everything the API routers share.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: Arc<CookieConfig>,
    pub passwords: PasswordHasher,
    pub federated: Option<Arc<dyn FederatedVerifier>>,
    pub registry: Arc<ConnectionRegistry>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

/// Create the API router.
pub fn create_api_router(ctx: ApiContext) -> Router {
    let ws_state = ws::WsState {
        db: ctx.db.clone(),
        jwt: ctx.jwt.clone(),
        cookies: ctx.cookies.clone(),
        registry: ctx.registry,
    };

    let auth_state = auth::AuthState {
        db: ctx.db,
        jwt: ctx.jwt,
        cookies: ctx.cookies,
        passwords: ctx.passwords,
        federated: ctx.federated,
        rate_limit_config: ctx.rate_limit_config,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/ws", ws::router(ws_state))
}
