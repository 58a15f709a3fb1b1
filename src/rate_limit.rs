//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};

/// Per-IP rate limiter for stricter endpoint-specific limiting.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_SEC: u32 = 1;
const LOGIN_BURST: u32 = 5;
const SIGNUP_PER_MIN: u32 = 3;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for password and federated login (5 burst, then 1 per second)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for signup (3 per minute)
    pub signup: Arc<IpLimiter>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    /// Create rate limiters with the production quotas.
    /// Tests that hammer the endpoints build their own with [`Self::with_limits`].
    pub fn new() -> Self {
        Self::with_limits(LOGIN_PER_SEC, LOGIN_BURST, SIGNUP_PER_MIN)
    }

    /// Build limiters with explicit quotas. Zero is treated as one.
    pub fn with_limits(login_per_sec: u32, login_burst: u32, signup_per_min: u32) -> Self {
        let nz = |n: u32| NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN);
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(nz(login_per_sec)).allow_burst(nz(login_burst)),
            )),
            signup: Arc::new(RateLimiter::keyed(Quota::per_minute(nz(signup_per_min)))),
        }
    }
}

/// Client IP from the connection, or a shared bucket when it is unknown.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware for rate limiting login endpoints.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&request);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many authentication attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}

/// Middleware for rate limiting signup.
pub async fn rate_limit_signup(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&request);

    match config.signup.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Signup rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many signup attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_burst_then_limited() {
        let config = RateLimitConfig::with_limits(1, 3, 3);

        for _ in 0..3 {
            assert!(config.login.check_key(&"10.0.0.1".to_string()).is_ok());
        }
        assert!(config.login.check_key(&"10.0.0.1".to_string()).is_err());
        // Other clients have their own bucket.
        assert!(config.login.check_key(&"10.0.0.2".to_string()).is_ok());
    }

    #[test]
    fn test_default_quotas() {
        let config = RateLimitConfig::new();
        let ip = "10.0.0.9".to_string();

        for _ in 0..5 {
            assert!(config.login.check_key(&ip).is_ok());
        }
        assert!(config.login.check_key(&ip).is_err());

        for _ in 0..3 {
            assert!(config.signup.check_key(&ip).is_ok());
        }
        assert!(config.signup.check_key(&ip).is_err());
    }

    #[test]
    fn test_zero_quota_is_clamped() {
        let config = RateLimitConfig::with_limits(0, 0, 0);
        assert!(config.signup.check_key(&"10.0.0.1".to_string()).is_ok());
    }
}
