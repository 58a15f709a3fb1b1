//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use chrono::Duration;
use clap::Parser;
use tracing::{error, info, warn};

use crate::ServerConfig;
use crate::auth::{DEFAULT_COST, FederatedVerifier, GoogleVerifier};
use crate::clock::SystemClock;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use crate::realtime::ConnectionRegistry;

const MIN_SECRET_LENGTH: usize = 32;

const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";
const COOKIE_SECRET_ENV: &str = "COOKIE_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Clone)]
#[command(
    name = "campusgate",
    about = "Authentication and session service for a campus social platform"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE", default_value = "campusgate.db")]
    pub database: String,

    /// Secret for signing access tokens
    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub access_token_secret: Option<String>,

    /// Access token lifetime (e.g. "900", "15m", "1h")
    #[arg(long, env = "ACCESS_TOKEN_LIFE", default_value = "15m", value_parser = parse_ttl)]
    pub access_token_life: Duration,

    /// Secret for signing refresh tokens, must differ from the access secret
    #[arg(long, env = "REFRESH_TOKEN_SECRET", hide_env_values = true)]
    pub refresh_token_secret: Option<String>,

    /// Refresh token and session lifetime (e.g. "7d", "2w")
    #[arg(long, env = "REFRESH_TOKEN_LIFE", default_value = "7d", value_parser = parse_ttl)]
    pub refresh_token_life: Duration,

    /// Secret for signing the refresh cookie
    #[arg(long, env = "COOKIE_SECRET", hide_env_values = true)]
    pub cookie_secret: Option<String>,

    /// Google OAuth client id. Federated login is disabled without it
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Mark cookies Secure (serve behind HTTPS)
    #[arg(long, env = "PRODUCTION")]
    pub production: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Parse a lifetime: bare seconds or a number with unit `s`, `m`, `h`, `d` or `w`.
pub fn parse_ttl(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: i64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {:?}", s))?;
    if value <= 0 {
        return Err(format!("Duration must be positive: {:?}", s));
    }

    let ttl = match unit.trim() {
        "" | "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        "w" => Duration::try_weeks(value),
        other => return Err(format!("Unknown duration unit {:?} in {:?}", other, s)),
    };
    ttl.ok_or_else(|| format!("Duration out of range: {:?}", s))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Signing secrets read at startup.
pub struct Secrets {
    pub access: String,
    pub refresh: String,
    pub cookie: String,
}

fn require_secret(value: Option<&str>, env: &str) -> Option<String> {
    let Some(secret) = value else {
        error!("{} is required", env);
        return None;
    };
    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env, MIN_SECRET_LENGTH
        );
        return None;
    }
    Some(secret.to_string())
}

/// Remove the secret environment variables once `Args` holds their values.
pub fn scrub_secret_env() {
    for var in [ACCESS_SECRET_ENV, REFRESH_SECRET_ENV, COOKIE_SECRET_ENV] {
        // SAFETY: called from main before any task is spawned or any other
        // code reads the environment.
        unsafe { std::env::remove_var(var) };
    }
}

/// Validate the signing secrets.
/// Returns None and logs an error if any secret is missing or weak.
pub fn load_secrets(args: &Args) -> Option<Secrets> {
    let access = require_secret(args.access_token_secret.as_deref(), ACCESS_SECRET_ENV);
    let refresh = require_secret(args.refresh_token_secret.as_deref(), REFRESH_SECRET_ENV);
    let cookie = require_secret(args.cookie_secret.as_deref(), COOKIE_SECRET_ENV);
    let (access, refresh, cookie) = (access?, refresh?, cookie?);

    if access == refresh {
        error!(
            "{} and {} must be different",
            ACCESS_SECRET_ENV, REFRESH_SECRET_ENV
        );
        return None;
    }

    Some(Secrets {
        access,
        refresh,
        cookie,
    })
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, secrets: Secrets, db: Database) -> ServerConfig {
    if args.access_token_life >= args.refresh_token_life {
        warn!("Access token lifetime is not shorter than the refresh token lifetime");
    }

    let federated = args.google_client_id.as_ref().map(|client_id| {
        info!("Google sign-in enabled");
        Arc::new(GoogleVerifier::new(client_id.clone())) as Arc<dyn FederatedVerifier>
    });

    ServerConfig {
        db,
        access_secret: secrets.access.into_bytes(),
        access_ttl: args.access_token_life,
        refresh_secret: secrets.refresh.into_bytes(),
        refresh_ttl: args.refresh_token_life,
        cookie_secret: secrets.cookie.into_bytes(),
        secure_cookies: args.production,
        bcrypt_cost: DEFAULT_COST,
        federated,
        clock: Arc::new(SystemClock),
        registry: Arc::new(ConnectionRegistry::new()),
        rate_limits: RateLimitConfig::new(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
