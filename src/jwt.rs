//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets, so leaking
//! one secret never lets an attacker mint the other kind of token. Expiry
//! is checked against the injected [`Clock`] with zero leeway.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived, carried as a bearer credential, never stored
    Access,
    /// Long-lived, carried in the signed cookie and backed by a session row
    Refresh,
}

/// JWT claims shared by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: i64,
    /// Token type
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Unique token id, keeps two tokens minted in the same second distinct
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signing material for one token kind.
#[derive(Clone)]
pub struct TokenKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKey {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

/// Sign a token of `kind` for `subject`, valid for `ttl` from `now`.
pub fn encode_token(
    kind: TokenKind,
    subject: i64,
    key: &TokenKey,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<IssuedToken, CodecError> {
    // Claims carry whole seconds; the reported times must match them exactly.
    let now = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
    let expires_at = now + ttl;
    let claims = Claims {
        sub: subject,
        kind,
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key.encoding)
        .map_err(CodecError::Encoding)?;

    Ok(IssuedToken {
        token,
        issued_at: now,
        expires_at,
    })
}

/// Check signature, kind and expiry of `token`.
pub fn decode_token(
    kind: TokenKind,
    token: &str,
    key: &TokenKey,
    now: DateTime<Utc>,
) -> Result<Claims, CodecError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    // Expiry is compared against the injected clock below.
    validation.validate_exp = false;

    let data = jsonwebtoken::decode::<Claims>(token, &key.decoding, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::InvalidSignature => CodecError::InvalidSignature,
            ErrorKind::ExpiredSignature => CodecError::Expired,
            _ => CodecError::Malformed,
        }
    })?;

    if data.claims.kind != kind {
        return Err(CodecError::Malformed);
    }

    if data.claims.exp <= now.timestamp() {
        return Err(CodecError::Expired);
    }

    Ok(data.claims)
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access_key: TokenKey,
    refresh_key: TokenKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtConfig {
    pub fn new(
        access_secret: &[u8],
        access_ttl: Duration,
        refresh_secret: &[u8],
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access_key: TokenKey::new(access_secret),
            refresh_key: TokenKey::new(refresh_secret),
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn key(&self, kind: TokenKind) -> &TokenKey {
        match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Mint a token of the given kind for a user.
    pub fn issue(&self, kind: TokenKind, user_id: i64) -> Result<IssuedToken, CodecError> {
        encode_token(kind, user_id, self.key(kind), self.ttl(kind), self.now())
    }

    /// Validate a token of the given kind and return its claims.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, CodecError> {
        decode_token(kind, token, self.key(kind), self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const ACCESS_SECRET: &[u8] = b"access-secret-for-testing-0123456789";
    const REFRESH_SECRET: &[u8] = b"refresh-secret-for-testing-0123456789";

    fn config() -> (JwtConfig, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let config = JwtConfig::new(
            ACCESS_SECRET,
            Duration::minutes(15),
            REFRESH_SECRET,
            Duration::days(7),
            clock.clone(),
        );
        (config, clock)
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let (config, clock) = config();

        let issued = config.issue(TokenKind::Access, 42).unwrap();
        assert_eq!(issued.expires_at, clock.now() + Duration::minutes(15));

        let claims = config.verify(TokenKind::Access, &issued.token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_reported_times_match_claims() {
        let start = DateTime::from_timestamp(1_700_000_000, 999_000_000).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let config = JwtConfig::new(
            ACCESS_SECRET,
            Duration::minutes(15),
            REFRESH_SECRET,
            Duration::days(7),
            clock.clone(),
        );

        let issued = config.issue(TokenKind::Access, 42).unwrap();
        let claims = config.verify(TokenKind::Access, &issued.token).unwrap();
        assert_eq!(issued.issued_at.timestamp(), claims.iat);
        assert_eq!(issued.expires_at.timestamp(), claims.exp);
        assert_eq!(issued.expires_at.timestamp_subsec_nanos(), 0);

        // Still valid right up to the reported expiry.
        clock.advance(issued.expires_at - start - Duration::milliseconds(1));
        assert!(config.verify(TokenKind::Access, &issued.token).is_ok());
        clock.advance(Duration::milliseconds(1));
        assert!(matches!(
            config.verify(TokenKind::Access, &issued.token),
            Err(CodecError::Expired)
        ));
    }

    #[test]
    fn test_issue_and_verify_refresh_token() {
        let (config, _) = config();

        let issued = config.issue(TokenKind::Refresh, 7).unwrap();
        let claims = config.verify(TokenKind::Refresh, &issued.token).unwrap();

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_kinds_use_distinct_secrets() {
        let (config, _) = config();

        let access = config.issue(TokenKind::Access, 1).unwrap();
        let refresh = config.issue(TokenKind::Refresh, 1).unwrap();

        // An access token never verifies under the refresh secret, and vice versa.
        assert!(matches!(
            config.verify(TokenKind::Refresh, &access.token),
            Err(CodecError::InvalidSignature)
        ));
        assert!(matches!(
            config.verify(TokenKind::Access, &refresh.token),
            Err(CodecError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_kind_with_same_secret_is_malformed() {
        let key = TokenKey::new(b"shared");
        let now = Utc::now();

        let refresh = encode_token(TokenKind::Refresh, 1, &key, Duration::hours(1), now).unwrap();
        let result = decode_token(TokenKind::Access, &refresh.token, &key, now);

        assert!(matches!(result, Err(CodecError::Malformed)));
    }

    #[test]
    fn test_expired_once_ttl_elapses() {
        let (config, clock) = config();
        let issued = config.issue(TokenKind::Access, 42).unwrap();

        clock.advance(Duration::minutes(15) - Duration::seconds(1));
        assert!(config.verify(TokenKind::Access, &issued.token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            config.verify(TokenKind::Access, &issued.token),
            Err(CodecError::Expired)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (config, _) = config();

        assert!(matches!(
            config.verify(TokenKind::Access, "invalid-token"),
            Err(CodecError::Malformed)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let now = Utc::now();
        let issued = encode_token(
            TokenKind::Access,
            1,
            &TokenKey::new(b"secret-1"),
            Duration::minutes(5),
            now,
        )
        .unwrap();

        let result = decode_token(TokenKind::Access, &issued.token, &TokenKey::new(b"secret-2"), now);
        assert!(matches!(result, Err(CodecError::InvalidSignature)));
    }

    #[test]
    fn test_tokens_issued_together_are_unique() {
        let (config, _) = config();

        let first = config.issue(TokenKind::Refresh, 1).unwrap();
        let second = config.issue(TokenKind::Refresh, 1).unwrap();

        assert_ne!(first.token, second.token);
    }
}
