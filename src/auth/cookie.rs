//! Cookie parsing, signing and `Set-Cookie` builders for the refresh token.
//!
//! A signed cookie value is `<value>.<sig>` where `sig` is the unpadded
//! base64url HMAC-SHA256 of `<value>` under the cookie secret.

use axum::http::header;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = value.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// Signs and verifies cookie values.
#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: secret.to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size")
    }

    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac();
        mac.update(value.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", value, sig)
    }

    /// Return the original value if the signature matches.
    pub fn unsign<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (value, sig) = signed.rsplit_once('.')?;
        let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
        let mut mac = self.mac();
        mac.update(value.as_bytes());
        mac.verify_slice(&sig).ok()?;
        Some(value)
    }
}

/// Cookie settings shared by every handler that reads or writes the refresh cookie.
#[derive(Clone)]
pub struct CookieConfig {
    pub signer: CookieSigner,
    /// Set the Secure flag (production behind HTTPS)
    pub secure: bool,
}

impl CookieConfig {
    pub fn new(secret: &[u8], secure: bool) -> Self {
        Self {
            signer: CookieSigner::new(secret),
            secure,
        }
    }

    /// Read and verify the refresh cookie. A bad signature reads as absent.
    pub fn refresh_token<'a>(&self, headers: &'a axum::http::HeaderMap) -> Option<&'a str> {
        let raw = get_cookie(headers, REFRESH_COOKIE_NAME)?;
        self.signer.unsign(raw)
    }

    /// `Set-Cookie` value delivering a refresh token that expires with its session.
    pub fn refresh_cookie(&self, refresh_token: &str, expires_at: DateTime<Utc>) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Expires={}{}",
            REFRESH_COOKIE_NAME,
            self.signer.sign(refresh_token),
            http_date(expires_at),
            self.secure_attr()
        )
    }

    /// `Set-Cookie` value that makes the client drop the refresh cookie.
    pub fn clear_refresh_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Strict; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0{}",
            REFRESH_COOKIE_NAME,
            self.secure_attr()
        )
    }

    fn secure_attr(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
