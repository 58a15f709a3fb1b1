//! Where verification reads credentials from.

use axum::http::{HeaderMap, header, request::Parts};

/// Anything that can present a bearer credential and a cookie header.
/// Implemented for HTTP request parts and the realtime handshake so the
/// verification gate runs unmodified for both.
pub trait CredentialSource {
    fn headers(&self) -> &HeaderMap;

    /// Access token from `Authorization: Bearer <token>`.
    fn bearer_token(&self) -> Option<&str> {
        let value = self.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?.trim();
        if token.is_empty() { None } else { Some(token) }
    }
}

impl CredentialSource for HeaderMap {
    fn headers(&self) -> &HeaderMap {
        self
    }
}

impl CredentialSource for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl<B> CredentialSource for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::http::Request::headers(self)
    }
}
