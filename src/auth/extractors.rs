//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::AuthError;
use super::gate;
use super::state::HasAuthBackend;
use super::types::AuthContext;

/// Extractor for endpoints that require an authenticated caller.
/// Runs the verification gate; rejects with a uniform 401.
pub struct Auth(pub AuthContext);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        gate::verify(&*parts, state).await.map(Auth)
    }
}

