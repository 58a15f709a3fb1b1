//! The single verification path shared by HTTP handlers and the realtime handshake.

use super::errors::{AuthError, AuthFailure};
use super::source::CredentialSource;
use super::state::HasAuthBackend;
use super::types::AuthContext;
use crate::jwt::{CodecError, TokenKind};

/// Check a request's credentials and resolve the caller's identity.
///
/// Steps run in order and stop at the first failure:
/// 1. bearer access token present
/// 2. signed refresh cookie present
/// 3. a live session exists for that refresh token
/// 4. the access token verifies under the access secret
/// 5. the token subject owns the session
/// 6. the subject still exists
///
/// Nothing is written; an expired session is left for the refresh flow or cleanup.
pub async fn verify<C, B>(source: &C, backend: &B) -> Result<AuthContext, AuthError>
where
    C: CredentialSource + Sync + ?Sized,
    B: HasAuthBackend + Sync + ?Sized,
{
    let access_token = source
        .bearer_token()
        .ok_or(AuthFailure::MissingCredential)?;

    let refresh_token = backend
        .cookies()
        .refresh_token(source.headers())
        .ok_or(AuthFailure::MissingSession)?;

    let session = backend
        .db()
        .sessions()
        .find_by_token(refresh_token)
        .await?
        .ok_or(AuthFailure::InvalidSession)?;

    if session.is_expired(backend.jwt().now()) {
        return Err(AuthFailure::InvalidSession.into());
    }

    let claims = backend
        .jwt()
        .verify(TokenKind::Access, access_token)
        .map_err(|e| match e {
            CodecError::Expired => AuthFailure::CredentialExpired,
            _ => AuthFailure::InvalidCredential,
        })?;

    if claims.sub != session.user_id {
        return Err(AuthFailure::CredentialSessionMismatch.into());
    }

    let identity = backend
        .db()
        .users()
        .get_identity(claims.sub)
        .await?
        .ok_or(AuthFailure::UnknownSubject)?;

    Ok(AuthContext::from(identity))
}
