//! Exchange a live refresh session for a new access token.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use super::cookie::CookieConfig;
use super::errors::{AuthError, AuthFailure};
use super::issuer::TokenResponse;
use super::source::CredentialSource;
use super::state::HasAuthBackend;
use crate::jwt::{CodecError, TokenKind};

/// Result of a refresh attempt.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// No usable refresh cookie was presented
    NoCookie,
    /// Refused; `clear_cookie` is set when the session behind the cookie is dead
    Rejected {
        failure: AuthFailure,
        clear_cookie: bool,
    },
    Refreshed(TokenResponse),
}

impl RefreshOutcome {
    fn rejected(failure: AuthFailure, clear_cookie: bool) -> Self {
        Self::Rejected {
            failure,
            clear_cookie,
        }
    }

    pub fn respond(self, cookies: &CookieConfig) -> Response {
        match self {
            RefreshOutcome::NoCookie => StatusCode::NO_CONTENT.into_response(),
            RefreshOutcome::Rejected {
                failure,
                clear_cookie: true,
            } => (
                [(header::SET_COOKIE, cookies.clear_refresh_cookie())],
                AuthError::Unauthorized(failure),
            )
                .into_response(),
            RefreshOutcome::Rejected { failure, .. } => {
                AuthError::Unauthorized(failure).into_response()
            }
            RefreshOutcome::Refreshed(body) => (StatusCode::OK, Json(body)).into_response(),
        }
    }
}

/// Run the refresh flow for the cookie carried by `source`.
///
/// The refresh token itself is not rotated. An expired session is deleted.
pub async fn refresh<C, B>(source: &C, backend: &B) -> Result<RefreshOutcome, AuthError>
where
    C: CredentialSource + Sync + ?Sized,
    B: HasAuthBackend + Sync + ?Sized,
{
    let Some(refresh_token) = backend.cookies().refresh_token(source.headers()) else {
        return Ok(RefreshOutcome::NoCookie);
    };

    let sessions = backend.db().sessions();
    let Some(session) = sessions.find_by_token(refresh_token).await? else {
        return Ok(RefreshOutcome::rejected(AuthFailure::InvalidSession, true));
    };

    if session.is_expired(backend.jwt().now()) {
        sessions.delete(session.id).await?;
        debug!(session_id = session.id, "Deleted expired session");
        return Ok(RefreshOutcome::rejected(AuthFailure::InvalidSession, true));
    }

    let claims = match backend.jwt().verify(TokenKind::Refresh, refresh_token) {
        Ok(claims) => claims,
        Err(CodecError::Expired) => {
            return Ok(RefreshOutcome::rejected(AuthFailure::CredentialExpired, true));
        }
        Err(_) => {
            return Ok(RefreshOutcome::rejected(AuthFailure::InvalidCredential, false));
        }
    };

    if claims.sub != session.user_id {
        return Ok(RefreshOutcome::rejected(
            AuthFailure::CredentialSessionMismatch,
            false,
        ));
    }

    let Some(user) = backend.db().users().get_profile(claims.sub).await? else {
        return Ok(RefreshOutcome::rejected(AuthFailure::UnknownSubject, true));
    };

    let access = backend.jwt().issue(TokenKind::Access, user.id)?;
    info!(user_id = user.id, session_id = session.id, "Refreshed access token");

    Ok(RefreshOutcome::Refreshed(TokenResponse {
        user,
        access_token: access.token,
        expires_at: access.expires_at,
    }))
}
