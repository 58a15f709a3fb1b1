//! Token issuance after a successful login or signup.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::errors::{AuthError, AuthFailure};
use super::state::HasAuthBackend;
use crate::db::{RefreshSession, UserProfile};
use crate::jwt::TokenKind;

/// Body returned by login, signup and refresh. Never contains the refresh token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user: UserProfile,
    pub access_token: String,
    /// When the access token stops being accepted (RFC 3339)
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued credential pair, its backing session, and the cookie carrying it.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub body: TokenResponse,
    pub refresh_token: String,
    pub session: RefreshSession,
    /// `Set-Cookie` value holding the signed refresh token
    pub cookie: String,
}

/// Mint an access/refresh pair for `user_id` and persist the refresh session.
///
/// Used identically by password login, signup and federated login.
pub async fn issue_tokens<B>(backend: &B, user_id: i64) -> Result<IssuedTokens, AuthError>
where
    B: HasAuthBackend + Sync + ?Sized,
{
    let user = backend
        .db()
        .users()
        .get_profile(user_id)
        .await?
        .ok_or(AuthFailure::UnknownSubject)?;

    let refresh = backend.jwt().issue(TokenKind::Refresh, user_id)?;
    let access = backend.jwt().issue(TokenKind::Access, user_id)?;

    let session = backend
        .db()
        .sessions()
        .create(user_id, &refresh.token, refresh.expires_at)
        .await?;

    let cookie = backend
        .cookies()
        .refresh_cookie(&refresh.token, session.expires_at);

    info!(user_id, session_id = session.id, "Issued tokens");

    Ok(IssuedTokens {
        body: TokenResponse {
            user,
            access_token: access.token,
            expires_at: access.expires_at,
        },
        refresh_token: refresh.token,
        session,
        cookie,
    })
}

impl IntoResponse for IssuedTokens {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::SET_COOKIE, self.cookie)],
            Json(self.body),
        )
            .into_response()
    }
}
