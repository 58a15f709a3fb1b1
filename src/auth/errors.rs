//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Why verification refused a request. Only ever logged; clients see a uniform 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("access token missing")]
    MissingCredential,
    #[error("refresh cookie missing")]
    MissingSession,
    #[error("no session for refresh token")]
    InvalidSession,
    #[error("access token invalid")]
    InvalidCredential,
    #[error("access token expired")]
    CredentialExpired,
    #[error("access token does not match session")]
    CredentialSessionMismatch,
    #[error("user not found")]
    UnknownSubject,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Codec(#[from] crate::jwt::CodecError),
}

impl AuthError {
    /// The specific failure, if this is a refusal rather than a backend error.
    pub fn failure(&self) -> Option<AuthFailure> {
        match self {
            AuthError::Unauthorized(failure) => Some(*failure),
            _ => None,
        }
    }
}

impl From<AuthFailure> for AuthError {
    fn from(failure: AuthFailure) -> Self {
        AuthError::Unauthorized(failure)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AuthError::Unauthorized(failure) => {
                tracing::debug!(reason = %failure, "Request not authenticated");
                (StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Database error during authentication");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AuthError::Codec(e) => {
                tracing::error!(error = %e, "Failed to mint token");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
