//! Logout.

use tracing::info;

use super::errors::AuthError;
use super::source::CredentialSource;
use super::state::HasAuthBackend;

/// Delete the session named by the caller's refresh cookie, if any.
///
/// Returns whether a session was removed. Access tokens already handed out
/// stay valid until they expire.
pub async fn logout<C, B>(source: &C, backend: &B) -> Result<bool, AuthError>
where
    C: CredentialSource + Sync + ?Sized,
    B: HasAuthBackend + Sync + ?Sized,
{
    let Some(refresh_token) = backend.cookies().refresh_token(source.headers()) else {
        return Ok(false);
    };

    let Some(session) = backend.db().sessions().delete_by_token(refresh_token).await? else {
        return Ok(false);
    };

    info!(user_id = session.user_id, session_id = session.id, "Session revoked");
    Ok(true)
}
