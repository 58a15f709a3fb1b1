//! Authentication and session lifecycle.
//!
//! Dual-token system: short-lived access tokens (bearer header, never stored)
//! and long-lived refresh tokens (signed http-only cookie, one session row
//! each). Every protected HTTP route and the realtime handshake go through
//! the same [`gate::verify`].

mod cookie;
mod errors;
mod extractors;
mod federated;
pub mod gate;
mod issuer;
mod password;
mod refresh;
mod revoke;
mod source;
mod state;
mod types;

pub use cookie::{CookieConfig, CookieSigner, REFRESH_COOKIE_NAME, get_cookie};
pub use errors::{AuthError, AuthFailure};
pub use extractors::Auth;
pub use federated::{FederatedError, FederatedIdentity, FederatedVerifier, GoogleVerifier};
pub use issuer::{IssuedTokens, TokenResponse, issue_tokens};
pub use password::{DEFAULT_COST, PasswordError, PasswordHasher};
pub use refresh::{RefreshOutcome, refresh};
pub use revoke::logout;
pub use source::CredentialSource;
pub use state::HasAuthBackend;
pub use types::AuthContext;
