//! Federated (OAuth ID token) identity verification.

use async_trait::async_trait;
use serde::Deserialize;

/// Google's endpoint for validating an ID token server side.
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Identity asserted by a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Provider's stable subject id
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FederatedError {
    #[error("identity token rejected: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
}

/// Verifies an ID token issued by an external identity provider.
#[async_trait]
pub trait FederatedVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity, FederatedError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    /// Google encodes this as the string "true" or "false"
    email_verified: Option<String>,
    name: Option<String>,
}

impl TokenInfo {
    fn into_identity(self, client_id: &str) -> Result<FederatedIdentity, FederatedError> {
        if self.aud != client_id {
            return Err(FederatedError::Rejected("audience mismatch".into()));
        }
        let email = self
            .email
            .ok_or_else(|| FederatedError::Rejected("token has no email".into()))?;
        if self.email_verified.as_deref() != Some("true") {
            return Err(FederatedError::Rejected("email not verified".into()));
        }
        let name = self
            .name
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        Ok(FederatedIdentity {
            subject: self.sub,
            email: email.to_lowercase(),
            name,
        })
    }
}

/// Validates Google ID tokens through the tokeninfo endpoint.
pub struct GoogleVerifier {
    client: reqwest::Client,
    client_id: String,
}

impl GoogleVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl FederatedVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity, FederatedError> {
        let resp = self
            .client
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            tracing::debug!(%status, "Google rejected identity token");
            return Err(FederatedError::Rejected(format!("tokeninfo returned {status}")));
        }

        let info: TokenInfo = resp.json().await?;
        info.into_identity(&self.client_id)
    }
}
