//! External identity verification for customer login

use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const LINE_VERIFY_URL: &str = "https://api.line.me/oauth2/v2.1/verify";

/// A customer identity asserted by an external provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider_uid: String,
    pub name: String,
    pub email: Option<String>,
}

/// Turns a provider-issued id token into a verified identity
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Fails with `InvalidCredentials` when the provider rejects the token
    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct LineVerifyResponse {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies LINE Login id tokens against the LINE verify endpoint
pub struct LineIdentityVerifier {
    client: reqwest::Client,
    channel_id: String,
    verify_url: String,
}

impl LineIdentityVerifier {
    pub fn new(channel_id: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            channel_id: channel_id.into(),
            verify_url: LINE_VERIFY_URL.to_string(),
        })
    }

    /// Point at a different verify endpoint
    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }
}

#[async_trait]
impl IdentityVerifier for LineIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .form(&[("id_token", id_token), ("client_id", self.channel_id.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("LINE verify request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            debug!(status = %status, "LINE rejected id token");
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            warn!(status = %status, "LINE verify endpoint returned an error");
            return Err(AuthError::Internal(format!(
                "LINE verify returned {}",
                status
            )));
        }

        let body: LineVerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Internal(format!("LINE verify response: {}", e)))?;

        Ok(ExternalIdentity {
            name: body.name.unwrap_or_default(),
            provider_uid: body.sub,
            email: body.email,
        })
    }
}
