//! App-only credential provider using the OAuth2 client credentials grant.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::AuthError;
use crate::secure::SecureString;

/// HTTP request timeout.
const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Source of bearer tokens for directory requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for at least the next request.
    async fn bearer_token(&self) -> Result<SecureString, AuthError>;

    /// Forget any cached token after the resource server rejected it.
    async fn invalidate(&self) {}
}

/// Bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: SecureString,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Returns true if the token is expired or will expire within the grace period.
    pub fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

#[derive(Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Client secret credential for a single tenant/application pair.
///
/// Every call to [`authenticate`](Self::authenticate) performs a token request;
/// wrap it in a [`TokenManager`](super::token_manager::TokenManager) to reuse tokens.
pub struct ClientSecretCredential {
    client_id: String,
    client_secret: SecureString,
    token_url: String,
    scope: String,
    http_client: reqwest::Client,
}

impl ClientSecretCredential {
    /// Create a credential for `tenant_id` against `authority_host`.
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: SecureString,
        scope: &str,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                authority_host.trim_end_matches('/'),
                tenant_id
            ),
            scope: scope.to_string(),
            http_client,
        })
    }

    /// Create a Graph credential from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api.authority_host,
            &config.oauth.tenant,
            &config.oauth.client_id,
            config.oauth.client_secret.clone(),
            &config.graph_scope(),
        )
    }

    /// Request an app-only access token.
    ///
    /// Rejections by the identity provider (bad secret, unknown tenant, disabled app)
    /// are [`AuthError::Credential`]; network failures are [`AuthError::Transport`].
    /// No retries.
    pub async fn authenticate(&self) -> Result<AccessToken, AuthError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(AuthError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => {
                    error!(
                        "Client credentials rejected: HTTP {} - {}: {}",
                        status, err.error, err.error_description
                    );
                    AuthError::Credential(err.error)
                }
                Err(_) => {
                    error!("Client credentials request failed: HTTP {}", status);
                    AuthError::Credential(format!("HTTP {}", status.as_u16()))
                }
            });
        }

        let token: ClientCredentialsResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        debug!("Acquired app-only token for scope {}", self.scope);

        Ok(AccessToken {
            secret: SecureString::new(token.access_token),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}
