//! OpenID Connect client for the authorization-code flow against Azure AD.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

use crate::config::Config;
use crate::error::AuthError;
use crate::secure::SecureString;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Subset of the OpenID provider metadata document.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
}

impl ProviderMetadata {
    /// Fetch `{issuer_url}/.well-known/openid-configuration`.
    ///
    /// The issuer in the document is not compared with `issuer_url`: Azure AD
    /// multi-tenant issuers contain a `{tenantid}` placeholder.
    pub async fn discover(http_client: &reqwest::Client, issuer_url: &str) -> Result<Self, AuthError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer_url.trim_end_matches('/')
        );

        debug!("Fetching discovery document from {}", url);

        let response = http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::Discovery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Discovery(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| AuthError::Discovery(e.to_string()))?;

        if metadata.issuer != issuer_url {
            debug!(
                "Discovery issuer {} differs from requested {}",
                metadata.issuer, issuer_url
            );
        }

        Ok(metadata)
    }
}

/// Token response from the authorization-code grant.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

#[derive(Deserialize)]
struct OAuthErrorResponse {
    error: String,
}

/// Claims returned by the provider's user-info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Every other claim the endpoint returned.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// OAuth2 client for Azure AD sign-in (confidential client).
pub struct OAuth2Client {
    client_id: String,
    client_secret: SecureString,
    redirect_uri: String,
    scopes: Vec<String>,
    metadata: ProviderMetadata,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    /// Discover the tenant's endpoints and build a client from configuration.
    pub async fn discover(config: &Config) -> Result<Self, AuthError> {
        let http_client = provider_http_client()?;
        let metadata = ProviderMetadata::discover(&http_client, &config.issuer_url()).await?;

        info!("Discovered authorization endpoint {}", metadata.authorization_endpoint);

        Ok(Self::with_metadata(config, metadata, http_client))
    }

    /// Build a client from already known provider metadata.
    pub fn with_metadata(
        config: &Config,
        metadata: ProviderMetadata,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            client_id: config.oauth.client_id.clone(),
            client_secret: config.oauth.client_secret.clone(),
            redirect_uri: config.oauth.redirect_uri.clone(),
            scopes: config.oauth.scopes.scopes.clone(),
            metadata,
            http_client,
        }
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Generate the authorization URL for browser-based sign-in.
    pub fn authorization_url(&self, state: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.metadata.authorization_endpoint)
            .map_err(|e| AuthError::Discovery(format!("invalid authorization endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Log error details for debugging (doesn't expose to user)
            let error_body = response.text().await.unwrap_or_default();
            error!("Token exchange failed: HTTP {} - {}", status, error_body);
            let message = match serde_json::from_str::<OAuthErrorResponse>(&error_body) {
                Ok(err) => format!("HTTP {} {}", status.as_u16(), err.error),
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            return Err(AuthError::TokenExchangeFailed(message));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))
    }

    /// Fetch the signed-in user's claims from the user-info endpoint.
    pub async fn user_info(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let response = self
            .http_client
            .get(&self.metadata.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::UserInfoFailed(e.to_string()))?;

        if !response.status().is_success() {
            // Don't expose raw API error details - just log status code
            let status = response.status();
            error!("User-info request failed: HTTP {}", status);
            return Err(AuthError::UserInfoFailed(format!("HTTP {}", status.as_u16())));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::UserInfoFailed(e.to_string()))
    }
}

/// Build the HTTP client used for provider calls.
pub fn provider_http_client() -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(AuthError::Transport)
}
