//! Authorization-code flow: login redirect, callback verification and enrichment.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::jwt::{parse_unverified, ParsedToken};
use crate::auth::oauth::{CallbackQuery, OAuth2Client, UserInfo};
use crate::auth::session::{states_match, StateStore};
use crate::directory::DirectoryClient;
use crate::error::AuthError;

/// Where to send the browser, and the state to pin in its cookie.
#[derive(Debug)]
pub struct LoginRedirect {
    pub url: Url,
    pub state: String,
}

/// Result of a completed sign-in.
///
/// Token claims are decoded without verification and are for display only.
#[derive(Debug, Serialize)]
pub struct CallbackPayload {
    #[serde(rename = "UserInfo")]
    pub user_info: UserInfo,
    #[serde(rename = "Groups")]
    pub groups: Vec<String>,
    #[serde(rename = "IdTokenParsed", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<ParsedToken>,
    #[serde(rename = "AccessTokenParsed", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<ParsedToken>,
}

/// Drives `/login` and `/auth/callback`.
pub struct AuthFlow {
    oauth: OAuth2Client,
    directory: Option<Arc<DirectoryClient>>,
    states: StateStore,
}

impl AuthFlow {
    /// `directory` enables group enrichment of signed-in users.
    pub fn new(oauth: OAuth2Client, directory: Option<Arc<DirectoryClient>>) -> Self {
        Self {
            oauth,
            directory,
            states: StateStore::new(),
        }
    }

    /// Mint a state and build the provider's authorization URL.
    pub fn start(&self) -> Result<LoginRedirect, AuthError> {
        let state = self.states.issue();
        let url = self.oauth.authorization_url(&state)?;
        debug!("Redirecting to {}", self.oauth.metadata().authorization_endpoint);
        Ok(LoginRedirect { url, state })
    }

    /// Verify the callback against the cookie state, then exchange the code.
    ///
    /// State failures are returned before any provider request is made.
    pub async fn complete(
        &self,
        cookie_state: Option<&str>,
        query: CallbackQuery,
    ) -> Result<CallbackPayload, AuthError> {
        let expected = cookie_state.ok_or(AuthError::StateMissing)?;
        let received = query.state.as_deref().unwrap_or_default();

        if !states_match(expected, received) {
            warn!("Callback state did not match cookie");
            return Err(AuthError::StateMismatch);
        }

        if !self.states.consume(expected) {
            warn!("Callback state was already used, expired or never issued");
            return Err(AuthError::StateMissing);
        }

        if let Some(error) = query.error {
            let description = query.error_description.unwrap_or_else(|| error.clone());
            warn!("Provider returned error {}: {}", error, description);
            return Err(AuthError::OAuthFailed(description));
        }

        let code = query.code.ok_or(AuthError::MissingCode)?;

        let tokens = self.oauth.exchange_code(&code).await?;
        let user_info = self.oauth.user_info(&tokens.access_token).await?;

        let groups = match user_info.email.as_deref() {
            Some(email) => self.directory_groups(&user_info.sub, email).await,
            None => Vec::new(),
        };

        let id_token = tokens.id_token.as_deref().and_then(|raw| {
            parse_unverified(raw)
                .map_err(|e| error!("Error parsing JWT - idToken: {}", e))
                .ok()
        });
        let access_token = parse_unverified(&tokens.access_token)
            .map_err(|e| error!("Error parsing JWT - accessToken: {}", e))
            .ok();

        info!(sub = %user_info.sub, groups = groups.len(), "Sign-in successful");

        Ok(CallbackPayload {
            user_info,
            groups,
            id_token,
            access_token,
        })
    }

    /// Group names for the directory user with `email`. Failures are logged, never returned.
    async fn directory_groups(&self, sub: &str, email: &str) -> Vec<String> {
        let Some(directory) = &self.directory else {
            return Vec::new();
        };

        let cancel = CancellationToken::new();
        let user = match directory.get_user_by_email(&cancel, email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(sub = %sub, "Signed-in user has no directory entry");
                return Vec::new();
            }
            Err(e) => {
                error!("Error getting user: {}", e);
                return Vec::new();
            }
        };

        let mut groups = Vec::new();
        if let Err(e) = directory
            .iterate_user_groups(&cancel, &user.id, |group| {
                groups.push(group);
                true
            })
            .await
        {
            error!("Error getting groups for user {}: {}", user.id, e);
        }
        groups
    }
}
