//! Microsoft Graph directory client: user listing, group memberships and point lookups.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use super::cursor::PageCursor;
use super::models::{DirectoryObject, DirectoryUser, ODataError, Page, USER_SELECT};
use crate::auth::credential::{ClientSecretCredential, TokenProvider};
use crate::auth::token_manager::TokenManager;
use crate::config::Config;
use crate::error::DirectoryError;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Directory client over the Microsoft Graph REST API.
pub struct DirectoryClient {
    http_client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl DirectoryClient {
    /// Create a client for `base_url` (e.g. `https://graph.microsoft.com/v1.0`).
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self, DirectoryError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Create a client authenticated with the configured client secret.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credential = ClientSecretCredential::from_config(config)?;
        let tokens = Arc::new(TokenManager::new(credential));
        Self::new(&config.api.graph_base_url, tokens).context("Failed to create directory client")
    }

    /// Cursor over all users, projected to `id`, `displayName` and `mail`.
    ///
    /// Requests use `ConsistencyLevel: eventual` with `$count=true` so the
    /// server resolves counts exactly.
    pub fn users(&self) -> Result<PageCursor<'_, DirectoryUser>, DirectoryError> {
        let mut url = self.url("/users")?;
        url.query_pairs_mut()
            .append_pair("$count", "true")
            .append_pair("$select", USER_SELECT);

        Ok(PageCursor::new(
            self,
            "users".to_string(),
            url.into(),
            true,
            |value| DirectoryUser::from_value(value).map(Some),
        ))
    }

    /// Cursor over the display names of the groups `user_id` is a direct member of.
    ///
    /// Non-group memberships (directory roles, administrative units) are skipped.
    pub fn user_groups(&self, user_id: &str) -> Result<PageCursor<'_, String>, DirectoryError> {
        let url = self.url(&format!("/users/{}/memberOf", urlencoding::encode(user_id)))?;

        Ok(PageCursor::new(
            self,
            format!("user {}", user_id),
            url.into(),
            false,
            |value| DirectoryObject::from_value(value).map(DirectoryObject::into_group_name),
        ))
    }

    /// Visit every user in server order until `on_user` returns false.
    ///
    /// Returning false stops the traversal without requesting another page.
    pub async fn iterate_users<F>(
        &self,
        cancel: &CancellationToken,
        mut on_user: F,
    ) -> Result<(), DirectoryError>
    where
        F: FnMut(DirectoryUser) -> bool,
    {
        let mut users = self.users()?;
        while let Some(user) = users.next(cancel).await? {
            if !on_user(user) {
                debug!("User traversal stopped by caller");
                break;
            }
        }
        Ok(())
    }

    /// Visit the group names of `user_id` until `on_group` returns false.
    ///
    /// Fails with [`DirectoryError::NotFound`] if the user does not exist.
    pub async fn iterate_user_groups<F>(
        &self,
        cancel: &CancellationToken,
        user_id: &str,
        mut on_group: F,
    ) -> Result<(), DirectoryError>
    where
        F: FnMut(String) -> bool,
    {
        let mut groups = self.user_groups(user_id)?;
        while let Some(group) = groups.next(cancel).await? {
            if !on_group(group) {
                debug!(user_id = %user_id, "Group traversal stopped by caller");
                break;
            }
        }
        Ok(())
    }

    /// Look up a user by object id or user principal name.
    pub async fn get_user_by_id(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<DirectoryUser, DirectoryError> {
        let mut url = self.url(&format!("/users/{}", urlencoding::encode(id)))?;
        url.query_pairs_mut().append_pair("$select", USER_SELECT);

        let value: Value = self
            .cancellable(cancel, self.get_json(url.as_str(), false, &format!("user {}", id)))
            .await?;
        DirectoryUser::from_value(value)
    }

    /// Look up a user by `mail`. Zero matches is `Ok(None)`, not an error.
    ///
    /// When several users share the address the first in server order is
    /// returned; that order is not guaranteed to be stable.
    pub async fn get_user_by_email(
        &self,
        cancel: &CancellationToken,
        email: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let mut url = self.url("/users")?;
        url.query_pairs_mut()
            .append_pair("$filter", &format!("mail eq '{}'", escape_odata_string(email)))
            .append_pair("$select", USER_SELECT);

        let page: Page<Value> = self
            .cancellable(cancel, self.get_json(url.as_str(), false, "users"))
            .await?;

        if page.value.len() > 1 {
            warn!(
                matches = page.value.len(),
                "Mail lookup matched several users, returning the first"
            );
        }

        page.value
            .into_iter()
            .next()
            .map(DirectoryUser::from_value)
            .transpose()
    }

    pub(crate) async fn fetch_page(
        &self,
        url: &str,
        eventual_consistency: bool,
        resource: &str,
    ) -> Result<Page<Value>, DirectoryError> {
        self.get_json(url, eventual_consistency, resource).await
    }

    async fn cancellable<T>(
        &self,
        cancel: &CancellationToken,
        request: impl std::future::Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, DirectoryError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DirectoryError::Cancelled),
            result = request => result,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        eventual_consistency: bool,
        resource: &str,
    ) -> Result<T, DirectoryError> {
        let token = self.tokens.bearer_token().await?;
        let request_id = Uuid::new_v4();

        debug!(request_id = %request_id, "GET {}", url);

        let mut request = self
            .http_client
            .get(url)
            .bearer_auth(token.as_str())
            .header("client-request-id", request_id.to_string());

        if eventual_consistency {
            request = request.header("ConsistencyLevel", "eventual");
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200 => response
                .json()
                .await
                .map_err(|e| DirectoryError::Decode(e.to_string())),
            401 => {
                self.tokens.invalidate().await;
                Err(DirectoryError::Unauthorized)
            }
            403 => Err(DirectoryError::Forbidden),
            404 => Err(DirectoryError::NotFound(resource.to_string())),
            429 => Err(DirectoryError::RateLimited),
            _ => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<ODataError>(&body) {
                    Ok(odata) => error!(
                        request_id = %request_id,
                        "Graph request failed: HTTP {} - {}: {}",
                        status, odata.error.code, odata.error.message
                    ),
                    Err(_) => error!(request_id = %request_id, "Graph request failed: HTTP {}", status),
                }
                // Don't expose raw API error details - just the status code
                Err(DirectoryError::RequestFailed(format!("HTTP {}", status.as_u16())))
            }
        }
    }

    fn url(&self, path: &str) -> Result<Url, DirectoryError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| DirectoryError::RequestFailed(format!("invalid URL: {}", e)))
    }
}

/// Quote a value for use inside an OData string literal.
pub fn escape_odata_string(value: &str) -> String {
    value.replace('\'', "''")
}
