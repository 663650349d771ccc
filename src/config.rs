//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml with environment variable overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use url::Url;

use crate::secure::SecureString;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub api: ApiConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub tenant: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: SecureString,
    pub redirect_uri: String,
    pub scopes: ScopesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopesConfig {
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub authority_host: String,
    pub graph_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default)]
    pub open_browser: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load configuration from embedded config.toml with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::embedded()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the embedded config.toml without overrides or validation.
    pub fn embedded() -> Result<Self> {
        toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(tenant) = env::var("AZURE_TENANT_ID") {
            self.oauth.tenant = tenant;
        }

        if let Ok(client_id) = env::var("AZURE_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }

        if let Ok(secret) = env::var("AZURE_CLIENT_SECRET") {
            self.oauth.client_secret = SecureString::new(secret);
        }

        if let Ok(redirect_uri) = env::var("AZURE_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }

        if let Ok(authority) = env::var("AZURE_AUTHORITY_HOST") {
            self.api.authority_host = authority;
        }

        if let Ok(graph) = env::var("AZURE_GRAPH_BASE_URL") {
            self.api.graph_base_url = graph;
        }

        if let Ok(addr) = env::var("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() || self.oauth.client_id == "YOUR_AZURE_AD_CLIENT_ID" {
            anyhow::bail!(
                "Azure AD client_id not configured. Set AZURE_CLIENT_ID environment variable \
                 or update config.toml"
            );
        }

        if self.oauth.tenant.is_empty() || self.oauth.tenant == "YOUR_TENANT_ID" {
            anyhow::bail!(
                "Azure AD tenant not configured. Set AZURE_TENANT_ID environment variable \
                 or update config.toml"
            );
        }

        if self.oauth.client_secret.is_empty() {
            anyhow::bail!(
                "Azure AD client secret not configured. Set AZURE_CLIENT_SECRET environment variable"
            );
        }

        Url::parse(&self.api.graph_base_url).context("Invalid graph_base_url")?;
        Url::parse(&self.api.authority_host).context("Invalid authority_host")?;

        Ok(())
    }

    /// Tenant-scoped authority, e.g. `https://login.microsoftonline.com/{tenant}`.
    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.api.authority_host.trim_end_matches('/'),
            self.oauth.tenant
        )
    }

    /// Issuer base used for OIDC discovery.
    pub fn issuer_url(&self) -> String {
        format!("{}/v2.0", self.authority())
    }

    /// Scope for app-only Graph tokens, e.g. `https://graph.microsoft.com/.default`.
    pub fn graph_scope(&self) -> String {
        match Url::parse(&self.api.graph_base_url) {
            Ok(url) => format!("{}/.default", url.origin().ascii_serialization()),
            Err(_) => "https://graph.microsoft.com/.default".to_string(),
        }
    }
}
