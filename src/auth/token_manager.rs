//! App-only token reuse with refresh ahead of expiry.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::credential::{AccessToken, ClientSecretCredential, TokenProvider};
use crate::error::AuthError;
use crate::secure::SecureString;

/// Tokens closer than this to expiry are replaced.
const REFRESH_BEFORE_EXPIRY_MINUTES: i64 = 5;

/// Caches the credential's token and re-authenticates when it nears expiry.
pub struct TokenManager {
    credential: ClientSecretCredential,
    cached: Mutex<Option<AccessToken>>,
    grace_period: Duration,
}

impl TokenManager {
    /// Create a new token manager.
    pub fn new(credential: ClientSecretCredential) -> Self {
        Self {
            credential,
            cached: Mutex::new(None),
            grace_period: Duration::minutes(REFRESH_BEFORE_EXPIRY_MINUTES),
        }
    }

    /// Get a valid token, authenticating if none is cached or the cached one is stale.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        // Held across the request so concurrent callers share one refresh
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired(self.grace_period) {
                debug!("Using cached token");
                return Ok(token.clone());
            }
        }

        let token = self.credential.authenticate().await?;
        info!(
            "Graph token acquired, expires in {}",
            format_duration(token.expires_at - Utc::now())
        );
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next request re-authenticates.
    pub async fn clear(&self) {
        *self.cached.lock().await = None;
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn bearer_token(&self) -> Result<SecureString, AuthError> {
        Ok(self.get_token().await?.secret)
    }

    async fn invalidate(&self) {
        debug!("Discarding cached token");
        self.clear().await;
    }
}

/// Format duration as human-readable string (e.g., "45 min", "1 hour").
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes();

    if total_minutes < 1 {
        "< 1 min".to_string()
    } else if total_minutes < 60 {
        format!("{} min", total_minutes)
    } else {
        let hours = total_minutes / 60;
        let mins = total_minutes % 60;
        if mins == 0 {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}
