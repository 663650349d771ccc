//! Error types for the azuredir crate.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Identity-provider and login-flow errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Credential rejected: {0}")]
    Credential(String),

    #[error("Identity provider unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),

    #[error("Failed to query provider: {0}")]
    Discovery(String),

    #[error("state not found")]
    StateMissing,

    #[error("state did not match")]
    StateMismatch,

    #[error("OAuth2 authorization failed: {0}")]
    OAuthFailed(String),

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Failed to exchange token: {0}")]
    TokenExchangeFailed(String),

    #[error("Failed to get userinfo: {0}")]
    UserInfoFailed(String),
}

impl AuthError {
    /// Returns true when the request was rejected before any provider call.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::StateMissing | Self::StateMismatch | Self::OAuthFailed(_) | Self::MissingCode
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

/// Directory (Microsoft Graph) errors.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Graph API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode directory object: {0}")]
    Decode(String),

    #[error("Directory object not found: {0}")]
    NotFound(String),

    #[error("Unauthorized (401): Token may be expired")]
    Unauthorized,

    #[error("Forbidden (403): Insufficient permissions")]
    Forbidden,

    #[error("Rate limited (429): Too many requests")]
    RateLimited,

    #[error("Graph API request failed: {0}")]
    RequestFailed(String),

    #[error("Credential unavailable: {0}")]
    Credential(#[source] AuthError),

    #[error("Traversal cancelled")]
    Cancelled,
}

impl DirectoryError {
    /// Returns true for a point-lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<AuthError> for DirectoryError {
    /// Network failures while fetching a token stay transport errors.
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(e) => Self::Transport(e),
            other => Self::Credential(other),
        }
    }
}

/// Errors from decoding JWT-shaped strings.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("could not decode token header: {0}")]
    Header(#[source] jsonwebtoken::errors::Error),

    #[error("could not decode token claims: {0}")]
    Claims(#[source] jsonwebtoken::errors::Error),

    #[error("could not base64 decode signature segment")]
    Signature,
}

impl AppError {
    /// Returns a user-friendly message for terminal output.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Auth(e) | Self::Directory(DirectoryError::Credential(e)) => auth_message(e),
            Self::Directory(DirectoryError::Transport(_)) => {
                "Could not reach Azure AD or Microsoft Graph. Check your network connection."
            }
            Self::Directory(DirectoryError::Unauthorized) => {
                "Authentication expired. Check the application credentials."
            }
            Self::Directory(DirectoryError::Forbidden) => {
                "Insufficient directory permissions (User.Read.All / Group.Read.All)."
            }
            Self::Directory(DirectoryError::RateLimited) => {
                "Too many requests. Please wait a moment."
            }
            Self::Directory(DirectoryError::NotFound(_)) => "User not found.",
            Self::Directory(DirectoryError::Cancelled) => "Operation cancelled.",
            _ => "An error occurred. Please try again.",
        }
    }
}

fn auth_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::Credential(_) => {
            "Azure AD rejected the client credentials. Check tenant, client id and secret."
        }
        AuthError::Transport(_) | AuthError::Discovery(_) => {
            "Could not reach the identity provider."
        }
        e if e.is_client_error() => "Sign-in was rejected. Please try again.",
        _ => "An error occurred. Please try again.",
    }
}
