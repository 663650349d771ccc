//! azuredir - Azure AD directory client and OIDC login server.
//!
//! Lists directory users and their group memberships through Microsoft Graph,
//! and runs a browser sign-in that enriches the signed-in identity with
//! directory groups.

#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod secure;

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging, preferring `RUST_LOG` over `default_level`.
pub fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

/// Load `.env` (if present), overriding variables already set.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv_override() {
        // .env file is optional - only report if it exists but is unreadable
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
