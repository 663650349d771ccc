//! Azure AD authentication module.
//!
//! Provides the app-only client credential used for directory access and the
//! interactive authorization-code login flow with its HTTP surface.

pub mod credential;
pub mod flow;
pub mod jwt;
pub mod oauth;
pub mod server;
pub mod session;
pub mod token_manager;
