//! HTTP surface of the login flow.
//!
//! `GET /login` sets the state cookie and redirects to Azure AD;
//! `GET /auth/callback` verifies it and returns the signed-in identity as JSON.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::flow::AuthFlow;
use crate::auth::oauth::CallbackQuery;
use crate::auth::session::{clear_state_cookie, cookie_value, state_cookie, STATE_COOKIE};
use crate::error::AuthError;

/// Path of the login entry point.
pub const LOGIN_PATH: &str = "/login";
/// Path of the redirect URI.
pub const CALLBACK_PATH: &str = "/auth/callback";

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
    flow: Arc<AuthFlow>,
    secure_cookies: bool,
}

impl ServerState {
    /// `secure_cookies` adds the `Secure` attribute; use it when served over HTTPS.
    pub fn new(flow: Arc<AuthFlow>, secure_cookies: bool) -> Self {
        Self {
            flow,
            secure_cookies,
        }
    }
}

/// Build the login router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route(LOGIN_PATH, get(login))
        .route(CALLBACK_PATH, get(callback))
        .with_state(state)
}

async fn login(State(state): State<ServerState>) -> Response {
    let redirect = match state.flow.start() {
        Ok(redirect) => redirect,
        Err(e) => {
            error!("Failed to start login: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, redirect.url.to_string()),
            (
                header::SET_COOKIE,
                state_cookie(&redirect.state, state.secure_cookies),
            ),
        ],
    )
        .into_response()
}

async fn callback(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let cookie_state = cookie_value(&headers, STATE_COOKIE);

    match state.flow.complete(cookie_state.as_deref(), query).await {
        Ok(payload) => match serde_json::to_string_pretty(&payload) {
            Ok(body) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/json".to_string()),
                    (header::SET_COOKIE, clear_state_cookie(state.secure_cookies)),
                ],
                body,
            )
                .into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        },
        // The session is not advanced on state failures, so keep the cookie
        Err(e @ (AuthError::StateMissing | AuthError::StateMismatch)) => e.into_response(),
        Err(e) => {
            error!("Callback failed: {}", e);
            let mut response = e.into_response();
            if let Ok(value) = clear_state_cookie(state.secure_cookies).parse() {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            response
        }
    }
}

/// Serve `app` on `listen_addr` until Ctrl-C.
pub async fn serve(listen_addr: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    info!("listening on http://{}/", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Error listening")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down login server");
}
