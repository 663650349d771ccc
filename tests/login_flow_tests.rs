//! Login flow integration tests.
//!
//! Drives the axum router end to end against a mocked Azure AD tenant
//! (discovery, token and user-info endpoints) and a mocked Graph API.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_is, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use azuredir::auth::flow::AuthFlow;
use azuredir::auth::oauth::{OAuth2Client, ProviderMetadata};
use azuredir::auth::server::{router, ServerState};
use azuredir::config::Config;
use azuredir::error::AuthError;

const TEST_CODE: &str = "auth-code-123";

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::embedded().unwrap();
    config.oauth.tenant = TEST_TENANT.to_string();
    config.oauth.client_id = TEST_CLIENT_ID.to_string();
    config.oauth.client_secret = TEST_CLIENT_SECRET.into();
    config.api.authority_host = server.uri();
    config.api.graph_base_url = graph_base(server);
    config
}

async fn mock_discovery(server: &MockServer) {
    let base = format!("{}/{}", server.uri(), TEST_TENANT);
    Mock::given(method("GET"))
        .and(path(format!("/{}/v2.0/.well-known/openid-configuration", TEST_TENANT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": format!("{}/v2.0", base),
            "authorization_endpoint": format!("{}/oauth2/v2.0/authorize", base),
            "token_endpoint": format!("{}/oauth2/v2.0/token", base),
            "userinfo_endpoint": format!("{}/oidc/userinfo", server.uri()),
            "jwks_uri": format!("{}/discovery/v2.0/keys", base),
            "response_types_supported": ["code", "id_token"],
        })))
        .mount(server)
        .await;
}

/// Mount a successful code exchange returning `access_token` and a signed-looking id token.
async fn mock_code_exchange(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TEST_TENANT)))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={}", TEST_CODE).as_str()))
        .and(body_string_contains(format!("client_secret={}", TEST_CLIENT_SECRET).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid profile email User.Read",
            "access_token": access_token,
            "id_token": unsigned_jwt(json!({
                "aud": TEST_CLIENT_ID,
                "oid": "u1",
                "preferred_username": "adele@contoso.com",
                "name": "Adele Vance",
            })),
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mock_user_info(server: &MockServer, access_token: &str) {
    Mock::given(method("GET"))
        .and(path("/oidc/userinfo"))
        .and(header_is("Authorization", format!("Bearer {}", access_token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "OaXiK0vGqR7Yp",
            "email": "adele@contoso.com",
            "name": "Adele Vance",
            "given_name": "Adele",
        })))
        .mount(server)
        .await;
}

async fn mock_directory_groups(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "mail eq 'adele@contoso.com'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(odata_page(
            vec![create_test_user("u1", "adele")],
            None,
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users/u1/memberOf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(odata_page(
            vec![
                create_test_group("g1", "Engineering"),
                create_test_role("r1", "Global Reader"),
                create_test_group("g2", "All Company"),
            ],
            None,
        )))
        .mount(server)
        .await;
}

fn access_jwt() -> String {
    unsigned_jwt(json!({
        "aud": "00000003-0000-0000-c000-000000000000",
        "scp": "openid profile email User.Read",
        "oid": "u1",
    }))
}

/// Router backed by discovery against the mock tenant.
async fn login_app(server: &MockServer, with_directory: bool) -> Router {
    mock_discovery(server).await;
    let config = test_config(server);
    let oauth = OAuth2Client::discover(&config).await.unwrap();
    let directory = with_directory.then(|| Arc::new(directory_client(server)));
    router(ServerState::new(Arc::new(AuthFlow::new(oauth, directory)), false))
}

/// Hit `/login` and return the state pinned in the cookie.
async fn start_login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("state="))
        .unwrap()
        .to_string()
}

fn callback_request(cookie_state: Option<&str>, query: &str) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/auth/callback?{}", query));
    if let Some(state) = cookie_state {
        builder = builder.header(header::COOKIE, format!("theme=dark; state={}", state));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, cookie, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_login_redirects_with_state_cookie() {
    let server = MockServer::start().await;
    let app = login_app(&server, false).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("state="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=3600"));
    assert!(!cookie.contains("Secure"));

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let url = url::Url::parse(location).unwrap();
    assert_eq!(url.path(), format!("/{}/oauth2/v2.0/authorize", TEST_TENANT));

    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    let state = cookie.split(';').next().unwrap().trim_start_matches("state=");
    assert_eq!(params["state"], state);
    assert_eq!(params["client_id"], TEST_CLIENT_ID);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["scope"], "openid profile email User.Read");
}

#[tokio::test]
async fn test_each_login_gets_a_fresh_state() {
    let server = MockServer::start().await;
    let app = login_app(&server, false).await;

    let first = start_login(&app).await;
    let second = start_login(&app).await;

    assert_ne!(first, second);
    assert_eq!(first.len(), 22);
}

#[tokio::test]
async fn test_successful_callback_returns_identity_and_groups() {
    let server = MockServer::start().await;
    let access_token = access_jwt();
    mock_code_exchange(&server, &access_token, 1).await;
    mock_user_info(&server, &access_token).await;
    mock_directory_groups(&server).await;
    let app = login_app(&server, true).await;

    let state = start_login(&app).await;
    let (status, cookie, body) = send(
        &app,
        callback_request(Some(&state), &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(cookie.unwrap().contains("Max-Age=0"));

    let payload: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(payload["UserInfo"]["sub"], "OaXiK0vGqR7Yp");
    assert_eq!(payload["UserInfo"]["email"], "adele@contoso.com");
    assert_eq!(payload["UserInfo"]["given_name"], "Adele");
    assert_eq!(payload["Groups"], json!(["Engineering", "All Company"]));

    let id_token = &payload["IdTokenParsed"];
    assert_eq!(id_token["Header"]["alg"], "RS256");
    assert_eq!(id_token["Method"], "RS256");
    assert_eq!(id_token["Signature"], "bm90LWEtcmVhbC1zaWduYXR1cmU=");
    assert_eq!(id_token["Claims"]["preferred_username"], "adele@contoso.com");
    assert_eq!(id_token["Valid"], false);
    assert!(id_token["Raw"].as_str().unwrap().split('.').count() == 3);

    assert_eq!(payload["AccessTokenParsed"]["Claims"]["scp"], "openid profile email User.Read");
    assert_eq!(payload["AccessTokenParsed"]["Raw"], access_token);
}

#[tokio::test]
async fn test_opaque_access_token_is_omitted() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "EwBwA8l6BAAU-opaque", 1).await;
    mock_user_info(&server, "EwBwA8l6BAAU-opaque").await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, _, body) = send(
        &app,
        callback_request(Some(&state), &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_str(&body).unwrap();
    assert!(payload.get("AccessTokenParsed").is_none());
    assert!(payload.get("IdTokenParsed").is_some());
    assert_eq!(payload["Groups"], json!([]));
}

#[tokio::test]
async fn test_directory_failure_does_not_fail_sign_in() {
    let server = MockServer::start().await;
    let access_token = access_jwt();
    mock_code_exchange(&server, &access_token, 1).await;
    mock_user_info(&server, &access_token).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let app = login_app(&server, true).await;

    let state = start_login(&app).await;
    let (status, _, body) = send(
        &app,
        callback_request(Some(&state), &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(payload["Groups"], json!([]));
}

#[tokio::test]
async fn test_missing_cookie_is_rejected_before_exchange() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "unused", 0).await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, cookie, body) = send(
        &app,
        callback_request(None, &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "state not found");
    assert!(cookie.is_none());
}

#[tokio::test]
async fn test_mismatched_state_is_rejected_before_exchange() {
    let server = MockServer::start().await;
    let access_token = access_jwt();
    mock_code_exchange(&server, &access_token, 1).await;
    mock_user_info(&server, &access_token).await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, _, body) = send(
        &app,
        callback_request(Some(&state), &format!("state=forged&code={}", TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "state did not match");

    // The pending state survives a forged callback
    let (status, _, _) = send(
        &app,
        callback_request(Some(&state), &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_query_state_is_a_mismatch() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "unused", 0).await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, _, body) = send(
        &app,
        callback_request(Some(&state), &format!("code={}", TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "state did not match");
}

#[tokio::test]
async fn test_state_cannot_be_replayed() {
    let server = MockServer::start().await;
    let access_token = access_jwt();
    mock_code_exchange(&server, &access_token, 1).await;
    mock_user_info(&server, &access_token).await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let query = format!("state={}&code={}", state, TEST_CODE);

    let (status, _, _) = send(&app, callback_request(Some(&state), &query)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app, callback_request(Some(&state), &query)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "state not found");
}

#[tokio::test]
async fn test_unissued_state_is_rejected() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "unused", 0).await;
    let app = login_app(&server, false).await;

    let (status, _, body) = send(
        &app,
        callback_request(Some("made-up"), &format!("state=made-up&code={}", TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "state not found");
}

#[tokio::test]
async fn test_provider_error_is_reported() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "unused", 0).await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, cookie, body) = send(
        &app,
        callback_request(
            Some(&state),
            &format!(
                "state={}&error=access_denied&error_description=User%20cancelled%20the%20sign-in",
                state
            ),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("User cancelled the sign-in"));
    assert!(cookie.unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_missing_code() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "unused", 0).await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, _, body) =
        send(&app, callback_request(Some(&state), &format!("state={}", state))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, AuthError::MissingCode.to_string());
}

#[tokio::test]
async fn test_exchange_failure_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TEST_TENANT)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS54005: OAuth2 Authorization code was already redeemed."
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, cookie, body) = send(
        &app,
        callback_request(Some(&state), &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Failed to exchange token: HTTP 400 invalid_grant");
    assert!(!body.contains("AADSTS"));
    assert!(cookie.unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_user_info_failure_is_internal_error() {
    let server = MockServer::start().await;
    let access_token = access_jwt();
    mock_code_exchange(&server, &access_token, 1).await;
    Mock::given(method("GET"))
        .and(path("/oidc/userinfo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let app = login_app(&server, false).await;

    let state = start_login(&app).await;
    let (status, _, body) = send(
        &app,
        callback_request(Some(&state), &format!("state={}&code={}", state, TEST_CODE)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Failed to get userinfo: HTTP 401");
}

#[tokio::test]
async fn test_discovery_failure() {
    let server = MockServer::start().await;
    let http_client = reqwest::Client::new();

    let result =
        ProviderMetadata::discover(&http_client, &format!("{}/{}/v2.0", server.uri(), TEST_TENANT))
            .await;

    match result {
        Err(AuthError::Discovery(msg)) => assert_eq!(msg, "HTTP 404"),
        other => panic!("expected discovery error, got {:?}", other),
    }
    assert!(OAuth2Client::discover(&test_config(&server)).await.is_err());
}
