//! Shared fixtures for the Graph and identity provider mock servers.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use azuredir::auth::credential::TokenProvider;
use azuredir::directory::DirectoryClient;
use azuredir::error::AuthError;
use azuredir::secure::SecureString;

pub const TEST_TENANT: &str = "contoso";
pub const TEST_CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const TEST_CLIENT_SECRET: &str = "test-secret";
pub const TEST_BEARER: &str = "graph-token";

/// Token provider returning a fixed bearer token.
pub struct StaticToken;

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<SecureString, AuthError> {
        Ok(TEST_BEARER.into())
    }
}

/// Directory client pointed at `{server}/v1.0`.
pub fn directory_client(server: &MockServer) -> DirectoryClient {
    DirectoryClient::new(&graph_base(server), Arc::new(StaticToken)).unwrap()
}

pub fn graph_base(server: &MockServer) -> String {
    format!("{}/v1.0", server.uri())
}

pub fn create_test_user(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "displayName": format!("Test User {}", name),
        "mail": format!("{}@contoso.com", name),
    })
}

pub fn create_test_group(id: &str, name: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.group",
        "id": id,
        "displayName": name,
    })
}

pub fn create_test_role(id: &str, name: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.directoryRole",
        "id": id,
        "displayName": name,
    })
}

/// OData collection page, with a `@odata.nextLink` when `next` is given.
pub fn odata_page(items: Vec<Value>, next: Option<String>) -> Value {
    let mut page = json!({ "value": items });
    if let Some(next) = next {
        page["@odata.nextLink"] = json!(next);
    }
    page
}

/// Next link for a continuation page identified by `token`.
pub fn next_link(server: &MockServer, resource: &str, token: &str) -> String {
    format!("{}/v1.0/{}?$skiptoken={}", server.uri(), resource, token)
}

/// Mount the client credentials endpoint for [`TEST_TENANT`].
pub async fn mock_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TEST_TENANT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": TEST_BEARER,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Unsigned JWT carrying `claims`.
pub fn unsigned_jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "RS256", "typ": "JWT", "kid": "k1" }).to_string());
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode(b"not-a-real-signature");
    format!("{}.{}.{}", header, payload, signature)
}
