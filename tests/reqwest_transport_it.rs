#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use remoting_token::{
	CancellationToken,
	auth::{ClientCredentials, ScopeSet},
	config::RemotingConfig,
	error::{DiscoveryError, Error, TokenEndpointError},
	store::ReqwestTokenStore,
};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
const TOKEN_PATH: &str = "/connect/token";

fn build_store(server: &MockServer) -> ReqwestTokenStore {
	let scope = ScopeSet::new(["remoting.audit"]).expect("Scope fixture should be valid.");
	let credentials = ClientCredentials::new("sample.client", "sample-secret", scope)
		.expect("Credentials fixture should be valid.");
	let config = RemotingConfig::builder(server.base_url(), credentials)
		.build()
		.expect("Loopback authorities should be accepted over plain HTTP.");

	ReqwestTokenStore::new(config, CancellationToken::new())
		.expect("Reqwest transport should build.")
}

async fn mock_discovery(server: &MockServer) -> httpmock::Mock<'_> {
	let document = serde_json::json!({
		"issuer": server.base_url(),
		"token_endpoint": server.url(TOKEN_PATH),
	})
	.to_string();

	server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(200).header("content-type", "application/json").body(document);
		})
		.await
}

#[tokio::test]
async fn discovery_then_client_credentials_over_http() {
	let server = MockServer::start_async().await;
	let discovery = mock_discovery(&server).await;
	let grant = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"mock-access\",\"token_type\":\"bearer\",\"expires_in\":3600,\"refresh_token\":\"mock-refresh\"}",
			);
		})
		.await;
	let store = build_store(&server);
	let cancel = CancellationToken::new();
	let first = store.get_token(&cancel).await.expect("Login against the mock should succeed.");
	let second = store.get_token(&cancel).await.expect("The cached token should be served.");

	assert_eq!(first.expose(), "mock-access");
	assert_eq!(second, first);

	let cached = store.cached_token().expect("The token should be cached.");

	assert_eq!(
		cached.refresh_token.as_ref().map(|token| token.expose()),
		Some("mock-refresh")
	);

	discovery.assert_calls_async(1).await;
	grant.assert_calls_async(1).await;

	store.stop().await;
}

#[tokio::test]
async fn rejected_client_surfaces_the_oauth_error() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let grant = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\",\"error_description\":\"unknown client\"}");
		})
		.await;
	let store = build_store(&server);
	let err = store
		.get_token(&CancellationToken::new())
		.await
		.expect_err("An invalid client must fail the login.");

	assert!(
		matches!(
			&err,
			Error::Grant(TokenEndpointError::Rejected { error, status: Some(401), .. })
				if error == "invalid_client"
		),
		"Unexpected error {err:?}."
	);
	assert_eq!(err.to_string(), "Client login failed: invalid_client (unknown client)");
	assert!(store.cached_token().is_none());

	grant.assert_async().await;
}

#[tokio::test]
async fn missing_discovery_document_reports_the_status() {
	let server = MockServer::start_async().await;
	let discovery = server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(404).body("not here");
		})
		.await;
	let store = build_store(&server);
	let err = store
		.get_token(&CancellationToken::new())
		.await
		.expect_err("A missing discovery document must fail the login.");

	assert!(
		matches!(
			&err,
			Error::Discovery(DiscoveryError::Status { status: 404, body_preview, .. })
				if body_preview == "not here"
		),
		"Unexpected error {err:?}."
	);
	assert!(!err.is_retryable());

	discovery.assert_async().await;
}
