//! Logs in against a mocked OIDC authority with the default reqwest transport and prints the
//! `Authorization` header a remoting client would send.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use remoting_token::{
	CancellationToken,
	auth::{ClientCredentials, ScopeSet},
	config::RemotingConfig,
	store::{RemotingTokenSource, ReqwestTokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let document = format!(
		"{{\"issuer\":\"{}\",\"token_endpoint\":\"{}\"}}",
		server.base_url(),
		server.url("/connect/token")
	);
	let discovery_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200).header("content-type", "application/json").body(document);
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let credentials = ClientCredentials::new(
		"demo.client",
		"super-secret",
		ScopeSet::new(["remoting.audit", "remoting.identity"])?,
	)?;
	let config = RemotingConfig::builder(server.base_url(), credentials).build()?;
	let shutdown = CancellationToken::new();
	let store = ReqwestTokenStore::new(config, shutdown.clone())?;
	let header = store.authorization(&CancellationToken::new()).await?;

	println!("Authorization: {header}");
	println!("Renewal: {:?}.", *store.renewal_status().borrow());

	discovery_mock.assert_async().await;
	token_mock.assert_async().await;

	shutdown.cancel();
	store.stop().await;

	Ok(())
}
