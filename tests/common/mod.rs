//! Scripted in-memory authority shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
// self
use remoting_token::{
	CancellationToken,
	auth::{ClientCredentials, ScopeSet},
	config::RemotingConfig,
	flows::RenewalStatus,
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{
		GenericTransportErrorMapper,
		oauth2::{
			AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
			http::{
				Response,
				header::{AUTHORIZATION, CONTENT_TYPE},
			},
		},
	},
	provider::{DefaultProviderStrategy, ProviderStrategy},
	store::TokenStore,
	url::form_urlencoded,
};

pub const AUTHORITY: &str = "https://auth.example.test";
pub const TOKEN_PATH: &str = "/connect/token";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const CLIENT_ID: &str = "sample.client";
pub const CLIENT_SECRET: &str = "sample-secret";

pub type TestStore = TokenStore<FakeAuthority, GenericTransportErrorMapper>;

/// Scripted answer for one request.
#[derive(Clone, Debug)]
pub enum Reply {
	Token {
		access_token: String,
		refresh_token: Option<String>,
		expires_in: u64,
		token_type: Option<&'static str>,
	},
	OAuthError { status: u16, error: &'static str },
	Status(u16),
	Unreachable,
}
impl Reply {
	pub fn token(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> Self {
		Self::Token {
			access_token: access_token.into(),
			refresh_token: refresh_token.map(Into::into),
			expires_in,
			token_type: Some("bearer"),
		}
	}

	/// Same token, but the body carries no `token_type` member.
	pub fn without_token_type(self) -> Self {
		match self {
			Self::Token { access_token, refresh_token, expires_in, .. } =>
				Self::Token { access_token, refresh_token, expires_in, token_type: None },
			other => other,
		}
	}
}

#[derive(Debug)]
pub struct FakeTransportError;
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Authority is unreachable.")
	}
}
impl StdError for FakeTransportError {}

/// In-memory authority serving discovery and both grants.
///
/// Unscripted logins issue `login-N` tokens and unscripted refreshes issue `refreshed-N`
/// tokens, all valid for an hour with a rotating refresh token.
#[derive(Clone, Default)]
pub struct FakeAuthority(Arc<State>);
#[derive(Default)]
struct State {
	discovery: Mutex<VecDeque<Reply>>,
	logins: Mutex<VecDeque<Reply>>,
	refreshes: Mutex<VecDeque<Reply>>,
	latency: Mutex<Option<Duration>>,
	forms: Mutex<Vec<Vec<(String, String)>>>,
	authorizations: Mutex<Vec<Option<String>>>,
	discovery_calls: AtomicUsize,
	login_calls: AtomicUsize,
	refresh_calls: AtomicUsize,
}
impl FakeAuthority {
	pub fn queue_discovery(&self, reply: Reply) -> &Self {
		self.0.discovery.lock().push_back(reply);

		self
	}

	pub fn queue_login(&self, reply: Reply) -> &Self {
		self.0.logins.lock().push_back(reply);

		self
	}

	pub fn queue_refresh(&self, reply: Reply) -> &Self {
		self.0.refreshes.lock().push_back(reply);

		self
	}

	pub fn set_latency(&self, latency: Duration) {
		*self.0.latency.lock() = Some(latency);
	}

	pub fn discovery_calls(&self) -> usize {
		self.0.discovery_calls.load(Ordering::SeqCst)
	}

	pub fn login_calls(&self) -> usize {
		self.0.login_calls.load(Ordering::SeqCst)
	}

	pub fn refresh_calls(&self) -> usize {
		self.0.refresh_calls.load(Ordering::SeqCst)
	}

	pub fn total_calls(&self) -> usize {
		self.discovery_calls() + self.login_calls() + self.refresh_calls()
	}

	/// Token endpoint form bodies in arrival order.
	pub fn forms(&self) -> Vec<Vec<(String, String)>> {
		self.0.forms.lock().clone()
	}

	/// `Authorization` header of the `index`-th token endpoint request.
	pub fn authorization(&self, index: usize) -> Option<String> {
		self.0.authorizations.lock().get(index).cloned().flatten()
	}
}
impl TokenHttpClient for FakeAuthority {
	type Handle = FakeHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHandle { state: self.0.clone(), slot }
	}
}

pub struct FakeHandle {
	state: Arc<State>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for FakeHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let state = self.state.clone();
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let latency = *state.latency.lock();

			if let Some(latency) = latency {
				tokio::time::sleep(latency).await;
			}

			let reply = match request.uri().path() {
				DISCOVERY_PATH => {
					state.discovery_calls.fetch_add(1, Ordering::SeqCst);

					match state.discovery.lock().pop_front() {
						Some(reply) => reply,
						None => return Ok(respond(&slot, 200, discovery_document())),
					}
				},
				TOKEN_PATH => {
					let form = form_urlencoded::parse(request.body())
						.map(|(key, value)| (key.into_owned(), value.into_owned()))
						.collect::<Vec<_>>();
					let grant = form
						.iter()
						.find(|(key, _)| key == "grant_type")
						.map(|(_, value)| value.clone())
						.unwrap_or_default();

					state.forms.lock().push(form);
					state.authorizations.lock().push(
						request
							.headers()
							.get(AUTHORIZATION)
							.and_then(|value| value.to_str().ok())
							.map(ToOwned::to_owned),
					);

					if grant == "refresh_token" {
						let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

						state.refreshes.lock().pop_front().unwrap_or_else(|| {
							let access = format!("refreshed-{n}");
							let refresh = format!("refresh-after-{n}");

							Reply::token(&access, Some(&refresh), 3_600)
						})
					} else {
						let n = state.login_calls.fetch_add(1, Ordering::SeqCst) + 1;

						state.logins.lock().pop_front().unwrap_or_else(|| {
							let access = format!("login-{n}");
							let refresh = format!("login-refresh-{n}");

							Reply::token(&access, Some(&refresh), 3_600)
						})
					}
				},
				other => panic!("Unexpected request path {other}."),
			};

			match reply {
				Reply::Token { access_token, refresh_token, expires_in, token_type } => {
					let mut body = serde_json::json!({
						"access_token": access_token,
						"expires_in": expires_in,
					});

					if let Some(token_type) = token_type {
						body["token_type"] = token_type.into();
					}
					if let Some(refresh_token) = refresh_token {
						body["refresh_token"] = refresh_token.into();
					}

					Ok(respond(&slot, 200, body.to_string()))
				},
				Reply::OAuthError { status, error } => Ok(respond(
					&slot,
					status,
					serde_json::json!({ "error": error, "error_description": "scripted failure" })
						.to_string(),
				)),
				Reply::Status(status) => Ok(respond(&slot, status, "{\"detail\":\"unavailable\"}".into())),
				Reply::Unreachable => Err(HttpClientError::Reqwest(Box::new(FakeTransportError))),
			}
		})
	}
}

fn discovery_document() -> String {
	serde_json::json!({
		"issuer": AUTHORITY,
		"token_endpoint": format!("{AUTHORITY}{TOKEN_PATH}"),
		"grant_types_supported": ["client_credentials", "refresh_token"],
	})
	.to_string()
}

fn respond(slot: &ResponseMetadataSlot, status: u16, body: String) -> HttpResponse {
	slot.store(ResponseMetadata { status: Some(status), retry_after: None });

	Response::builder()
		.status(status)
		.header(CONTENT_TYPE, "application/json")
		.body(body.into_bytes())
		.expect("Scripted responses should be valid HTTP responses.")
}

pub fn credentials() -> ClientCredentials {
	let scope = ScopeSet::new(["remoting.audit", "remoting.identity"])
		.expect("Scope fixture should be valid.");

	ClientCredentials::new(CLIENT_ID, CLIENT_SECRET, scope)
		.expect("Credentials fixture should be valid.")
}

pub fn config() -> RemotingConfig {
	RemotingConfig::builder(AUTHORITY, credentials())
		.jitter_seed(7)
		.build()
		.expect("Test configuration should build.")
}

pub fn store(authority: &FakeAuthority, shutdown: CancellationToken) -> TestStore {
	store_with(authority, config(), Arc::new(DefaultProviderStrategy), shutdown)
}

pub fn store_with(
	authority: &FakeAuthority,
	config: RemotingConfig,
	strategy: Arc<dyn ProviderStrategy>,
	shutdown: CancellationToken,
) -> TestStore {
	TokenStore::with_strategy(config, authority.clone(), GenericTransportErrorMapper, strategy, shutdown)
}

/// Waits for the next status matching `predicate` and returns it.
pub async fn wait_for_status(
	status: &mut tokio::sync::watch::Receiver<RenewalStatus>,
	predicate: impl FnMut(&RenewalStatus) -> bool,
) -> RenewalStatus {
	*status.wait_for(predicate).await.expect("The status channel should stay open.")
}

/// Token endpoint form value for `key` in the `index`-th request.
pub fn form_value(authority: &FakeAuthority, index: usize, key: &str) -> Option<String> {
	authority.forms().get(index).and_then(|form| {
		form.iter().find(|(name, _)| name == key).map(|(_, value)| value.clone())
	})
}
