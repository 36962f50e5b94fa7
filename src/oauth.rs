//! Token endpoint facade over the `oauth2` crate plus transport error mappers.

pub use oauth2;

// crates.io
use oauth2::{
	AccessToken, AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RefreshToken, RequestTokenError, Scope, StandardRevocableToken,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
use serde::{Deserializer, Serializer};
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, ScopeSet, Token, TokenSecret},
	error::{ConfigError, TokenEndpointError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ClientAuthMethod, GrantType, ProviderErrorContext, ProviderStrategy},
};

type ConfiguredClient = Client<
	BasicErrorResponse,
	EndpointTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TokenEndpointError>> + 'a + Send>>;

/// Maps transport failures reported by an [`oauth2::AsyncHttpClient`] into [`TransportError`].
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> TransportError;
}

/// Mapper for the reqwest transport.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> TransportError {
		match err {
			HttpClientError::Reqwest(inner) => TransportError::from(*inner),
			HttpClientError::Io(inner) => TransportError::from(inner),
			other => describe(meta, other),
		}
	}
}

/// Mapper for any transport: typed errors become [`TransportError::Network`].
#[derive(Clone, Debug, Default)]
pub struct GenericTransportErrorMapper;
impl<E> TransportErrorMapper<E> for GenericTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> TransportError {
		match err {
			HttpClientError::Reqwest(inner) => TransportError::network(*inner),
			HttpClientError::Io(inner) => TransportError::from(inner),
			other => describe(meta, other),
		}
	}
}

fn describe<E>(meta: Option<&ResponseMetadata>, err: HttpClientError<E>) -> TransportError
where
	E: 'static + Send + Sync + StdError,
{
	let message = match meta.and_then(|meta| meta.status) {
		Some(status) => format!("{err} (HTTP {status})"),
		None => err.to_string(),
	};

	TransportError::Other { message }
}

/// Successful token endpoint body.
///
/// Accepts responses without `token_type` and treats them as `bearer`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct EndpointTokenResponse {
	access_token: AccessToken,
	#[serde(default = "bearer")]
	token_type: BasicTokenType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	expires_in: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<RefreshToken>,
	#[serde(
		rename = "scope",
		default,
		skip_serializing_if = "Option::is_none",
		deserialize_with = "deserialize_scopes",
		serialize_with = "serialize_scopes"
	)]
	scopes: Option<Vec<Scope>>,
}
impl TokenResponse for EndpointTokenResponse {
	type TokenType = BasicTokenType;

	fn access_token(&self) -> &AccessToken {
		&self.access_token
	}

	fn token_type(&self) -> &Self::TokenType {
		&self.token_type
	}

	fn expires_in(&self) -> Option<std::time::Duration> {
		self.expires_in.map(std::time::Duration::from_secs)
	}

	fn refresh_token(&self) -> Option<&RefreshToken> {
		self.refresh_token.as_ref()
	}

	fn scopes(&self) -> Option<&Vec<Scope>> {
		self.scopes.as_ref()
	}
}

fn bearer() -> BasicTokenType {
	BasicTokenType::Bearer
}

fn deserialize_scopes<'de, D>(deserializer: D) -> Result<Option<Vec<Scope>>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<String>::deserialize(deserializer)?;

	Ok(raw.map(|raw| raw.split_whitespace().map(|scope| Scope::new(scope.to_owned())).collect()))
}

fn serialize_scopes<S>(scopes: &Option<Vec<Scope>>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match scopes {
		Some(scopes) => serializer.serialize_str(
			&scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" "),
		),
		None => serializer.serialize_none(),
	}
}

/// Client for the discovered token endpoint.
///
/// Holds everything both grants need so the renewal loop can re-issue them without
/// re-running discovery.
pub(crate) struct TokenEndpointClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	scope: ScopeSet,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
}
impl<C, M> TokenEndpointClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(
		token_endpoint: &Url,
		credentials: &ClientCredentials,
		auth_method: ClientAuthMethod,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		strategy: Arc<dyn ProviderStrategy>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_endpoint.to_string()).map_err(|source| {
			ConfigError::InvalidTokenEndpoint { url: token_endpoint.to_string(), source }
		})?;
		let mut oauth_client: ConfiguredClient =
			Client::new(ClientId::new(credentials.client_id().to_owned()))
				.set_client_secret(ClientSecret::new(credentials.client_secret().expose().to_owned()))
				.set_token_uri(token_url);

		if matches!(auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			scope: credentials.scope().clone(),
			http_client,
			error_mapper,
			strategy,
		})
	}

	/// `grant_type=client_credentials` with the configured scope.
	pub(crate) fn client_credentials(&self) -> FacadeFuture<'_, Token> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for scope in self.scope.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}
			for (key, value) in self.extra_params(GrantType::ClientCredentials) {
				request = request.add_extra_param(key, value);
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| self.map_request_error(GrantType::ClientCredentials, meta.take(), err))?;

			self.token_from_response(GrantType::ClientCredentials, response, None)
		})
	}

	/// `grant_type=refresh_token`; keeps `previous` when the response does not rotate it.
	pub(crate) fn refresh<'a>(&'a self, previous: &'a TokenSecret) -> FacadeFuture<'a, Token> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let refresh_token = RefreshToken::new(previous.expose().to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_token);

			for (key, value) in self.extra_params(GrantType::RefreshToken) {
				request = request.add_extra_param(key, value);
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| self.map_request_error(GrantType::RefreshToken, meta.take(), err))?;

			self.token_from_response(GrantType::RefreshToken, response, Some(previous))
		})
	}

	fn extra_params(&self, grant: GrantType) -> BTreeMap<String, String> {
		let mut form = BTreeMap::new();

		self.strategy.augment_token_request(grant, &mut form);

		form
	}

	fn token_from_response(
		&self,
		grant: GrantType,
		response: EndpointTokenResponse,
		previous_refresh: Option<&TokenSecret>,
	) -> Result<Token, TokenEndpointError> {
		let acquired_at = OffsetDateTime::now_utc();
		let expires_in = response.expires_in().ok_or(TokenEndpointError::MissingExpiresIn)?;
		let expires_in = i64::try_from(expires_in.as_secs())
			.map_err(|_| TokenEndpointError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(TokenEndpointError::NonPositiveExpiresIn);
		}
		if let Some(returned) = response.scopes() {
			let granted = ScopeSet::new(returned.iter().map(|scope| scope.as_str()));

			if granted.as_ref().is_ok_and(|granted| *granted != self.scope) {
				tracing::warn!(
					grant = grant.as_str(),
					requested = %self.scope,
					granted = granted.map(|set| set.normalized()).unwrap_or_default(),
					"authority granted a different scope"
				);
			}
		}

		let refresh_token = response
			.refresh_token()
			.map(|secret| TokenSecret::new(secret.secret()))
			.filter(|secret| !secret.is_empty())
			.or_else(|| previous_refresh.cloned());

		Token::builder()
			.access_token(response.access_token().secret())
			.maybe_refresh_token(refresh_token)
			.expires_in(Duration::seconds(expires_in))
			.acquired_at(acquired_at)
			.build()
			.map_err(|err| TokenEndpointError::UnexpectedResponse {
				message: err.to_string(),
				status: None,
				retry_after: None,
			})
	}

	fn map_request_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> TokenEndpointError {
		let status = meta.as_ref().and_then(|meta| meta.status);

		match err {
			RequestTokenError::ServerResponse(response) =>
				self.map_server_response(grant, response, status),
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(meta.as_ref(), error).into(),
			RequestTokenError::Parse(source, _body) =>
				TokenEndpointError::ResponseParse { source: Arc::new(source), status },
			RequestTokenError::Other(message) => TokenEndpointError::UnexpectedResponse {
				message,
				status,
				retry_after: meta.and_then(|meta| meta.retry_after),
			},
		}
	}

	fn map_server_response(
		&self,
		grant: GrantType,
		response: BasicErrorResponse,
		status: Option<u16>,
	) -> TokenEndpointError {
		let error = response.error().as_ref().to_owned();
		let description = response.error_description().cloned();
		let mut ctx = ProviderErrorContext::new(grant).with_oauth_error(error.clone());

		if let Some(description) = &description {
			ctx = ctx.with_error_description(description.clone());
		}
		if let Some(status) = status {
			ctx = ctx.with_http_status(status);
		}

		TokenEndpointError::Rejected {
			kind: self.strategy.classify_token_error(&ctx),
			error,
			description,
			status,
		}
	}
}
