//! Discovery plus client-credentials login, and the refresh used by the renewal loop.

// self
use crate::{
	_prelude::*,
	auth::Token,
	authority::discovery,
	config::RemotingConfig,
	error::Operation,
	http::TokenHttpClient,
	oauth::{TokenEndpointClient, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderStrategy,
};

/// Acquires tokens from the authority.
///
/// `login` always re-runs discovery so a moved token endpoint is picked up on the next
/// login. `refresh` reuses the endpoint discovered by the last login.
pub struct TokenAcquirer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<RemotingConfig>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
	endpoint: RwLock<Option<Arc<TokenEndpointClient<C, M>>>>,
}
impl<C, M> TokenAcquirer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an acquirer over the provided transport.
	pub fn new(
		config: Arc<RemotingConfig>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
		strategy: Arc<dyn ProviderStrategy>,
	) -> Self {
		Self {
			config,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			strategy,
			endpoint: RwLock::new(None),
		}
	}

	/// Configuration shared with the store.
	pub fn config(&self) -> &RemotingConfig {
		&self.config
	}

	/// Runs discovery and the client-credentials grant.
	///
	/// `retry_count` is only reported in logs; when it is positive the caller has already
	/// waited out the matching backoff delay.
	pub async fn login(&self, retry_count: u32, cancel: &CancellationToken) -> Result<Token> {
		tracing::info!(retry_count, authority = %self.config.authority, "logging in");

		let endpoint = self.discover(cancel).await?;

		self.observe(Operation::ClientCredentials, "login", cancel, async {
			endpoint.client_credentials().await.map_err(Error::Grant)
		})
		.await
	}

	/// Renews `current` at the known token endpoint.
	///
	/// Uses the refresh-token grant when `current` carries a refresh token and a
	/// client-credentials re-grant otherwise. Either way failures surface as
	/// [`Error::Refresh`].
	pub async fn refresh(&self, current: &Token, cancel: &CancellationToken) -> Result<Token> {
		let cached = self.endpoint.read().clone();
		let endpoint = match cached {
			Some(endpoint) => endpoint,
			None => self.discover(cancel).await?,
		};

		match &current.refresh_token {
			Some(refresh_token) => {
				tracing::info!("refreshing client token");

				self.observe(Operation::Refresh, "refresh", cancel, async {
					endpoint.refresh(refresh_token).await.map_err(Error::Refresh)
				})
				.await
			},
			None => {
				tracing::info!("refreshing client token with a new client-credentials grant");

				self.observe(Operation::ClientCredentials, "regrant", cancel, async {
					endpoint.client_credentials().await.map_err(Error::Refresh)
				})
				.await
			},
		}
	}

	async fn discover(&self, cancel: &CancellationToken) -> Result<Arc<TokenEndpointClient<C, M>>> {
		let document = self
			.observe(
				Operation::Discovery,
				"discovery",
				cancel,
				discovery::fetch(
					self.http_client.as_ref(),
					self.error_mapper.as_ref(),
					&self.config.authority,
					&self.config.discovery,
				),
			)
			.await?;
		let endpoint = Arc::new(TokenEndpointClient::new(
			&document.token_endpoint,
			&self.config.credentials,
			self.config.client_auth_method,
			self.http_client.clone(),
			self.error_mapper.clone(),
			self.strategy.clone(),
		)?);

		*self.endpoint.write() = Some(endpoint.clone());

		Ok(endpoint)
	}

	/// Bounds `fut` by the request timeout and `cancel`, inside a flow span.
	async fn observe<T, F>(
		&self,
		operation: Operation,
		stage: &'static str,
		cancel: &CancellationToken,
		fut: F,
	) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let kind = FlowKind::from(operation);
		let timeout = self.config.renewal.request_timeout;
		let span = FlowSpan::new(kind, stage);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => Err(Error::Cancelled),
					outcome = tokio::time::timeout(timeout.unsigned_abs(), fut) => outcome
						.unwrap_or(Err(Error::Timeout { operation, after: timeout })),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(Error::Cancelled) => {},
			Err(err) => {
				obs::record_flow_outcome(kind, FlowOutcome::Failure);
				tracing::debug!(
					operation = operation.as_str(),
					retryable = err.is_retryable(),
					error = %err,
					"authority call failed"
				);
			},
		}

		result
	}
}
impl<C, M> Debug for TokenAcquirer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenAcquirer")
			.field("authority", &self.config.authority)
			.field("client_id", &self.config.credentials.client_id())
			.field("endpoint_discovered", &self.endpoint.read().is_some())
			.finish()
	}
}
