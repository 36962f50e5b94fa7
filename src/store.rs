//! The public token store: cached reads, single-flight cold start, and the renewal handle.

pub mod cache;

pub use cache::TokenCache;

// crates.io
use tokio::{sync::watch, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	auth::{Token, TokenSecret},
	config::RemotingConfig,
	flows::{RenewalMetrics, RenewalStatus, TokenAcquirer, TokenRenewer},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	provider::{DefaultProviderStrategy, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Boxed future returned by [`RemotingTokenSource`].
pub type TokenFuture<'a, T = TokenSecret> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Source of bearer tokens for outgoing remoting calls.
///
/// HTTP authenticators depend on this trait rather than on a concrete store.
pub trait RemotingTokenSource
where
	Self: Send + Sync,
{
	/// Returns a valid access token, logging in first if none is cached.
	fn token<'a>(&'a self, cancel: &'a CancellationToken) -> TokenFuture<'a>;

	/// Returns the `Authorization` header value, `Bearer <token>`.
	fn authorization<'a>(&'a self, cancel: &'a CancellationToken) -> TokenFuture<'a, String> {
		Box::pin(async move {
			let token = self.token(cancel).await?;

			Ok(format!("Bearer {}", token.expose()))
		})
	}
}

/// Store specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenStore = TokenStore<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Caches one service token and keeps it fresh in the background.
///
/// Cloning is cheap; clones share the cache and the renewal loop. Dropping the last clone
/// cancels the loop.
pub struct TokenStore<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	inner: Arc<Inner<C, M>>,
}
impl<C, M> TokenStore<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a store over a caller-provided transport and mapper.
	///
	/// `shutdown` is the process-wide shutdown signal. Once it fires the renewal loop stops
	/// for good and cold starts fail with [`Error::Cancelled`].
	pub fn with_http_client(
		config: RemotingConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
		shutdown: CancellationToken,
	) -> Self {
		Self::with_strategy(
			config,
			http_client,
			error_mapper,
			Arc::new(DefaultProviderStrategy),
			shutdown,
		)
	}

	/// Like [`with_http_client`](Self::with_http_client) with a custom provider strategy.
	pub fn with_strategy(
		config: RemotingConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
		strategy: Arc<dyn ProviderStrategy>,
		shutdown: CancellationToken,
	) -> Self {
		let acquirer =
			TokenAcquirer::new(Arc::new(config), http_client, error_mapper, strategy);
		let (status, _) = watch::channel(RenewalStatus::Idle);

		Self {
			inner: Arc::new(Inner {
				acquirer: Arc::new(acquirer),
				cache: Default::default(),
				flight: Mutex::new(None),
				renewal: Mutex::new(RenewalSlot::default()),
				status: Arc::new(status),
				metrics: Default::default(),
				shutdown,
			}),
		}
	}

	/// Returns the cached access token, or performs the single-flight cold-start login.
	///
	/// Concurrent callers that find the cache empty share one login and all receive its
	/// outcome. Cancelling `cancel` only abandons this caller's wait; the shared login keeps
	/// running for the others.
	pub async fn get_token(&self, cancel: &CancellationToken) -> Result<TokenSecret> {
		if let Some(token) = self.inner.cache.get() {
			return Ok(token.access_token.clone());
		}

		let flight = {
			let mut slot = self.inner.flight.lock();

			if let Some(token) = self.inner.cache.get() {
				return Ok(token.access_token.clone());
			}
			if self.inner.shutdown.is_cancelled() {
				return Err(Error::Cancelled);
			}

			match slot.as_ref() {
				Some(flight) => {
					tracing::debug!("joining in-flight login");

					flight.clone()
				},
				None => {
					let flight = Arc::new(Flight {
						outcome: AsyncOnceCell::new(),
						cancel: self.inner.shutdown.child_token(),
						epoch: self.inner.renewal.lock().epoch,
					});

					*slot = Some(flight.clone());
					tokio::spawn(cold_start(self.inner.clone(), flight.clone()));

					flight
				},
			}
		};

		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			outcome = flight.outcome.wait() => outcome.clone().map(|token| token.access_token.clone()),
		}
	}

	/// Stops the renewal loop, waits for it to exit, and empties the cache.
	///
	/// A cold-start login still in flight is cancelled and its waiters receive
	/// [`Error::Cancelled`]. A later [`get_token`](Self::get_token) logs in again.
	pub async fn stop(&self) {
		let (flight, previous) = {
			let mut slot = self.inner.flight.lock();
			let mut renewal = self.inner.renewal.lock();

			renewal.epoch += 1;
			self.inner.cache.clear();

			(slot.take(), renewal.handle.take())
		};

		if let Some(flight) = flight {
			flight.cancel.cancel();
			flight.outcome.wait().await;
		}
		if let Some(handle) = previous {
			handle.cancel.cancel();
			handle.join().await;
		}

		self.inner.status.send_replace(RenewalStatus::Stopped);
		tracing::info!("token store stopped");
	}

	/// Currently cached token, without triggering a login.
	pub fn cached_token(&self) -> Option<Arc<Token>> {
		self.inner.cache.get()
	}

	/// Receiver for the renewal loop's state.
	pub fn renewal_status(&self) -> watch::Receiver<RenewalStatus> {
		self.inner.status.subscribe()
	}

	/// Renewal counters.
	pub fn metrics(&self) -> &RenewalMetrics {
		&self.inner.metrics
	}
}
#[cfg(feature = "reqwest")]
impl TokenStore<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a store with its own reqwest transport.
	pub fn new(config: RemotingConfig, shutdown: CancellationToken) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			config,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
			shutdown,
		))
	}
}
impl<C, M> Clone for TokenStore<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C, M> Debug for TokenStore<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("acquirer", &self.inner.acquirer)
			.field("cached", &!self.inner.cache.is_empty())
			.field("status", &*self.inner.status.borrow())
			.finish()
	}
}
impl<C, M> RemotingTokenSource for TokenStore<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn token<'a>(&'a self, cancel: &'a CancellationToken) -> TokenFuture<'a> {
		Box::pin(self.get_token(cancel))
	}
}

struct Inner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	acquirer: Arc<TokenAcquirer<C, M>>,
	cache: Arc<TokenCache>,
	flight: Mutex<Option<Arc<Flight>>>,
	renewal: Mutex<RenewalSlot>,
	status: Arc<watch::Sender<RenewalStatus>>,
	metrics: Arc<RenewalMetrics>,
	shutdown: CancellationToken,
}
impl<C, M> Inner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Installs `token` and replaces the renewal loop.
	///
	/// The previous loop is cancelled before the new one is spawned; its handle is returned so
	/// the caller can await it without holding the lock. Fails with [`Error::Cancelled`] when
	/// [`TokenStore::stop`] ran after the login started at `epoch`.
	fn start_renewal(&self, token: Arc<Token>, epoch: u64) -> Result<Option<RenewalHandle>> {
		let mut renewal = self.renewal.lock();

		if renewal.epoch != epoch {
			return Err(Error::Cancelled);
		}

		let previous = renewal.handle.take();

		if let Some(previous) = &previous {
			previous.cancel.cancel();
		}

		let generation = self.cache.install(token.clone());
		let cancel = self.shutdown.child_token();
		let task = TokenRenewer::new(
			self.acquirer.clone(),
			self.cache.clone(),
			self.status.clone(),
			self.metrics.clone(),
			generation,
			cancel.clone(),
		)
		.spawn(token);

		renewal.handle = Some(RenewalHandle { generation, cancel, task });

		Ok(previous)
	}
}
impl<C, M> Drop for Inner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn drop(&mut self) {
		if let Some(handle) = self.renewal.get_mut().handle.take() {
			handle.cancel.cancel();
		}
	}
}

/// One shared cold-start login.
struct Flight {
	outcome: AsyncOnceCell<Result<Arc<Token>>>,
	cancel: CancellationToken,
	/// Stop epoch observed when the flight began.
	epoch: u64,
}

#[derive(Default)]
struct RenewalSlot {
	/// Bumped by every [`TokenStore::stop`].
	epoch: u64,
	handle: Option<RenewalHandle>,
}

struct RenewalHandle {
	generation: u64,
	cancel: CancellationToken,
	task: JoinHandle<()>,
}
impl RenewalHandle {
	async fn join(self) {
		if let Err(err) = self.task.await {
			tracing::warn!(generation = self.generation, error = %err, "renewal task ended abnormally");
		}
	}
}

async fn cold_start<C, M>(inner: Arc<Inner<C, M>>, flight: Arc<Flight>)
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let installed =
		inner.acquirer.login(0, &flight.cancel).await.map(Arc::new).and_then(|token| {
			inner.start_renewal(token.clone(), flight.epoch).map(|previous| (token, previous))
		});
	let (outcome, previous) = match installed {
		Ok((token, previous)) => (Ok(token), previous),
		Err(err) => {
			if !err.is_cancelled() {
				tracing::error!(error = %err, retryable = err.is_retryable(), "client login failed");
			}

			(Err(err), None)
		},
	};

	// Waiters must see the outcome before the slot opens for a new flight.
	if let Err(unset) = flight.outcome.set(outcome).await {
		tracing::debug!(outcome_ok = unset.is_ok(), "cold-start outcome was already published");
	}

	{
		let mut slot = inner.flight.lock();

		if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &flight)) {
			*slot = None;
		}
	}

	if let Some(previous) = previous {
		previous.join().await;
	}
}
