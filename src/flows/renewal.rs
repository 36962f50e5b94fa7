//! Background renewal state machine.
//!
//! ```text
//! Scheduled --wake--> Refreshing --ok--> Scheduled
//!                         |
//!                        err --pause--> Recovering --backoff, login ok--> Scheduled
//!                                            ^           |
//!                                            +--login err+
//! ```
//!
//! Any state moves to `Stopped` when the loop's cancellation token fires or when a newer loop
//! has taken over the cache.

// crates.io
use tokio::{sync::watch, task::JoinHandle};
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	auth::Token,
	backoff::BackoffState,
	config::RemotingConfig,
	flows::{RenewalMetrics, TokenAcquirer},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	store::TokenCache,
};

/// Observable state of the renewal loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenewalStatus {
	/// No loop has been started yet.
	#[default]
	Idle,
	/// Sleeping until the next renewal.
	Scheduled {
		/// Time until the loop wakes.
		wake_in: std::time::Duration,
		/// Failed attempts since the last success.
		retry_count: u32,
	},
	/// A refresh (or re-grant) request is in flight.
	Refreshing {
		/// Failed attempts since the last success.
		retry_count: u32,
	},
	/// Waiting out a backoff delay before a fallback login.
	Recovering {
		/// Retry number of the pending login.
		retry_count: u32,
		/// Backoff delay being waited out.
		delay: std::time::Duration,
	},
	/// The loop has exited.
	Stopped,
}

/// One renewal loop bound to a cache generation.
pub struct TokenRenewer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	acquirer: Arc<TokenAcquirer<C, M>>,
	cache: Arc<TokenCache>,
	status: Arc<watch::Sender<RenewalStatus>>,
	metrics: Arc<RenewalMetrics>,
	backoff: BackoffState,
	generation: u64,
	cancel: CancellationToken,
}
impl<C, M> TokenRenewer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(
		acquirer: Arc<TokenAcquirer<C, M>>,
		cache: Arc<TokenCache>,
		status: Arc<watch::Sender<RenewalStatus>>,
		metrics: Arc<RenewalMetrics>,
		generation: u64,
		cancel: CancellationToken,
	) -> Self {
		let seed = acquirer.config().chain_seed(generation);

		Self {
			acquirer,
			cache,
			status,
			metrics,
			backoff: BackoffState::new(seed),
			generation,
			cancel,
		}
	}

	fn config(&self) -> &RemotingConfig {
		self.acquirer.config()
	}

	/// Spawns the loop on the current runtime, starting from `token`.
	pub(crate) fn spawn(self, token: Arc<Token>) -> JoinHandle<()> {
		let span = tracing::info_span!("remoting_token.renewal", generation = self.generation);

		tokio::spawn(self.run(token).instrument(span))
	}

	async fn run(mut self, mut token: Arc<Token>) {
		loop {
			let wake_in = token.renew_after(self.config().renewal.refresh_offset);

			tracing::info!(wake_in_secs = wake_in.as_secs(), "renewal scheduled");
			self.publish(RenewalStatus::Scheduled {
				wake_in,
				retry_count: self.backoff.retry_count(),
			});

			if !self.sleep(wake_in).await {
				break;
			}

			self.publish(RenewalStatus::Refreshing { retry_count: self.backoff.retry_count() });
			self.metrics.record_attempt();

			let next = match self.acquirer.refresh(&token, &self.cancel).await {
				Ok(next) => {
					self.metrics.record_success();
					self.backoff.reset();

					Arc::new(next)
				},
				Err(Error::Cancelled) => break,
				Err(err) => {
					self.metrics.record_failure();
					tracing::error!(
						error = %err,
						retryable = err.is_retryable(),
						"client token refresh failed"
					);

					if !self.sleep(self.config().renewal.failure_pause.unsigned_abs()).await {
						break;
					}

					match self.recover().await {
						Some(next) => next,
						None => break,
					}
				},
			};

			if !self.cache.replace(self.generation, next.clone()) {
				tracing::debug!("renewal loop superseded");

				break;
			}

			token = next;
		}

		tracing::info!("renewal stopped");
		self.publish(RenewalStatus::Stopped);
	}

	/// Backoff-guarded logins until one succeeds; `None` once cancelled.
	async fn recover(&mut self) -> Option<Arc<Token>> {
		loop {
			let policy = self.config().backoff;
			let retry_count = self.backoff.record_failure();
			let delay = self.backoff.next_delay(&policy);

			tracing::error!(
				retry_count,
				delay_secs = delay.as_secs_f64(),
				"[#{retry_count}] failed to log in, retrying in {:.0} seconds",
				delay.as_secs_f64()
			);
			self.publish(RenewalStatus::Recovering { retry_count, delay });

			if !self.sleep(delay).await {
				return None;
			}

			self.metrics.record_fallback_login();

			match self.acquirer.login(retry_count, &self.cancel).await {
				Ok(token) => {
					self.backoff.reset();

					return Some(Arc::new(token));
				},
				Err(Error::Cancelled) => return None,
				Err(err) => tracing::warn!(
					retry_count,
					error = %err,
					retryable = err.is_retryable(),
					"fallback login failed"
				),
			}
		}
	}

	/// Sleeps unless cancelled first; returns `false` on cancellation.
	async fn sleep(&self, duration: std::time::Duration) -> bool {
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => false,
			_ = tokio::time::sleep(duration) => true,
		}
	}

	fn publish(&self, status: RenewalStatus) {
		let cache = &self.cache;
		let generation = self.generation;

		self.status.send_if_modified(|current| {
			if !cache.is_current(generation) {
				return false;
			}

			*current = status;

			true
		});
	}
}
impl<C, M> Debug for TokenRenewer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRenewer")
			.field("generation", &self.generation)
			.field("retry_count", &self.backoff.retry_count())
			.finish()
	}
}
