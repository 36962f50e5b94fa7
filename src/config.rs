//! Token store configuration and its validating builder.

// self
use crate::{
	_prelude::*,
	auth::ClientCredentials,
	authority::{Authority, DiscoveryPolicy},
	backoff::BackoffPolicy,
	error::ConfigError,
	provider::ClientAuthMethod,
};

/// Timings of the renewal loop and of each network call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalSettings {
	/// Subtracted from a token's lifetime to schedule its renewal.
	pub refresh_offset: Duration,
	/// Pause after a failed refresh before the fallback login's backoff starts.
	pub failure_pause: Duration,
	/// Upper bound for a single discovery or token request.
	pub request_timeout: Duration,
}
impl Default for RenewalSettings {
	fn default() -> Self {
		Self {
			refresh_offset: Duration::seconds(60),
			failure_pause: Duration::seconds(5),
			request_timeout: Duration::seconds(100),
		}
	}
}
impl RenewalSettings {
	fn validate(&self) -> Result<(), ConfigError> {
		if self.refresh_offset.is_negative() {
			return Err(ConfigError::InvalidSetting {
				setting: "refresh_offset",
				reason: "must not be negative",
			});
		}
		if self.failure_pause.is_negative() {
			return Err(ConfigError::InvalidSetting {
				setting: "failure_pause",
				reason: "must not be negative",
			});
		}
		if !self.request_timeout.is_positive() {
			return Err(ConfigError::InvalidSetting {
				setting: "request_timeout",
				reason: "must be positive",
			});
		}

		Ok(())
	}
}

/// Validated configuration for a [`TokenStore`](crate::store::TokenStore).
#[derive(Clone, Debug)]
pub struct RemotingConfig {
	/// Authority (OIDC issuer) to discover and log in against.
	pub authority: Authority,
	/// Client identity and scopes.
	pub credentials: ClientCredentials,
	/// How the client secret reaches the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Discovery validation rules.
	pub discovery: DiscoveryPolicy,
	/// Renewal loop timings.
	pub renewal: RenewalSettings,
	/// Backoff applied before each fallback login.
	pub backoff: BackoffPolicy,
	/// Base seed for jitter; chain `n` uses `seed + n`.
	pub jitter_seed: Option<u64>,
}
impl RemotingConfig {
	/// Starts a builder for `authority` and `credentials`.
	pub fn builder(
		authority: impl Into<String>,
		credentials: ClientCredentials,
	) -> RemotingConfigBuilder {
		RemotingConfigBuilder {
			authority: authority.into(),
			credentials,
			client_auth_method: ClientAuthMethod::default(),
			discovery: DiscoveryPolicy::default(),
			renewal: RenewalSettings::default(),
			backoff: BackoffPolicy::default(),
			jitter_seed: None,
		}
	}

	/// Seed for the jitter source of retry chain `chain`.
	pub(crate) fn chain_seed(&self, chain: u64) -> Option<u64> {
		self.jitter_seed.map(|seed| seed.wrapping_add(chain))
	}
}

/// Builder for [`RemotingConfig`].
#[derive(Clone, Debug)]
pub struct RemotingConfigBuilder {
	authority: String,
	credentials: ClientCredentials,
	client_auth_method: ClientAuthMethod,
	discovery: DiscoveryPolicy,
	renewal: RenewalSettings,
	backoff: BackoffPolicy,
	jitter_seed: Option<u64>,
}
impl RemotingConfigBuilder {
	/// Selects the client authentication method (defaults to `client_secret_post`).
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Replaces the discovery policy.
	pub fn discovery_policy(mut self, policy: DiscoveryPolicy) -> Self {
		self.discovery = policy;

		self
	}

	/// Replaces every renewal timing at once.
	pub fn renewal(mut self, settings: RenewalSettings) -> Self {
		self.renewal = settings;

		self
	}

	/// Overrides the renewal offset (defaults to 60 seconds).
	pub fn refresh_offset(mut self, offset: Duration) -> Self {
		self.renewal.refresh_offset = offset;

		self
	}

	/// Overrides the pause after a failed refresh (defaults to 5 seconds).
	pub fn failure_pause(mut self, pause: Duration) -> Self {
		self.renewal.failure_pause = pause;

		self
	}

	/// Overrides the per-request timeout (defaults to 100 seconds).
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.renewal.request_timeout = timeout;

		self
	}

	/// Replaces the backoff policy.
	pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
		self.backoff = policy;

		self
	}

	/// Makes jitter reproducible.
	pub fn jitter_seed(mut self, seed: u64) -> Self {
		self.jitter_seed = Some(seed);

		self
	}

	/// Validates the configuration.
	pub fn build(self) -> Result<RemotingConfig, ConfigError> {
		let authority = Authority::parse(&self.authority, &self.discovery)?;

		self.renewal.validate()?;

		if self.backoff.floor.is_negative() {
			return Err(ConfigError::InvalidSetting {
				setting: "backoff.floor",
				reason: "must not be negative",
			});
		}

		Ok(RemotingConfig {
			authority,
			credentials: self.credentials,
			client_auth_method: self.client_auth_method,
			discovery: self.discovery,
			renewal: self.renewal,
			backoff: self.backoff,
			jitter_seed: self.jitter_seed,
		})
	}
}
