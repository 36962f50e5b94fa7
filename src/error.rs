//! Error taxonomy shared by discovery, token grants, the renewal loop, and the store facade.
//!
//! Every variant is [`Clone`] so a single in-flight login can hand the exact same outcome to
//! all of its waiters. Sources that are not clonable themselves are held behind [`Arc`].

// self
use crate::{_prelude::*, provider::ProviderErrorKind};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;
type JsonPathError = Arc<serde_path_to_error::Error<serde_json::Error>>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// OIDC discovery failed; fails the whole login.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// The client-credentials grant failed.
	#[error("Client login failed: {0}")]
	Grant(#[source] TokenEndpointError),
	/// The refresh-token grant failed.
	#[error("Client token refresh failed: {0}")]
	Refresh(#[source] TokenEndpointError),
	/// A network call did not complete within the configured request timeout.
	#[error("The {operation} call timed out after {after}.")]
	Timeout {
		/// Operation that exceeded its deadline.
		operation: Operation,
		/// Configured deadline.
		after: Duration,
	},
	/// The caller's context or the process shutdown signal fired.
	#[error("The operation was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns `true` when retrying the same request later may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Config(_) | Self::Cancelled => false,
			Self::Timeout { .. } => true,
			Self::Discovery(err) => err.is_retryable(),
			Self::Grant(err) | Self::Refresh(err) => err.is_retryable(),
		}
	}

	/// Returns `true` for [`Error::Cancelled`].
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

/// Network operations issued against the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// `GET {authority}/.well-known/openid-configuration`.
	Discovery,
	/// Client-credentials grant at the token endpoint.
	ClientCredentials,
	/// Refresh-token grant at the token endpoint.
	Refresh,
}
impl Operation {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Discovery => "discovery",
			Self::ClientCredentials => "client_credentials",
			Self::Refresh => "refresh",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised before any network call.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// Authority URL cannot be parsed.
	#[error("Authority URL `{value}` is invalid.")]
	InvalidAuthority {
		/// Raw value that failed to parse.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Authority must use HTTPS under the active discovery policy.
	#[error("Authority must use HTTPS: {url}.")]
	InsecureAuthority {
		/// Offending authority URL.
		url: String,
	},
	/// Client identifier is empty.
	#[error("Client identifier must not be empty.")]
	MissingClientId,
	/// Client secret is empty.
	#[error("Client secret must not be empty.")]
	MissingClientSecret,
	/// Scope values cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Discovered token endpoint cannot be turned into an `oauth2` token URL.
	#[error("Token endpoint `{url}` is invalid.")]
	InvalidTokenEndpoint {
		/// Offending endpoint.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// A timing setting is out of range.
	#[error("Setting `{setting}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		setting: &'static str,
		/// Constraint that was violated.
		reason: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// OIDC discovery failures.
#[derive(Clone, Debug, ThisError)]
pub enum DiscoveryError {
	/// The discovery document could not be fetched.
	#[error("Failed to get discovery document from {authority}.")]
	Transport {
		/// Authority that was queried.
		authority: String,
		/// Transport failure.
		#[source]
		source: TransportError,
	},
	/// The discovery endpoint answered with a non-success status.
	#[error("Failed to get discovery document from {authority}: HTTP {status}.")]
	Status {
		/// Authority that was queried.
		authority: String,
		/// HTTP status code.
		status: u16,
		/// Bounded preview of the response body.
		body_preview: String,
	},
	/// The discovery document is not valid JSON for the expected shape.
	#[error("Discovery document from {authority} is malformed.")]
	Malformed {
		/// Authority that was queried.
		authority: String,
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
	},
	/// The document advertises no usable token endpoint.
	#[error("Discovery document from {authority} has no token_endpoint.")]
	MissingTokenEndpoint {
		/// Authority that was queried.
		authority: String,
	},
	/// An advertised endpoint is not an absolute URL.
	#[error("Discovery document advertises an invalid {endpoint}: {value}.")]
	InvalidEndpoint {
		/// Endpoint field name.
		endpoint: &'static str,
		/// Raw value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An advertised endpoint does not use HTTPS.
	#[error("Discovery document advertises an insecure {endpoint}: {url}.")]
	InsecureEndpoint {
		/// Endpoint field name.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// An advertised endpoint lives outside the authority.
	#[error("Discovery document advertises a {endpoint} outside the authority: {url}.")]
	EndpointOutsideAuthority {
		/// Endpoint field name.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// The `issuer` field does not name the configured authority.
	#[error("Discovery issuer `{actual}` does not match authority `{expected}`.")]
	IssuerMismatch {
		/// Configured authority.
		expected: String,
		/// Advertised issuer.
		actual: String,
	},
}
impl DiscoveryError {
	/// Returns `true` when the failure is likely temporary.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport { .. } => true,
			Self::Status { status, .. } => *status == 429 || *status >= 500,
			_ => false,
		}
	}
}

/// Token endpoint failures shared by the client-credentials and refresh grants.
#[derive(Clone, Debug, ThisError)]
pub enum TokenEndpointError {
	/// The endpoint returned an OAuth error payload.
	#[error("{error}{}", parenthesized(.description))]
	Rejected {
		/// Classification chosen by the provider strategy.
		kind: ProviderErrorKind,
		/// OAuth `error` field.
		error: String,
		/// OAuth `error_description` field, when provided.
		description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The endpoint returned an unexpected but non-OAuth response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Transport failure while calling the endpoint.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Response carried `expires_in = 0`.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Response carried an `expires_in` that does not fit the clock.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl TokenEndpointError {
	/// Returns `true` when the failure is likely temporary.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Rejected { kind, .. } => matches!(kind, ProviderErrorKind::Transient),
			Self::UnexpectedResponse { .. } | Self::Transport(_) => true,
			Self::ResponseParse { status, .. } => status.is_some_and(|code| code >= 500),
			Self::MissingExpiresIn | Self::NonPositiveExpiresIn | Self::ExpiresInOutOfRange =>
				false,
		}
	}

	/// HTTP status attached to the failure, if one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::UnexpectedResponse { status, .. }
			| Self::ResponseParse { status, .. } => *status,
			_ => None,
		}
	}
}

fn parenthesized(description: &Option<String>) -> String {
	description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the authority.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the authority.")]
	Io {
		/// IO failure.
		#[source]
		source: Arc<std::io::Error>,
	},
	/// The HTTP client reported a failure without a typed source.
	#[error("HTTP client error occurred while calling the authority: {message}.")]
	Other {
		/// Client-provided message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
