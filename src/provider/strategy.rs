//! Provider strategy hooks that customize token grants.

// self
use crate::{_prelude::*, provider::GrantType};

/// Strategy hook that lets an authority dialect decorate grants and classify errors.
///
/// `augment_token_request` has a default no-op implementation; override it when the
/// authority wants extra form fields (`audience`, `resource`, ...).
pub trait ProviderStrategy: Send + Sync {
	/// Maps an OAuth error payload into the crate taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds custom form parameters before a grant is dispatched.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Grant rejected (bad or expired refresh token, access denied).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes are not allowed for this client.
	InsufficientScope,
	/// Failure is temporary.
	Transient,
}

/// Primitive data describing a failed token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the authority, when available.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Creates an empty context for the provided grant.
	pub fn new(grant_type: GrantType) -> Self {
		Self { grant_type, http_status: None, oauth_error: None, error_description: None }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// RFC 6749 §5.2 classification: `error` first, then `error_description`, then HTTP status.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(match_error_code)
			.or_else(|| ctx.error_description.as_deref().and_then(match_description))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn match_error_code(value: &str) -> Option<ProviderErrorKind> {
	let kind = match value.to_ascii_lowercase().as_str() {
		"invalid_grant" | "access_denied" => ProviderErrorKind::InvalidGrant,
		"invalid_client" | "unauthorized_client" => ProviderErrorKind::InvalidClient,
		"invalid_scope" | "insufficient_scope" => ProviderErrorKind::InsufficientScope,
		"temporarily_unavailable" | "server_error" | "slow_down" => ProviderErrorKind::Transient,
		_ => return None,
	};

	Some(kind)
}

fn match_description(description: &str) -> Option<ProviderErrorKind> {
	let lowered = description.to_ascii_lowercase();

	["invalid_grant", "invalid_client", "insufficient_scope", "invalid_scope", "temporarily_unavailable"]
		.into_iter()
		.find(|code| lowered.contains(code))
		.and_then(match_error_code)
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}
