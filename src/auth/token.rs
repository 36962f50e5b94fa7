//! The cached token value and its builder.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Errors produced by [`TokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenBuildError {
	/// No (or an empty) access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// No lifetime was configured.
	#[error("Token lifetime must be supplied via expires_in.")]
	MissingLifetime,
}

/// Immutable token issued by the authority.
///
/// The cache replaces the whole value on every login or refresh; a token is never updated in
/// place.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the authority issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime reported by the authority (`expires_in`).
	pub expires_in: Duration,
	/// Instant the token response was received.
	pub acquired_at: OffsetDateTime,
}
impl Token {
	/// Returns a builder.
	pub fn builder() -> TokenBuilder {
		TokenBuilder::default()
	}

	/// Absolute expiry derived from `acquired_at + expires_in`.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.acquired_at + self.expires_in
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at()
	}

	/// Returns `true` if the token is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Time to sleep before renewing: the lifetime minus `refresh_offset`, floored at zero.
	pub fn renew_after(&self, refresh_offset: Duration) -> std::time::Duration {
		let wait = self.expires_in - refresh_offset;

		if wait.is_positive() { wait.unsigned_abs() } else { std::time::Duration::ZERO }
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("acquired_at", &self.acquired_at)
			.finish()
	}
}

/// Builder for [`Token`].
#[derive(Clone, Debug, Default)]
pub struct TokenBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	expires_in: Option<Duration>,
	acquired_at: Option<OffsetDateTime>,
}
impl TokenBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl AsRef<str>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl AsRef<str>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an already wrapped refresh token, if any.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Sets the lifetime reported by the authority.
	pub fn expires_in(mut self, lifetime: Duration) -> Self {
		self.expires_in = Some(lifetime);

		self
	}

	/// Sets the acquisition instant (defaults to now).
	pub fn acquired_at(mut self, instant: OffsetDateTime) -> Self {
		self.acquired_at = Some(instant);

		self
	}

	/// Consumes the builder and produces a [`Token`].
	pub fn build(self) -> Result<Token, TokenBuildError> {
		let access_token = self
			.access_token
			.filter(|secret| !secret.is_empty())
			.ok_or(TokenBuildError::MissingAccessToken)?;
		let expires_in = self.expires_in.ok_or(TokenBuildError::MissingLifetime)?;

		Ok(Token {
			access_token,
			refresh_token: self.refresh_token.filter(|secret| !secret.is_empty()),
			expires_in,
			acquired_at: self.acquired_at.unwrap_or_else(OffsetDateTime::now_utc),
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn token(expires_in: Duration) -> Token {
		Token::builder()
			.access_token("access")
			.refresh_token("refresh")
			.expires_in(expires_in)
			.acquired_at(macros::datetime!(2025-01-01 00:00 UTC))
			.build()
			.expect("Token fixture should build.")
	}

	#[test]
	fn expiry_is_derived_from_lifetime() {
		let token = token(Duration::hours(1));

		assert_eq!(token.expires_at(), macros::datetime!(2025-01-01 01:00 UTC));
		assert!(!token.is_expired_at(macros::datetime!(2025-01-01 00:59 UTC)));
		assert!(token.is_expired_at(macros::datetime!(2025-01-01 01:00 UTC)));
	}

	#[test]
	fn renew_after_subtracts_the_offset_and_floors_at_zero() {
		let offset = Duration::seconds(60);

		assert_eq!(
			token(Duration::seconds(3600)).renew_after(offset),
			std::time::Duration::from_secs(3540)
		);
		assert_eq!(
			token(Duration::seconds(1800)).renew_after(offset),
			std::time::Duration::from_secs(1740)
		);
		assert_eq!(token(Duration::seconds(30)).renew_after(offset), std::time::Duration::ZERO);
		assert_eq!(token(Duration::seconds(60)).renew_after(offset), std::time::Duration::ZERO);
	}

	#[test]
	fn builder_rejects_empty_access_token_and_drops_empty_refresh() {
		let err = Token::builder()
			.access_token("")
			.expires_in(Duration::minutes(5))
			.build()
			.expect_err("Empty access tokens must be rejected.");

		assert_eq!(err, TokenBuildError::MissingAccessToken);
		assert_eq!(
			Token::builder().access_token("a").build(),
			Err(TokenBuildError::MissingLifetime)
		);

		let token = Token::builder()
			.access_token("a")
			.refresh_token("")
			.expires_in(Duration::minutes(5))
			.build()
			.expect("Tokens with an empty refresh value should build.");

		assert!(token.refresh_token.is_none());
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let rendered = format!("{:?}", token(Duration::minutes(1)));

		assert!(!rendered.contains("access\""));
		assert!(rendered.contains("<redacted>"));
	}
}
