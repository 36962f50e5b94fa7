//! Client identity presented on every client-credentials login.

// crates.io
use serde::{Deserializer, de::Error as DeError};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Immutable client identity: id, secret, and requested scopes.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	client_id: String,
	client_secret: TokenSecret,
	scope: ScopeSet,
}
impl ClientCredentials {
	/// Validates and wraps the provided client identity.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl AsRef<str>,
		scope: ScopeSet,
	) -> Result<Self, ConfigError> {
		let client_id = client_id.into();
		let client_secret = TokenSecret::new(client_secret);

		if client_id.trim().is_empty() {
			return Err(ConfigError::MissingClientId);
		}
		if client_secret.is_empty() {
			return Err(ConfigError::MissingClientSecret);
		}

		Ok(Self { client_id, client_secret, scope })
	}

	/// OAuth client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// OAuth client secret.
	pub fn client_secret(&self) -> &TokenSecret {
		&self.client_secret
	}

	/// Scopes requested on every login.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("scope", &self.scope)
			.finish()
	}
}
impl<'de> Deserialize<'de> for ClientCredentials {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(rename_all = "snake_case")]
		struct Raw {
			client_id: String,
			client_secret: String,
			#[serde(default)]
			scope: ScopeSet,
		}

		let raw = Raw::deserialize(deserializer)?;

		Self::new(raw.client_id, raw.client_secret, raw.scope).map_err(DeError::custom)
	}
}
