//! Grant labels, client authentication modes, and provider strategy hooks.
//!
//! `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook the token facade uses
//! to decorate outgoing grants and to map OAuth error payloads into [`ProviderErrorKind`].

pub mod strategy;

pub use strategy::*;

// self
use crate::_prelude::*;

/// OAuth 2.0 grant types issued by the token store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Client Credentials grant used for every login.
	ClientCredentials,
	/// Refresh Token grant used by the renewal loop.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::ClientCredentials => "client_credentials",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How client credentials are presented to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// Form POST body parameters for `client_id`/`client_secret`.
	#[default]
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}
