//! Authority URL handling and the OIDC discovery policy.

pub mod discovery;

pub use discovery::*;

// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{_prelude::*, error::ConfigError};

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Rules applied to the authority URL and the discovery document it serves.
///
/// Every rule is enabled by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DiscoveryPolicy {
	/// Require `https` for the authority and every advertised endpoint.
	pub require_https: bool,
	/// Exempt `localhost` and loopback IPs from [`require_https`](Self::require_https).
	pub allow_loopback_http: bool,
	/// Require the document's `issuer` to name the authority.
	pub validate_issuer: bool,
	/// Require advertised endpoints to live under the authority.
	pub validate_endpoints: bool,
}
impl Default for DiscoveryPolicy {
	fn default() -> Self {
		Self {
			require_https: true,
			allow_loopback_http: true,
			validate_issuer: true,
			validate_endpoints: true,
		}
	}
}
impl DiscoveryPolicy {
	/// Policy with every check disabled.
	pub fn permissive() -> Self {
		Self {
			require_https: false,
			allow_loopback_http: true,
			validate_issuer: false,
			validate_endpoints: false,
		}
	}

	pub(crate) fn accepts_scheme(&self, url: &Url) -> bool {
		!self.require_https
			|| url.scheme() == "https"
			|| (self.allow_loopback_http && url.scheme() == "http" && is_loopback(url))
	}
}

/// Validated authority (OIDC issuer) URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Authority(Url);
impl Authority {
	/// Parses `value` and checks it against `policy`.
	pub fn parse(value: &str, policy: &DiscoveryPolicy) -> Result<Self, ConfigError> {
		let url = Url::parse(value)
			.map_err(|source| ConfigError::InvalidAuthority { value: value.to_owned(), source })?;

		Self::new(url, policy)
	}

	/// Wraps an already parsed URL, checking it against `policy`.
	pub fn new(mut url: Url, policy: &DiscoveryPolicy) -> Result<Self, ConfigError> {
		if url.cannot_be_a_base() || url.host().is_none() {
			return Err(ConfigError::InvalidAuthority {
				value: url.to_string(),
				source: url::ParseError::EmptyHost,
			});
		}
		if !policy.accepts_scheme(&url) {
			return Err(ConfigError::InsecureAuthority { url: url.to_string() });
		}

		url.set_query(None);
		url.set_fragment(None);

		if !url.path().ends_with('/') {
			let path = format!("{}/", url.path());

			url.set_path(&path);
		}

		Ok(Self(url))
	}

	/// Authority URL, always ending with `/`.
	pub fn url(&self) -> &Url {
		&self.0
	}

	/// `{authority}/.well-known/openid-configuration`.
	pub fn discovery_url(&self) -> Url {
		let mut url = self.0.clone();
		let path = format!("{}{DISCOVERY_PATH}", self.0.path());

		url.set_path(&path);

		url
	}

	/// Returns `true` when `endpoint` shares the authority's origin and lives under its path.
	pub fn contains(&self, endpoint: &Url) -> bool {
		endpoint.origin() == self.0.origin() && endpoint.path().starts_with(self.0.path())
	}

	/// Compares an advertised issuer with the authority, ignoring a trailing slash.
	pub fn matches_issuer(&self, issuer: &str) -> bool {
		issuer.trim_end_matches('/') == self.0.as_str().trim_end_matches('/')
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.0.as_str().trim_end_matches('/'))
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}
