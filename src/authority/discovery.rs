//! OIDC discovery: fetch `/.well-known/openid-configuration` and validate what it advertises.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{Method, Request, header::ACCEPT},
};
// self
use crate::{
	_prelude::*,
	authority::{Authority, DiscoveryPolicy},
	error::{ConfigError, DiscoveryError},
	http::{ResponseMetadataSlot, TokenHttpClient},
	oauth::TransportErrorMapper,
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// The subset of the discovery document the token store relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryDocument {
	/// Advertised issuer, when present.
	pub issuer: Option<String>,
	/// Validated token endpoint.
	pub token_endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
	#[serde(default)]
	issuer: Option<String>,
	#[serde(default)]
	token_endpoint: Option<String>,
}

/// Boxed discovery future; `Send` so the renewal loop can run on any worker.
pub(crate) type DiscoveryFuture<'a> =
	Pin<Box<dyn Future<Output = Result<DiscoveryDocument>> + 'a + Send>>;

/// Fetches and validates the discovery document for `authority`.
pub(crate) fn fetch<'a, C, M>(
	http_client: &'a C,
	error_mapper: &'a M,
	authority: &'a Authority,
	policy: &'a DiscoveryPolicy,
) -> DiscoveryFuture<'a>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	Box::pin(async move {
		let request = Request::builder()
			.method(Method::GET)
			.uri(authority.discovery_url().as_str())
			.header(ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(ConfigError::from)?;
		let slot = ResponseMetadataSlot::default();
		let handle = http_client.with_metadata(slot.clone());
		let response = handle.call(request).await.map_err(|err| DiscoveryError::Transport {
			authority: authority.to_string(),
			source: error_mapper.map_transport_error(slot.take().as_ref(), err),
		})?;
		let status = response.status();

		if !status.is_success() {
			return Err(DiscoveryError::Status {
				authority: authority.to_string(),
				status: status.as_u16(),
				body_preview: preview(response.body()),
			}
			.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let raw: RawDocument =
			serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
				DiscoveryError::Malformed { authority: authority.to_string(), source: Arc::new(err) }
			})?;

		validate(raw, authority, policy).map_err(Error::from)
	})
}

fn validate(
	raw: RawDocument,
	authority: &Authority,
	policy: &DiscoveryPolicy,
) -> Result<DiscoveryDocument, DiscoveryError> {
	if policy.validate_issuer {
		let issuer = raw.issuer.as_deref().unwrap_or_default();

		if !authority.matches_issuer(issuer) {
			return Err(DiscoveryError::IssuerMismatch {
				expected: authority.to_string(),
				actual: issuer.to_owned(),
			});
		}
	}

	let value = raw
		.token_endpoint
		.filter(|value| !value.trim().is_empty())
		.ok_or_else(|| DiscoveryError::MissingTokenEndpoint { authority: authority.to_string() })?;
	let token_endpoint = Url::parse(&value).map_err(|source| DiscoveryError::InvalidEndpoint {
		endpoint: "token_endpoint",
		value: value.clone(),
		source,
	})?;

	if !policy.accepts_scheme(&token_endpoint) {
		return Err(DiscoveryError::InsecureEndpoint {
			endpoint: "token_endpoint",
			url: token_endpoint.to_string(),
		});
	}
	if policy.validate_endpoints && !authority.contains(&token_endpoint) {
		return Err(DiscoveryError::EndpointOutsideAuthority {
			endpoint: "token_endpoint",
			url: token_endpoint.to_string(),
		});
	}

	Ok(DiscoveryDocument { issuer: raw.issuer, token_endpoint })
}

fn preview(body: &[u8]) -> String {
	String::from_utf8_lossy(body).chars().take(BODY_PREVIEW_LIMIT).collect()
}
