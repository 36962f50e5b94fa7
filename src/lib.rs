//! Service-to-service bearer tokens for internal remoting calls: discover the authority once,
//! log in with the client-credentials grant, cache the token, and renew it in the background
//! before it expires while riding out authority outages with floored, jittered backoff.
//!
//! The entry point is [`store::TokenStore`]. Request-handling code calls
//! [`TokenStore::get_token`](store::TokenStore::get_token) and only ever blocks on the rare
//! cold-start login; every other call is a cache read. The renewal loop runs as a single
//! background task per store and never surfaces its failures to callers, so the last good
//! token keeps being served while the loop retries.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authority;
pub mod backoff;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::OnceCell as AsyncOnceCell;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
