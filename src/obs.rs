//! Flow spans and counters shared by discovery, login, and renewal.
//!
//! Every network operation runs inside a `remoting_token.flow` span carrying `flow` and
//! `stage` fields. With the `metrics` feature the `remoting_token_flow_total` counter is
//! incremented for each attempt, success, and failure, labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::{_prelude::*, error::Operation};

/// Network operations observed by the token store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// OIDC discovery request.
	Discovery,
	/// Client-credentials login.
	ClientCredentials,
	/// Refresh-token grant.
	Refresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Discovery => "discovery",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::Refresh => "refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl From<Operation> for FlowKind {
	fn from(operation: Operation) -> Self {
		match operation {
			Operation::Discovery => FlowKind::Discovery,
			Operation::ClientCredentials => FlowKind::ClientCredentials,
			Operation::Refresh => FlowKind::Refresh,
		}
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// A call was issued.
	Attempt,
	/// The call produced a usable result.
	Success,
	/// The call failed or timed out.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
