//! Login and background renewal.
//!
//! [`TokenAcquirer`] owns the network side (discovery plus both grants, each bounded by the
//! request timeout and the caller's cancellation token). [`TokenRenewer`] is the background
//! state machine that keeps the cached token fresh and falls back to a backoff-guarded login
//! when a refresh fails.

mod login;
mod metrics;
mod renewal;

pub use login::*;
pub use self::metrics::*;
pub use renewal::*;
