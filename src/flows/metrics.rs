// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the renewal loop.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	fallback_logins: AtomicU64,
}
impl RenewalMetrics {
	/// Renewal attempts (refresh grants or re-grants) started by the loop.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Renewal attempts that replaced the cached token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Renewal attempts that failed and sent the loop into recovery.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Backoff-guarded logins issued while recovering.
	pub fn fallback_logins(&self) -> u64 {
		self.fallback_logins.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fallback_login(&self) {
		self.fallback_logins.fetch_add(1, Ordering::Relaxed);
	}
}
