//! Floored exponential backoff with additive jitter.
//!
//! The wait before retry `n` is `base = max(2^n - 1, floor)` seconds plus a jitter drawn
//! uniformly from `[0, 2 * jitter_percent% * base)`. With the defaults (`floor = 180s`,
//! `jitter_percent = 25`) every delay lands in `[base, 1.5 * base)`, and the exponential term
//! only overtakes the floor from retry 8 onwards.

// crates.io
use rand::{Rng, SeedableRng, rngs::StdRng};
// self
use crate::_prelude::*;

/// Backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
	/// Smallest base delay.
	pub floor: Duration,
	/// Half-width of the jitter band, as a percentage of the base delay.
	pub jitter_percent: u8,
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self { floor: Duration::seconds(180), jitter_percent: 25 }
	}
}
impl BackoffPolicy {
	/// Base delay in seconds before jitter.
	pub fn base_secs(&self, retry_count: u32) -> f64 {
		let exponential = 2_f64.powi(retry_count.min(1_024) as i32) - 1.;

		exponential.max(self.floor.as_seconds_f64().max(0.))
	}

	/// Delay for `retry_count` given a uniform `sample` in `[0, 1)`.
	pub fn delay_for_sample(&self, retry_count: u32, sample: f64) -> std::time::Duration {
		let base = self.base_secs(retry_count);
		let ratio = f64::from(self.jitter_percent) / 100.;
		let low = base * (1. - ratio);
		let high = base * (1. + ratio);
		let secs = base + (high - low) * sample.clamp(0., 1.);

		std::time::Duration::try_from_secs_f64(secs).unwrap_or(std::time::Duration::MAX)
	}

	/// Delay for `retry_count` drawing the jitter from `rng`.
	pub fn delay<R>(&self, retry_count: u32, rng: &mut R) -> std::time::Duration
	where
		R: Rng,
	{
		self.delay_for_sample(retry_count, rng.random::<f64>())
	}
}

/// Retry counter and jitter source owned by one acquisition/renewal chain.
#[derive(Debug)]
pub struct BackoffState {
	retry_count: u32,
	rng: StdRng,
}
impl BackoffState {
	/// Starts a chain; a `seed` makes its jitter reproducible.
	pub fn new(seed: Option<u64>) -> Self {
		let rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_os_rng(),
		};

		Self { retry_count: 0, rng }
	}

	/// Failed attempts since the last success.
	pub fn retry_count(&self) -> u32 {
		self.retry_count
	}

	/// Records a failure and returns the new retry count.
	pub fn record_failure(&mut self) -> u32 {
		self.retry_count = self.retry_count.saturating_add(1);

		self.retry_count
	}

	/// Resets the chain after a success.
	pub fn reset(&mut self) {
		self.retry_count = 0;
	}

	/// Jittered delay for the current retry count.
	pub fn next_delay(&mut self, policy: &BackoffPolicy) -> std::time::Duration {
		policy.delay(self.retry_count, &mut self.rng)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn within(delay: std::time::Duration, low: f64, high: f64) -> bool {
		let secs = delay.as_secs_f64();

		secs >= low && secs < high
	}

	#[test]
	fn early_retries_use_the_floor() {
		let policy = BackoffPolicy::default();
		let mut state = BackoffState::new(Some(7));

		for retry in 0..=7 {
			assert_eq!(policy.base_secs(retry), 180.);
		}
		for _ in 0..64 {
			assert!(within(policy.delay(0, &mut state.rng), 180., 270.));
			assert!(within(policy.delay(5, &mut state.rng), 180., 270.));
		}
	}

	#[test]
	fn exponential_term_takes_over_from_retry_eight() {
		let policy = BackoffPolicy::default();
		let mut state = BackoffState::new(Some(11));

		assert_eq!(policy.base_secs(8), 255.);
		assert_eq!(policy.base_secs(9), 511.);

		for _ in 0..64 {
			assert!(within(policy.delay(8, &mut state.rng), 255., 382.5));
		}
	}

	#[test]
	fn jitter_is_additive_and_bounded() {
		let policy = BackoffPolicy::default();

		assert_eq!(policy.delay_for_sample(0, 0.), std::time::Duration::from_secs(180));
		assert_eq!(policy.delay_for_sample(8, 0.5), std::time::Duration::from_secs_f64(318.75));
		assert!(policy.delay_for_sample(8, 0.999_999).as_secs_f64() < 382.5);
		assert_eq!(
			BackoffPolicy { jitter_percent: 0, ..policy }.delay_for_sample(3, 0.9),
			std::time::Duration::from_secs(180)
		);
	}

	#[test]
	fn huge_retry_counts_saturate() {
		let policy = BackoffPolicy::default();

		assert_eq!(policy.delay_for_sample(u32::MAX, 0.5), std::time::Duration::MAX);
	}

	#[test]
	fn seeded_chains_are_reproducible() {
		let policy = BackoffPolicy::default();
		let mut lhs = BackoffState::new(Some(42));
		let mut rhs = BackoffState::new(Some(42));

		for _ in 0..8 {
			assert_eq!(lhs.record_failure(), rhs.record_failure());
			assert_eq!(lhs.next_delay(&policy), rhs.next_delay(&policy));
		}

		lhs.reset();

		assert_eq!(lhs.retry_count(), 0);
	}
}
