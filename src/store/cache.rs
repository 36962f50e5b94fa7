//! Generation-tagged holder of the current token.

// self
use crate::{_prelude::*, auth::Token};

/// Holder of the single current token.
///
/// Every write replaces the whole `Arc<Token>` under the write lock, so readers see either the
/// previous or the next token and never a mix. Each install bumps a generation counter and the
/// renewal loop may only replace a token installed under its own generation.
#[derive(Debug, Default)]
pub struct TokenCache(RwLock<CacheState>);
#[derive(Debug, Default)]
struct CacheState {
	generation: u64,
	token: Option<Arc<Token>>,
}
impl TokenCache {
	/// Current token, if any.
	pub fn get(&self) -> Option<Arc<Token>> {
		self.0.read().token.clone()
	}

	/// Returns `true` when no token is cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().token.is_none()
	}

	/// Generation of the most recent install or clear.
	pub fn generation(&self) -> u64 {
		self.0.read().generation
	}

	/// Returns `true` if `generation` is still the current one.
	pub fn is_current(&self, generation: u64) -> bool {
		self.generation() == generation
	}

	/// Stores a freshly logged-in token and returns the new generation.
	pub(crate) fn install(&self, token: Arc<Token>) -> u64 {
		let mut state = self.0.write();

		state.generation += 1;
		state.token = Some(token);

		state.generation
	}

	/// Replaces the token if `generation` is still current.
	pub(crate) fn replace(&self, generation: u64, token: Arc<Token>) -> bool {
		let mut state = self.0.write();

		if state.generation != generation {
			return false;
		}

		state.token = Some(token);

		true
	}

	/// Empties the cache and invalidates the current generation.
	pub(crate) fn clear(&self) -> u64 {
		let mut state = self.0.write();

		state.generation += 1;
		state.token = None;

		state.generation
	}
}
