//! A single cache slot and its freshness classification.

// crates.io
use tokio::time::{Duration, Instant};

/// Classification of a cache read, per the fresh/stale/expired contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
	/// No entry for this key.
	Miss,
	/// `now − storedAt < staleIn` (or no `staleIn` configured).
	Fresh,
	/// `staleIn ≤ now − storedAt < ttl`.
	Stale,
	/// `now − storedAt ≥ ttl`; never served, always treated as a miss.
	Expired,
}

/// A stored value plus its TTL/stale-window bookkeeping.
///
/// `ttl == Duration::MAX` models the specification's `ttl = +∞`: an entry
/// that is always at most fresh-or-stale and never expires.
#[derive(Clone)]
pub struct CacheEntry<V> {
	pub(super) value: V,
	pub(super) stored_at: Instant,
	pub(super) ttl: Duration,
	pub(super) stale_in: Option<Duration>,
	pub(super) revalidating: bool,
}
impl<V> CacheEntry<V> {
	/// Store `value` as of `now`, with the given TTL and optional stale
	/// window. A `stale_in` at or beyond `ttl` degrades to "never stale,
	/// just expires", per the specified invariant.
	pub fn new(value: V, now: Instant, ttl: Duration, stale_in: Option<Duration>) -> Self {
		let stale_in = stale_in.filter(|&s| s < ttl);
		Self { value, stored_at: now, ttl, stale_in, revalidating: false }
	}

	/// Classify this entry's freshness as of `now`.
	pub fn freshness(&self, now: Instant) -> Freshness {
		let age = now.saturating_duration_since(self.stored_at);
		if age >= self.ttl {
			return Freshness::Expired;
		}
		match self.stale_in {
			Some(stale_in) if age >= stale_in => Freshness::Stale,
			_ => Freshness::Fresh,
		}
	}

	/// How much longer until this entry expires, as of `now`.
	pub fn expires_in(&self, now: Instant) -> Duration {
		self.ttl.saturating_sub(now.saturating_duration_since(self.stored_at))
	}

	/// The stored value.
	pub fn value(&self) -> &V {
		&self.value
	}

	/// Whether a background revalidation is currently in flight.
	pub fn is_revalidating(&self) -> bool {
		self.revalidating
	}
}
