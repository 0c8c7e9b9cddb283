//! Read-through cache with stale-while-revalidate and invalidation.

// std
use std::{
	collections::HashMap,
	future::Future,
	sync::{
		atomic::{AtomicBool, AtomicI64, Ordering},
		Arc,
	},
};
// crates.io
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::{
	sync::RwLock,
	time::{Duration, Instant},
};
// self
use super::entry::{CacheEntry, Freshness};
use crate::{Error, Result};

/// Snapshot returned from [`CacheStore::get`] / [`CacheStore::get_or_revalidate`].
pub struct CacheRead<V> {
	/// The freshness classification that produced this read.
	pub state: Freshness,
	/// The cached value, present for `Fresh` and `Stale` reads.
	pub value: Option<V>,
}

/// `{cacheSize, inflightCount}` snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStats {
	/// Number of live entries.
	pub cache_size: usize,
	/// Number of in-flight background revalidations.
	pub inflight_count: usize,
}

/// Selects which keys an invalidation call targets.
pub enum KeyMatcher {
	/// Exact key.
	Exact(String),
	/// Prefix match against the key.
	Prefix(String),
	/// Regex match against the key.
	Regex(Regex),
	/// Arbitrary predicate over the key.
	Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}
impl KeyMatcher {
	fn matches(&self, key: &str) -> bool {
		match self {
			Self::Exact(k) => k == key,
			Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
			Self::Regex(re) => re.is_match(key),
			Self::Predicate(p) => p(key),
		}
	}
}

/// Hooks fired during an SWR read; mirrors the observable cache event
/// contract without depending on [`crate::events::LifecycleEmitter`]
/// directly, so `CacheStore` stays usable standalone.
#[derive(Default, Clone)]
pub struct SwrHooks {
	/// `key` had an entry whose age reached `ttl`; fired just before the
	/// entry is dropped and the read falls through to `on_miss`.
	pub on_expire: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	/// `key` was absent (or just expired).
	pub on_miss: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	/// `(key, expires_in)` for a fresh hit.
	pub on_hit: Option<Arc<dyn Fn(&str, Duration) + Send + Sync>>,
	/// `(key, expires_in)` after a value is stored.
	pub on_set: Option<Arc<dyn Fn(&str, Duration) + Send + Sync>>,
	/// `(key, expires_in)` for a stale hit, fired before `on_revalidate`.
	pub on_stale: Option<Arc<dyn Fn(&str, Duration) + Send + Sync>>,
	/// `key` for which a background revalidation was just scheduled.
	pub on_revalidate: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	/// `(key, error)` when a background revalidation failed.
	pub on_revalidate_error: Option<Arc<dyn Fn(&str, &Error) + Send + Sync>>,
}

/// TTL + stale-window store with SWR revalidation and invalidation API.
///
/// Cheaply `Clone`: clones share the same backing map and counters, which
/// is what lets a spawned background revalidation hold its own handle.
pub struct CacheStore<V> {
	entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
	inflight_revalidations: Arc<AtomicI64>,
	destroyed: Arc<AtomicBool>,
}
impl<V> Clone for CacheStore<V> {
	fn clone(&self) -> Self {
		Self {
			entries: self.entries.clone(),
			inflight_revalidations: self.inflight_revalidations.clone(),
			destroyed: self.destroyed.clone(),
		}
	}
}
impl<V> Default for CacheStore<V> {
	fn default() -> Self {
		Self::new()
	}
}
impl<V> CacheStore<V> {
	/// Construct an empty store.
	pub fn new() -> Self {
		Self { entries: Arc::new(RwLock::new(HashMap::new())), inflight_revalidations: Arc::new(AtomicI64::new(0)), destroyed: Arc::new(AtomicBool::new(false)) }
	}

	/// `{cacheSize, inflightCount}`, always non-negative.
	pub async fn stats(&self) -> CacheStats {
		let cache_size = self.entries.read().await.len();
		let inflight_count = self.inflight_revalidations.load(Ordering::SeqCst).max(0) as usize;
		CacheStats { cache_size, inflight_count }
	}

	/// Store `value` under `key`, recording `storedAt = now`.
	pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration, stale_in: Option<Duration>) {
		if self.destroyed.load(Ordering::SeqCst) {
			return;
		}
		let now = Instant::now();
		self.entries.write().await.insert(key.into(), CacheEntry::new(value, now, ttl, stale_in));
	}

	/// Remove `key`. Returns whether an entry was present.
	pub async fn delete(&self, key: &str) -> bool {
		self.entries.write().await.remove(key).is_some()
	}

	/// Remove every entry whose key matches `matcher`. Returns the count removed.
	pub async fn invalidate(&self, matcher: KeyMatcher) -> usize {
		let mut entries = self.entries.write().await;
		let keys: Vec<String> = entries.keys().filter(|k| matcher.matches(k)).cloned().collect();
		for key in &keys {
			entries.remove(key);
		}
		keys.len()
	}

	/// Alias of [`Self::invalidate`] for path-shaped matchers (prefix,
	/// regex, or predicate), matching the distilled `invalidatePath` name.
	pub async fn invalidate_path(&self, matcher: KeyMatcher) -> usize {
		self.invalidate(matcher).await
	}

	/// Drop every entry.
	pub async fn clear(&self) {
		self.entries.write().await.clear();
	}

	/// Clear entries, cancel bookkeeping for in-flight revalidations, and
	/// make future operations no-ops with consistent (zeroed) stats.
	///
	/// Background tasks already running to completion are not forcibly
	/// killed (Rust futures are cooperative), but their counter is reset
	/// so `stats()` reports zero immediately, and their eventual `set`
	/// calls are suppressed by the destroyed flag.
	pub async fn destroy(&self) {
		self.destroyed.store(true, Ordering::SeqCst);
		self.entries.write().await.clear();
		self.inflight_revalidations.store(0, Ordering::SeqCst);
	}

	/// Plain classify-and-read with no revalidation; expired entries are
	/// removed and reported as a miss.
	pub async fn get(&self, key: &str) -> CacheRead<V>
	where
		V: Clone,
	{
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		match entries.get(key) {
			None => CacheRead { state: Freshness::Miss, value: None },
			Some(entry) => match entry.freshness(now) {
				Freshness::Expired => {
					entries.remove(key);
					CacheRead { state: Freshness::Miss, value: None }
				},
				state => CacheRead { state, value: Some(entry.value().clone()) },
			},
		}
	}
}
impl<V> CacheStore<V>
where
	V: Clone + Send + Sync + 'static,
{
	/// Read `key`, transparently triggering background SWR revalidation on
	/// a stale hit. `producer` runs at most once concurrently per key:
	/// if a revalidation is already in flight, this call just returns the
	/// cached value without spawning another.
	pub async fn get_or_revalidate<F, Fut>(&self, key: &str, producer: F, hooks: SwrHooks) -> CacheRead<V>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = Result<V>> + Send + 'static,
	{
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		let Some(entry) = entries.get_mut(key) else {
			drop(entries);
			if let Some(on_miss) = &hooks.on_miss {
				on_miss(key);
			}
			return CacheRead { state: Freshness::Miss, value: None };
		};

		match entry.freshness(now) {
			Freshness::Expired => {
				entries.remove(key);
				drop(entries);
				if let Some(on_expire) = &hooks.on_expire {
					on_expire(key);
				}
				if let Some(on_miss) = &hooks.on_miss {
					on_miss(key);
				}
				CacheRead { state: Freshness::Miss, value: None }
			},
			Freshness::Fresh => {
				let value = entry.value().clone();
				let expires_in = entry.expires_in(now);
				drop(entries);
				if let Some(on_hit) = &hooks.on_hit {
					on_hit(key, expires_in);
				}
				CacheRead { state: Freshness::Fresh, value: Some(value) }
			},
			Freshness::Stale => {
				let value = entry.value().clone();
				let expires_in = entry.expires_in(now);
				let should_spawn = !entry.revalidating;
				if should_spawn {
					entry.revalidating = true;
				}
				drop(entries);

				if let Some(on_stale) = &hooks.on_stale {
					on_stale(key, expires_in);
				}
				if should_spawn {
					if let Some(on_revalidate) = &hooks.on_revalidate {
						on_revalidate(key);
					}
					self.spawn_revalidation(key.to_string(), producer, hooks);
				}
				CacheRead { state: Freshness::Stale, value: Some(value) }
			},
			Freshness::Miss => unreachable!("an existing entry is never classified Miss"),
		}
	}

	fn spawn_revalidation<F, Fut>(&self, key: String, producer: F, hooks: SwrHooks)
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = Result<V>> + Send + 'static,
	{
		let store = self.clone();
		store.inflight_revalidations.fetch_add(1, Ordering::SeqCst);
		tokio::spawn(async move {
			let outcome = producer().await;
			store.inflight_revalidations.fetch_sub(1, Ordering::SeqCst);

			if store.destroyed.load(Ordering::SeqCst) {
				return;
			}

			let mut entries = store.entries.write().await;
			match outcome {
				Ok(value) => {
					let ttl = entries.get(&key).map(|e| e.ttl).unwrap_or(Duration::from_secs(60));
					let stale_in = entries.get(&key).and_then(|e| e.stale_in);
					let now = Instant::now();
					let expires_in = ttl;
					entries.insert(key.clone(), CacheEntry::new(value, now, ttl, stale_in));
					drop(entries);
					if let Some(on_set) = &hooks.on_set {
						on_set(&key, expires_in);
					}
				},
				Err(err) => {
					if let Some(entry) = entries.get_mut(&key) {
						entry.revalidating = false;
					}
					drop(entries);
					tracing::warn!(key, error = %err, "background revalidation failed, serving stale data");
					if let Some(on_revalidate_error) = &hooks.on_revalidate_error {
						on_revalidate_error(&key, &err);
					}
				},
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering as StdOrdering};

	#[tokio::test(start_paused = true)]
	async fn fresh_hit_never_invokes_the_producer() {
		let store: CacheStore<u32> = CacheStore::new();
		store.set("k", 1, Duration::from_secs(10), Some(Duration::from_secs(5))).await;

		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = calls.clone();
		let read = store
			.get_or_revalidate(
				"k",
				move || {
					let calls = calls_clone.clone();
					async move {
						calls.fetch_add(1, StdOrdering::SeqCst);
						Ok(2)
					}
				},
				SwrHooks::default(),
			)
			.await;

		assert_eq!(read.state, Freshness::Fresh);
		assert_eq!(read.value, Some(1));
		assert_eq!(calls.load(StdOrdering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn stale_hit_returns_cached_value_and_schedules_one_revalidation() {
		let store: CacheStore<u32> = CacheStore::new();
		store.set("k", 1, Duration::from_secs(10), Some(Duration::from_millis(50))).await;
		tokio::time::advance(Duration::from_millis(60)).await;

		let calls = Arc::new(AtomicU32::new(0));
		for _ in 0..3 {
			let calls_clone = calls.clone();
			let read = store
				.get_or_revalidate(
					"k",
					move || {
						let calls = calls_clone.clone();
						async move {
							calls.fetch_add(1, StdOrdering::SeqCst);
							Ok(2)
						}
					},
					SwrHooks::default(),
				)
				.await;
			assert_eq!(read.state, Freshness::Stale);
			assert_eq!(read.value, Some(1));
		}

		tokio::task::yield_now().await;
		assert_eq!(calls.load(StdOrdering::SeqCst), 1);

		let fresh = store.get("k").await;
		assert_eq!(fresh.value, Some(2));
	}

	#[tokio::test(start_paused = true)]
	async fn expired_entry_is_removed_and_reported_as_miss() {
		let store: CacheStore<u32> = CacheStore::new();
		store.set("k", 1, Duration::from_millis(10), None).await;
		tokio::time::advance(Duration::from_millis(20)).await;

		let read = store.get("k").await;
		assert_eq!(read.state, Freshness::Miss);
		assert_eq!(store.stats().await.cache_size, 0);
	}

	#[tokio::test]
	async fn destroy_zeroes_stats_and_suppresses_further_writes() {
		let store: CacheStore<u32> = CacheStore::new();
		store.set("k", 1, Duration::from_secs(10), None).await;
		store.destroy().await;

		let stats = store.stats().await;
		assert_eq!(stats.cache_size, 0);
		assert_eq!(stats.inflight_count, 0);

		store.set("k2", 1, Duration::from_secs(10), None).await;
		assert_eq!(store.stats().await.cache_size, 0);
	}
}
