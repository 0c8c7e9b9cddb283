//! Keyed single-flight in-flight request deduplication.
//!
//! A keyed producer wrapper: concurrent callers with the same derived key
//! share one producer execution rather than each starting their own.

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;
// self
use super::{BoxFuture, Producer};
use crate::{Error, Result};

type JoinedResult<T> = std::result::Result<T, Arc<Error>>;
type SharedCall<T> = Shared<BoxFuture<'static, JoinedResult<T>>>;

/// Configuration for [`InflightDedup`].
pub struct InflightConfig<A, T> {
	/// Derives the dedup key for a call's arguments. Defaults to
	/// [`crate::key::fingerprint`] over a JSON encoding of the arguments
	/// when not supplied by the caller.
	pub generate_key: Arc<dyn Fn(&A) -> String + Send + Sync>,
	/// If this returns `false` (or is absent), bypass the table for this
	/// call entirely and run the producer directly with no hooks fired.
	pub should_dedupe: Option<Arc<dyn Fn(&A) -> bool + Send + Sync>>,
	/// Fired once when a new table entry is created.
	pub on_start: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	/// Fired for every caller that joins an existing entry.
	pub on_join: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	/// Fired once the shared producer settles successfully.
	pub on_resolve: Option<Arc<dyn Fn(&str, &T) + Send + Sync>>,
	/// Fired once the shared producer settles with an error.
	pub on_reject: Option<Arc<dyn Fn(&str, &Error) + Send + Sync>>,
}

/// Single-flight table keyed by a caller-derived (or fingerprinted) key.
pub struct InflightDedup<A, T> {
	inner: Producer<A, T>,
	generate_key: Arc<dyn Fn(&A) -> String + Send + Sync>,
	should_dedupe: Option<Arc<dyn Fn(&A) -> bool + Send + Sync>>,
	on_start: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	on_join: Option<Arc<dyn Fn(&str) + Send + Sync>>,
	on_resolve: Option<Arc<dyn Fn(&str, &T) + Send + Sync>>,
	on_reject: Option<Arc<dyn Fn(&str, &Error) + Send + Sync>>,
	table: Mutex<HashMap<String, SharedCall<T>>>,
}
impl<A, T> InflightDedup<A, T>
where
	A: Clone + Send + Sync + 'static,
	T: Clone + Send + Sync + 'static,
{
	/// Wrap `inner` with keyed in-flight deduplication.
	pub fn new(inner: Producer<A, T>, config: InflightConfig<A, T>) -> Self {
		Self {
			inner,
			generate_key: config.generate_key,
			should_dedupe: config.should_dedupe,
			on_start: config.on_start,
			on_join: config.on_join,
			on_resolve: config.on_resolve,
			on_reject: config.on_reject,
			table: Mutex::new(HashMap::new()),
		}
	}

	/// Invoke the wrapped producer, joining an in-flight call with the same
	/// key if one exists.
	pub async fn call(&self, args: A) -> Result<T> {
		let dedupe = self.should_dedupe.as_ref().map(|should| should(&args)).unwrap_or(true);
		if !dedupe {
			return (self.inner)(args).await;
		}

		let key = (self.generate_key)(&args);

		let (shared, is_owner) = {
			let mut table = self.table.lock().await;
			if let Some(existing) = table.get(&key) {
				if let Some(on_join) = &self.on_join {
					on_join(&key);
				}
				(existing.clone(), false)
			} else {
				if let Some(on_start) = &self.on_start {
					on_start(&key);
				}
				let inner = self.inner.clone();
				let fut: BoxFuture<'static, JoinedResult<T>> =
					Box::pin(async move { inner(args).await.map_err(Arc::new) });
				let shared = fut.shared();
				table.insert(key.clone(), shared.clone());
				(shared, true)
			}
		};

		let outcome = shared.await;

		// Only the owner (the caller that created the table entry) settles
		// the entry: fires resolve/reject once and removes it. Joiners just
		// await the shared outcome.
		if !is_owner {
			return outcome.map_err(|err| Error::Shared(err.to_string()));
		}

		self.table.lock().await.remove(&key);

		match outcome {
			Ok(value) => {
				if let Some(on_resolve) = &self.on_resolve {
					on_resolve(&key, &value);
				}
				Ok(value)
			},
			Err(err) => {
				if let Some(on_reject) = &self.on_reject {
					on_reject(&key, &err);
				}
				Err(Error::Shared(err.to_string()))
			},
		}
	}

	/// Convert into a [`Producer`].
	pub fn into_producer(self: Arc<Self>) -> Producer<A, T> {
		Arc::new(move |args: A| {
			let this = self.clone();
			Box::pin(async move { this.call(args).await }) as BoxFuture<'static, Result<T>>
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::sync::Barrier;

	#[tokio::test]
	async fn concurrent_callers_with_the_same_key_share_one_execution() {
		let upstream_calls = Arc::new(AtomicU32::new(0));
		let upstream_calls_clone = upstream_calls.clone();
		let barrier = Arc::new(Barrier::new(3));
		let barrier_clone = barrier.clone();
		let inner = super::super::producer(move |_: ()| {
			let upstream_calls = upstream_calls_clone.clone();
			let barrier = barrier_clone.clone();
			async move {
				barrier.wait().await;
				upstream_calls.fetch_add(1, Ordering::SeqCst);
				Ok::<u32, Error>(1)
			}
		});

		let joins = Arc::new(AtomicU32::new(0));
		let joins_clone = joins.clone();
		let dedup = Arc::new(InflightDedup::new(
			inner,
			InflightConfig {
				generate_key: Arc::new(|_: &()| "k".to_string()),
				should_dedupe: None,
				on_start: None,
				on_join: Some(Arc::new(move |_| {
					joins_clone.fetch_add(1, Ordering::SeqCst);
				})),
				on_resolve: None,
				on_reject: None,
			},
		));

		let a = dedup.clone();
		let b = dedup.clone();
		let c = dedup.clone();
		let (ra, rb, rc) = tokio::join!(a.call(()), b.call(()), c.call(()));

		assert!(ra.is_ok() && rb.is_ok() && rc.is_ok());
		assert_eq!(upstream_calls.load(Ordering::SeqCst), 1);
		assert_eq!(joins.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn should_dedupe_false_bypasses_the_table() {
		let upstream_calls = Arc::new(AtomicU32::new(0));
		let upstream_calls_clone = upstream_calls.clone();
		let inner = super::super::producer(move |_: ()| {
			let upstream_calls = upstream_calls_clone.clone();
			async move {
				upstream_calls.fetch_add(1, Ordering::SeqCst);
				Ok::<u32, Error>(1)
			}
		});
		let dedup = InflightDedup::new(
			inner,
			InflightConfig {
				generate_key: Arc::new(|_: &()| "k".to_string()),
				should_dedupe: Some(Arc::new(|_: &()| false)),
				on_start: None,
				on_join: None,
				on_resolve: None,
				on_reject: None,
			},
		);

		dedup.call(()).await.unwrap();
		dedup.call(()).await.unwrap();

		assert_eq!(upstream_calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn on_resolve_fires_once_for_the_owner_not_every_joiner() {
		let barrier = Arc::new(Barrier::new(3));
		let barrier_clone = barrier.clone();
		let inner = super::super::producer(move |_: ()| {
			let barrier = barrier_clone.clone();
			async move {
				barrier.wait().await;
				Ok::<u32, Error>(7)
			}
		});

		let resolves = Arc::new(AtomicU32::new(0));
		let resolves_clone = resolves.clone();
		let dedup = Arc::new(InflightDedup::new(
			inner,
			InflightConfig {
				generate_key: Arc::new(|_: &()| "k".to_string()),
				should_dedupe: None,
				on_start: None,
				on_join: None,
				on_resolve: Some(Arc::new(move |_, _| {
					resolves_clone.fetch_add(1, Ordering::SeqCst);
				})),
				on_reject: None,
			},
		));

		let a = dedup.clone();
		let b = dedup.clone();
		let c = dedup.clone();
		let (ra, rb, rc) = tokio::join!(a.call(()), b.call(()), c.call(()));

		assert!(ra.is_ok() && rb.is_ok() && rc.is_ok());
		assert_eq!(resolves.load(Ordering::SeqCst), 1);
	}
}
