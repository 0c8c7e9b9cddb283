//! Chunked concurrent batch execution with continue/abort failure modes.

// std
use std::sync::Arc;
// crates.io
use futures::future::join_all;
// self
use crate::{Error, Result};

/// What to do when an item in a chunk fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
	/// Keep processing remaining chunks; collect every error.
	Continue,
	/// Finish the chunk currently in flight, then stop and reject the
	/// whole batch with the first error observed in that chunk.
	Abort,
}

/// Per-chunk progress passed to `on_chunk_start`/`on_chunk_end`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkInfo {
	/// Zero-based chunk index.
	pub index: usize,
	/// Total number of chunks.
	pub total: usize,
	/// Number of items in this chunk.
	pub items: usize,
	/// Items processed before this chunk started.
	pub processed_count: usize,
	/// Items remaining after this chunk, assuming it completes.
	pub remaining_count: usize,
	/// `processed_count / total_items`, as a percentage.
	pub completion_percent: f64,
}

/// The per-item outcome of a batch run, preserving input order.
pub struct BatchItemResult<T> {
	/// The item's successful result, if it succeeded.
	pub result: Option<T>,
	/// The item's error, if it failed.
	pub error: Option<Error>,
}

/// Hooks observing batch progress. All are optional.
#[derive(Default, Clone)]
pub struct BatchHooks {
	/// Fired once with the total item count before any chunk runs.
	pub on_start: Option<Arc<dyn Fn(usize) + Send + Sync>>,
	/// Fired before each chunk starts.
	pub on_chunk_start: Option<Arc<dyn Fn(ChunkInfo) + Send + Sync>>,
	/// Fired after each chunk settles.
	pub on_chunk_end: Option<Arc<dyn Fn(ChunkInfo) + Send + Sync>>,
	/// Fired once an item fails, regardless of failure mode.
	pub on_error: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
	/// Fired once when the batch finishes (including an aborted finish).
	pub on_end: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Run `f` over `items` in chunks of `concurrency`, running each chunk's
/// items concurrently. Chunks always run in order; within a chunk, every
/// item settles before the batch moves on, even in abort mode.
///
/// In [`FailureMode::Abort`], the first error observed in a chunk causes
/// the whole call to reject with that error once the chunk finishes
/// settling; no further chunks run. In [`FailureMode::Continue`], every
/// item across every chunk runs, and the per-item outcomes are returned in
/// input order.
pub async fn batch<A, T, F, Fut>(
	items: Vec<A>,
	concurrency: usize,
	failure_mode: FailureMode,
	f: F,
	hooks: BatchHooks,
) -> Result<Vec<BatchItemResult<T>>>
where
	F: Fn(A) -> Fut + Send + Sync,
	Fut: std::future::Future<Output = Result<T>> + Send,
	A: Send,
	T: Send,
{
	let total = items.len();
	if let Some(on_start) = &hooks.on_start {
		on_start(total);
	}

	let concurrency = concurrency.max(1);
	let chunks = into_chunks(items, concurrency);
	let chunk_count = chunks.len();

	let mut results = Vec::with_capacity(total);
	let mut processed = 0usize;

	for (index, chunk) in chunks.into_iter().enumerate() {
		let chunk_len = chunk.len();
		let info_for = |processed: usize| ChunkInfo {
			index,
			total: chunk_count,
			items: chunk_len,
			processed_count: processed,
			remaining_count: total - processed,
			completion_percent: if total == 0 { 100.0 } else { (processed as f64 / total as f64) * 100.0 },
		};

		if let Some(on_chunk_start) = &hooks.on_chunk_start {
			on_chunk_start(info_for(processed));
		}

		let outcomes: Vec<Result<T>> = join_all(chunk.into_iter().map(|item| f(item))).await;

		let mut first_error_index: Option<usize> = None;
		for outcome in outcomes {
			match outcome {
				Ok(value) => results.push(BatchItemResult { result: Some(value), error: None }),
				Err(err) => {
					if let Some(on_error) = &hooks.on_error {
						on_error(&err);
					}
					if first_error_index.is_none() {
						first_error_index = Some(results.len());
					}
					results.push(BatchItemResult { result: None, error: Some(err) });
				},
			}
		}

		processed += chunk_len;
		if let Some(on_chunk_end) = &hooks.on_chunk_end {
			on_chunk_end(info_for(processed));
		}

		if failure_mode == FailureMode::Abort {
			if let Some(idx) = first_error_index {
				if let Some(on_end) = &hooks.on_end {
					on_end();
				}
				return Err(results[idx].error.take().expect("first_error_index points at an errored item"));
			}
		}
	}

	if let Some(on_end) = &hooks.on_end {
		on_end();
	}

	Ok(results)
}

fn into_chunks<A>(items: Vec<A>, concurrency: usize) -> Vec<Vec<A>> {
	let mut chunks = Vec::new();
	let mut iter = items.into_iter();
	loop {
		let chunk: Vec<A> = iter.by_ref().take(concurrency).collect();
		if chunk.is_empty() {
			break;
		}
		chunks.push(chunk);
	}
	chunks
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::sync::Mutex;

	#[tokio::test]
	async fn continue_mode_runs_every_item_and_reports_both_outcomes() {
		let results = batch(
			(0..4).collect(),
			2,
			FailureMode::Continue,
			|n: i32| async move {
				if n == 2 {
					Err(Error::Config { field: "n", reason: "boom".into() })
				} else {
					Ok(n * 10)
				}
			},
			BatchHooks::default(),
		)
		.await
		.unwrap();

		assert_eq!(results.len(), 4);
		assert_eq!(results[0].result, Some(0));
		assert!(results[2].error.is_some());
		assert_eq!(results[3].result, Some(30));
	}

	#[tokio::test]
	async fn abort_mode_settles_the_failing_chunk_then_rejects() {
		let invocations = Arc::new(AtomicU32::new(0));
		let invocations_clone = invocations.clone();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let seen_clone = seen.clone();

		let outcome = batch(
			(0..10).collect(),
			2,
			FailureMode::Abort,
			move |n: i32| {
				let invocations = invocations_clone.clone();
				let seen = seen_clone.clone();
				async move {
					invocations.fetch_add(1, Ordering::SeqCst);
					seen.lock().await.push(n);
					if n == 5 {
						Err(Error::Config { field: "n", reason: "boom".into() })
					} else {
						Ok(n)
					}
				}
			},
			BatchHooks::default(),
		)
		.await;

		assert!(outcome.is_err());
		assert_eq!(invocations.load(Ordering::SeqCst), 6);
		assert_eq!(*seen.lock().await, vec![0, 1, 2, 3, 4, 5]);
	}
}
