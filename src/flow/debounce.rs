//! Trailing-edge debounce with an optional `max_wait` ceiling.

// std
use std::sync::Arc;
// crates.io
use tokio::{
	sync::Mutex,
	task::JoinHandle,
	time::{Duration, Instant},
};
// self
use super::{BoxFuture, Producer};
use crate::{Error, Result};

/// Configuration for [`Debounce`].
pub struct DebounceConfig {
	/// Delay after the last call before the pending invocation executes.
	pub delay: Duration,
	/// If set, force execution once this long has elapsed since the first
	/// unflushed call, even if calls keep arriving.
	pub max_wait: Option<Duration>,
}

struct PendingCall<A> {
	args: A,
	first_queued_at: Instant,
	generation: u64,
}

struct DebounceState<A, T> {
	pending: Option<PendingCall<A>>,
	timer: Option<JoinHandle<()>>,
	last_result: Option<std::result::Result<T, String>>,
	generation: u64,
}

/// Trailing-edge debounce: each call replaces the pending invocation,
/// keeping only the latest arguments, and schedules it `delay` after the
/// most recent call (or sooner, if `max_wait` forces it).
pub struct Debounce<A, T> {
	inner: Producer<A, T>,
	config: DebounceConfig,
	state: Arc<Mutex<DebounceState<A, T>>>,
}
impl<A, T> Debounce<A, T>
where
	A: Clone + Send + Sync + 'static,
	T: Clone + Send + Sync + 'static,
{
	/// Wrap `inner` with a trailing-edge debounce.
	pub fn new(inner: Producer<A, T>, config: DebounceConfig) -> Arc<Self> {
		Arc::new(Self {
			inner,
			config,
			state: Arc::new(Mutex::new(DebounceState { pending: None, timer: None, last_result: None, generation: 0 })),
		})
	}

	/// Schedule `args` for execution, replacing any pending call.
	///
	/// Does not itself return the eventual result — use [`Self::flush`] to
	/// force and observe it, or [`Self::last_result`] to read the most
	/// recent completed execution.
	pub async fn call(self: &Arc<Self>, args: A) {
		let now = Instant::now();
		let mut state = self.state.lock().await;
		state.generation += 1;
		let generation = state.generation;

		let first_queued_at = state.pending.as_ref().map(|p| p.first_queued_at).unwrap_or(now);
		let force_wait = self.config.max_wait.map(|max_wait| now.duration_since(first_queued_at) >= max_wait).unwrap_or(false);

		state.pending = Some(PendingCall { args: args.clone(), first_queued_at, generation });

		if let Some(timer) = state.timer.take() {
			timer.abort();
		}

		if force_wait {
			drop(state);
			self.execute_pending(generation).await;
			return;
		}

		let this = self.clone();
		let delay = self.config.delay;
		state.timer = Some(tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			this.execute_pending(generation).await;
		}));
	}

	async fn execute_pending(self: &Arc<Self>, generation: u64) {
		let args = {
			let mut state = self.state.lock().await;
			match &state.pending {
				Some(pending) if pending.generation == generation => {
					let args = pending.args.clone();
					state.pending = None;
					state.timer = None;
					Some(args)
				},
				_ => None,
			}
		};
		let Some(args) = args else { return };
		let result = (self.inner)(args).await;
		self.state.lock().await.last_result = Some(result.map_err(|e| e.to_string()));
	}

	/// Run the pending invocation immediately, returning its result.
	/// Returns `Ok(None)` if nothing is pending.
	pub async fn flush(self: &Arc<Self>) -> Option<Result<T>> {
		let generation = {
			let mut state = self.state.lock().await;
			let Some(pending) = &state.pending else { return None };
			let generation = pending.generation;
			if let Some(timer) = state.timer.take() {
				timer.abort();
			}
			generation
		};
		self.execute_pending(generation).await;
		self.state.lock().await.last_result.clone().map(|r| r.map_err(Error::Shared))
	}

	/// Drop any pending call without executing it.
	pub async fn cancel(&self) {
		let mut state = self.state.lock().await;
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}
		state.pending = None;
	}

	/// The result of the most recently completed execution, if any.
	pub async fn last_result(&self) -> Option<Result<T>> {
		self.state.lock().await.last_result.clone().map(|r| r.map_err(Error::Shared))
	}

	/// Convert into a fire-and-forget [`Producer`] ignoring the scheduled
	/// result, returning the default instead. Primarily useful so a
	/// `Debounce` can sit inside [`super::compose::compose_flow`]; callers
	/// that need the eventual value should prefer [`Self::flush`] directly.
	pub fn into_producer(self: Arc<Self>) -> Producer<A, T>
	where
		T: Default,
	{
		Arc::new(move |args: A| {
			let this = self.clone();
			Box::pin(async move {
				this.call(args).await;
				Ok(T::default())
			}) as BoxFuture<'static, Result<T>>
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Error;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test(start_paused = true)]
	async fn trailing_calls_collapse_into_one_execution_with_latest_args() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let seen_clone = seen.clone();
		let inner = super::super::producer(move |n: u32| {
			let seen = seen_clone.clone();
			async move {
				seen.lock().await.push(n);
				Ok::<u32, Error>(n)
			}
		});
		let debounce = Debounce::new(inner, DebounceConfig { delay: Duration::from_millis(50), max_wait: None });

		debounce.call(1).await;
		debounce.call(2).await;
		debounce.call(3).await;

		tokio::time::advance(Duration::from_millis(60)).await;
		tokio::task::yield_now().await;

		assert_eq!(*seen.lock().await, vec![3]);
	}

	#[tokio::test(start_paused = true)]
	async fn flush_runs_the_pending_call_immediately() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = calls.clone();
		let inner = super::super::producer(move |n: u32| {
			let calls = calls_clone.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Ok::<u32, Error>(n)
			}
		});
		let debounce = Debounce::new(inner, DebounceConfig { delay: Duration::from_secs(10), max_wait: None });

		debounce.call(42).await;
		let result = debounce.flush().await;

		assert_eq!(result.unwrap().unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_drops_the_pending_call_without_executing() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = calls.clone();
		let inner = super::super::producer(move |_: u32| {
			let calls = calls_clone.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Ok::<u32, Error>(0)
			}
		});
		let debounce = Debounce::new(inner, DebounceConfig { delay: Duration::from_millis(10), max_wait: None });

		debounce.call(1).await;
		debounce.cancel().await;
		tokio::time::advance(Duration::from_millis(20)).await;
		tokio::task::yield_now().await;

		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert!(debounce.flush().await.is_none());
	}
}
