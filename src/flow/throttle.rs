//! Leading-edge throttle with cached replay of the last outcome.

// std
use std::sync::Arc;
// crates.io
use tokio::{
	sync::Mutex,
	time::{Duration, Instant},
};
// self
use super::{BoxFuture, Producer};
use crate::{Error, Result};

/// Configuration for [`Throttle`].
pub struct ThrottleConfig<A> {
	/// Minimum spacing between executions.
	pub delay: Duration,
	/// Invoked with the call's arguments whenever a call is throttled
	/// (i.e. served from cache instead of executing).
	pub on_throttle: Option<Arc<dyn Fn(&A) + Send + Sync>>,
}
impl<A> Default for ThrottleConfig<A> {
	fn default() -> Self {
		Self { delay: Duration::from_millis(0), on_throttle: None }
	}
}

struct ThrottleState<T> {
	last_executed: Option<Instant>,
	cached: Option<std::result::Result<T, String>>,
}

/// Leading-edge throttle: the first call executes and caches its outcome
/// (success or error); calls inside `delay` of the last execution replay
/// that cached outcome instead of re-invoking the producer.
pub struct Throttle<A, T> {
	inner: Producer<A, T>,
	config: ThrottleConfig<A>,
	state: Mutex<ThrottleState<T>>,
}
impl<A, T> Throttle<A, T>
where
	A: Clone + Send + Sync + 'static,
	T: Clone + Send + Sync + 'static,
{
	/// Wrap `inner` with a leading-edge throttle.
	pub fn new(inner: Producer<A, T>, config: ThrottleConfig<A>) -> Self {
		Self { inner, config, state: Mutex::new(ThrottleState { last_executed: None, cached: None }) }
	}

	/// Invoke the wrapped producer, or replay the cached outcome if this
	/// call falls within the throttle window.
	pub async fn call(&self, args: A) -> Result<T> {
		let mut state = self.state.lock().await;
		let now = Instant::now();
		let should_execute = match state.last_executed {
			None => true,
			Some(last) => now.duration_since(last) >= self.config.delay,
		};

		if should_execute {
			let result = (self.inner)(args).await;
			state.last_executed = Some(now);
			state.cached = Some(result.as_ref().map(|v| v.clone()).map_err(|e| e.to_string()));
			result
		} else {
			if let Some(on_throttle) = &self.config.on_throttle {
				on_throttle(&args);
			}
			match state.cached.clone() {
				Some(Ok(value)) => Ok(value),
				Some(Err(message)) => Err(Error::Shared(message)),
				None => (self.inner)(args).await,
			}
		}
	}

	/// Clear the last-executed timestamp and cached outcome.
	pub async fn cancel(&self) {
		let mut state = self.state.lock().await;
		state.last_executed = None;
		state.cached = None;
	}

	/// Convert into a [`Producer`].
	pub fn into_producer(self: Arc<Self>) -> Producer<A, T> {
		Arc::new(move |args: A| {
			let this = self.clone();
			Box::pin(async move { this.call(args).await }) as BoxFuture<'static, Result<T>>
		})
	}
}
