//! Sliding-window rate limiting.

// std
use std::{
	collections::VecDeque,
	sync::{Arc, Mutex},
};
// crates.io
use tokio::time::{Duration, Instant};
// self
use super::{BoxFuture, Producer};
use crate::{Error, Result};

/// Configuration for [`RateLimit`].
pub struct RateLimitConfig<A> {
	/// Maximum invocations permitted per `window`.
	pub max_calls: u32,
	/// The sliding window width.
	pub window: Duration,
	/// Whether an exceeded limit rejects the call (`true`, default) or
	/// resolves to `T::default()` (`false`).
	pub throws: bool,
	/// Invoked when the limit is hit, with the computed `next_available`.
	pub on_limit_reached: Option<Arc<dyn Fn(&Error, Instant, &A) + Send + Sync>>,
}
impl<A> Default for RateLimitConfig<A> {
	fn default() -> Self {
		Self { max_calls: 1, window: Duration::from_secs(1), throws: true, on_limit_reached: None }
	}
}

/// Token-bucket-equivalent rate limiter over a sliding window: keeps
/// timestamps of the last `max_calls` invocations and admits a new call
/// only if the oldest timestamp has aged out of the window.
pub struct RateLimit<A, T> {
	inner: Producer<A, T>,
	config: RateLimitConfig<A>,
	timestamps: Mutex<VecDeque<Instant>>,
}
impl<A, T> RateLimit<A, T>
where
	A: Send + Sync + 'static,
	T: Default + Send + Sync + 'static,
{
	/// Wrap `inner` with a rate limit.
	pub fn new(inner: Producer<A, T>, config: RateLimitConfig<A>) -> Self {
		Self { inner, config, timestamps: Mutex::new(VecDeque::new()) }
	}

	/// Invoke the wrapped producer, subject to the configured limit.
	pub async fn call(&self, args: A) -> Result<T> {
		let decision = {
			let mut timestamps = self.timestamps.lock().expect("rate limiter lock poisoned");
			let now = Instant::now();
			while let Some(&oldest) = timestamps.front() {
				if now.duration_since(oldest) >= self.config.window {
					timestamps.pop_front();
				} else {
					break;
				}
			}
			if timestamps.len() < self.config.max_calls as usize {
				timestamps.push_back(now);
				None
			} else {
				let next_available = *timestamps.front().expect("non-empty when at capacity") + self.config.window;
				Some(next_available)
			}
		};

		match decision {
			None => (self.inner)(args).await,
			Some(next_available) => {
				let err = Error::RateLimit { max_calls: self.config.max_calls, next_available };
				if let Some(on_limit_reached) = &self.config.on_limit_reached {
					on_limit_reached(&err, next_available, &args);
				}
				if self.config.throws {
					Err(err)
				} else {
					Ok(T::default())
				}
			},
		}
	}

	/// Convert into a [`Producer`] so this wrapper can itself be wrapped,
	/// e.g. by [`super::compose::compose_flow`].
	pub fn into_producer(self: Arc<Self>) -> Producer<A, T>
	where
		A: Clone,
	{
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

	#[tokio::test(start_paused = true)]
	async fn admits_up_to_max_calls_then_rejects() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = calls.clone();
		let inner = super::super::producer(move |_: ()| {
			let calls = calls_clone.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Ok::<u32, Error>(1)
			}
		});
		let limiter =
			RateLimit::new(inner, RateLimitConfig { max_calls: 2, window: Duration::from_millis(100), ..Default::default() });

		assert!(limiter.call(()).await.is_ok());
		assert!(limiter.call(()).await.is_ok());
		assert!(matches!(limiter.call(()).await, Err(Error::RateLimit { .. })));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn window_slides_to_readmit_after_expiry() {
		let inner = super::super::producer(|_: ()| async { Ok::<u32, Error>(1) });
		let limiter =
			RateLimit::new(inner, RateLimitConfig { max_calls: 1, window: Duration::from_millis(50), ..Default::default() });

		assert!(limiter.call(()).await.is_ok());
		assert!(limiter.call(()).await.is_err());

		tokio::time::advance(Duration::from_millis(60)).await;
		assert!(limiter.call(()).await.is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn non_throwing_limiter_returns_default_instead_of_erroring() {
		let inner = super::super::producer(|_: ()| async { Ok::<u32, Error>(7) });
		let limiter = RateLimit::new(
			inner,
			RateLimitConfig { max_calls: 1, window: Duration::from_millis(50), throws: false, ..Default::default() },
		);

		assert_eq!(limiter.call(()).await.unwrap(), 7);
		assert_eq!(limiter.call(()).await.unwrap(), 0);
	}
}
