//! Closed → open → half-open circuit breaker.

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Closed,
	Open,
	HalfOpen,
}

/// Configuration for [`CircuitBreaker`].
pub struct CircuitBreakerConfig {
	/// Consecutive tripping failures before the circuit opens.
	pub max_failures: u32,
	/// How long the circuit stays open before trying a half-open probe.
	pub reset_after: Duration,
	/// Decides whether an error counts toward tripping the breaker.
	/// Defaults to "every error counts".
	pub should_trip_on_error: Option<Arc<dyn Fn(&Error) -> bool + Send + Sync>>,
}
impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self { max_failures: 5, reset_after: Duration::from_secs(30), should_trip_on_error: None }
	}
}

struct BreakerState {
	kind: State,
	failures: u32,
	opened_at: Option<Instant>,
}

/// Breaks the circuit after `max_failures` tripping errors; rejects calls
/// immediately while open; after `reset_after` admits exactly one probe
/// call, closing on success or reopening on failure.
pub struct CircuitBreaker<A, T> {
	inner: Producer<A, T>,
	config: CircuitBreakerConfig,
	state: Mutex<BreakerState>,
}
impl<A, T> CircuitBreaker<A, T>
where
	A: Send + Sync + 'static,
	T: Send + Sync + 'static,
{
	/// Wrap `inner` with a circuit breaker.
	pub fn new(inner: Producer<A, T>, config: CircuitBreakerConfig) -> Self {
		Self { inner, config, state: Mutex::new(BreakerState { kind: State::Closed, failures: 0, opened_at: None }) }
	}

	/// Invoke the wrapped producer, subject to the breaker's state.
	pub async fn call(&self, args: A) -> Result<T> {
		{
			let mut state = self.state.lock().await;
			if state.kind == State::Open {
				let elapsed = state.opened_at.map(|opened_at| opened_at.elapsed() >= self.config.reset_after).unwrap_or(false);
				if elapsed {
					state.kind = State::HalfOpen;
				} else {
					return Err(Error::CircuitOpen);
				}
			}
		}

		let result = (self.inner)(args).await;

		let mut state = self.state.lock().await;
		match &result {
			Ok(_) => {
				state.kind = State::Closed;
				state.failures = 0;
				state.opened_at = None;
			},
			Err(err) => {
				let trips = self.config.should_trip_on_error.as_ref().map(|f| f(err)).unwrap_or(true);
				if trips {
					match state.kind {
						State::HalfOpen => {
							state.kind = State::Open;
							state.opened_at = Some(Instant::now());
						},
						_ => {
							state.failures += 1;
							if state.failures >= self.config.max_failures {
								state.kind = State::Open;
								state.opened_at = Some(Instant::now());
							}
						},
					}
				}
			},
		}

		result
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

	fn upstream_failure() -> Error {
		Error::Config { field: "upstream", reason: "boom".into() }
	}

	fn failing() -> Producer<(), u32> {
		super::super::producer(|_: ()| async { Err::<u32, Error>(upstream_failure()) })
	}

	#[tokio::test(start_paused = true)]
	async fn opens_after_max_failures_and_rejects_immediately() {
		let breaker = CircuitBreaker::new(failing(), CircuitBreakerConfig { max_failures: 2, ..Default::default() });

		assert!(breaker.call(()).await.is_err());
		assert!(breaker.call(()).await.is_err());
		// Third call should be rejected by the breaker itself, not the inner producer.
		assert!(matches!(breaker.call(()).await, Err(Error::CircuitOpen)));
	}

	#[tokio::test(start_paused = true)]
	async fn half_open_probe_closes_the_circuit_on_success() {
		let succeed_next = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let succeed_next_clone = succeed_next.clone();
		let inner = super::super::producer(move |_: ()| {
			let succeed = succeed_next_clone.clone();
			async move {
				if succeed.load(std::sync::atomic::Ordering::SeqCst) {
					Ok::<u32, Error>(1)
				} else {
					Err(upstream_failure())
				}
			}
		});
		let breaker = CircuitBreaker::new(
			inner,
			CircuitBreakerConfig { max_failures: 1, reset_after: Duration::from_millis(50), ..Default::default() },
		);

		assert!(breaker.call(()).await.is_err());
		assert!(matches!(breaker.call(()).await, Err(Error::CircuitOpen)));

		tokio::time::advance(Duration::from_millis(60)).await;
		succeed_next.store(true, std::sync::atomic::Ordering::SeqCst);
		assert!(breaker.call(()).await.is_ok());

		// Closed again: a subsequent failure is the real upstream error, not
		// an immediate breaker rejection.
		succeed_next.store(false, std::sync::atomic::Ordering::SeqCst);
		assert!(matches!(breaker.call(()).await, Err(Error::Config { .. })));
	}
}
