//! Attempt budgeting and backoff computation for [`crate::pipeline::RequestPipeline`].

// std
use std::sync::Arc;
// crates.io
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
// self
use crate::error::FetchError;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JitterStrategy {
	/// No jitter; deterministic backoff schedule.
	#[default]
	None,
	/// Full jitter: uniformly random between 80% of the computed delay and
	/// the delay itself, per AWS's backoff-and-jitter guidance.
	Full,
}

/// What a retry decision resolves to.
#[derive(Clone, Copy)]
pub enum RetryDecision {
	/// Retry using the computed backoff delay.
	Retry,
	/// Retry after exactly this delay, overriding the computed backoff.
	RetryAfter(Duration),
	/// Do not retry; propagate the error.
	DoNotRetry,
}

/// Retry configuration. Disabled by default — construct via
/// [`RetryConfig::enabled`] for the `retry: true` shorthand, or set fields
/// directly for an explicit config.
pub struct RetryConfig {
	/// Maximum attempts, 1-based (`3` means up to two retries).
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub base_delay: Duration,
	/// Upper bound on any computed delay.
	pub max_delay: Option<Duration>,
	/// Whether delay doubles per attempt.
	pub use_exponential_backoff: bool,
	/// Status codes that gate retry when `should_retry` is absent.
	pub retryable_status_codes: Option<Vec<u16>>,
	/// Overrides the status-code gate when present; wins over it.
	pub should_retry: Option<Arc<dyn Fn(&FetchError) -> RetryDecision + Send + Sync>>,
	/// Randomization applied on top of the computed delay.
	pub jitter: JitterStrategy,
}
impl RetryConfig {
	/// The `retry: true` shorthand: three attempts, doubling backoff from
	/// 300ms, no status-code or predicate gating (retry any non-aborted
	/// error), no jitter.
	pub fn enabled() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(300),
			max_delay: None,
			use_exponential_backoff: true,
			retryable_status_codes: None,
			should_retry: None,
			jitter: JitterStrategy::None,
		}
	}

	/// The `retry: false`/absent shorthand: exactly one attempt, never retried.
	pub fn disabled() -> Self {
		Self {
			max_attempts: 1,
			base_delay: Duration::ZERO,
			max_delay: None,
			use_exponential_backoff: false,
			retryable_status_codes: None,
			should_retry: None,
			jitter: JitterStrategy::None,
		}
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self::disabled()
	}
}

/// Drives attempt numbering (1-based) and backoff computation for one
/// request's retry cycle.
pub struct RetryExecutor<'a> {
	config: &'a RetryConfig,
	attempts_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Create an executor bound to `config`.
	pub fn new(config: &'a RetryConfig) -> Self {
		Self { config, attempts_used: 0 }
	}

	/// Mark the start of a new attempt, returning its 1-based number.
	pub fn begin_attempt(&mut self) -> u32 {
		self.attempts_used += 1;
		self.attempts_used
	}

	/// Whether another attempt is permitted under `max_attempts`.
	pub fn can_retry(&self) -> bool {
		self.attempts_used < self.config.max_attempts
	}

	/// Decide whether `err` (from the most recent attempt) should be
	/// retried. Abort/timeout errors are never retryable. `should_retry`,
	/// when present, wins over `retryable_status_codes`; absent both, any
	/// non-aborted error is retryable.
	pub fn decide(&self, err: &FetchError) -> RetryDecision {
		if err.aborted {
			return RetryDecision::DoNotRetry;
		}
		if let Some(should_retry) = &self.config.should_retry {
			return should_retry(err);
		}
		match &self.config.retryable_status_codes {
			Some(codes) if codes.contains(&err.status) => RetryDecision::Retry,
			Some(_) => RetryDecision::DoNotRetry,
			None => RetryDecision::Retry,
		}
	}

	/// Compute the backoff delay for the attempt just completed
	/// (`attempts_used`), honoring a `RetryAfter` override. `RetryAfter` and
	/// jitter are mutually exclusive: an explicit override is never randomized.
	pub fn backoff_for(&self, decision: RetryDecision) -> Duration {
		let delay = match decision {
			RetryDecision::RetryAfter(delay) => delay,
			_ => {
				let raw = if self.config.use_exponential_backoff {
					let exponent = self.attempts_used.saturating_sub(1);
					let raw = self.config.base_delay.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX).max(1));
					self.config.max_delay.map(|max| raw.min(max)).unwrap_or(raw)
				} else {
					self.config.base_delay
				};
				apply_jitter(raw, self.config.jitter)
			},
		};
		tracing::debug!(attempt = self.attempts_used, ?delay, "retry backoff computed");
		delay
	}

	/// Sleep for `delay`.
	pub async fn sleep_backoff(&self, delay: Duration) {
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
	}
}

fn apply_jitter(delay: Duration, strategy: JitterStrategy) -> Duration {
	match strategy {
		JitterStrategy::None => delay,
		JitterStrategy::Full => {
			if delay.is_zero() {
				return delay;
			}
			let lower = delay.mul_f64(0.8);
			let span = (delay.as_nanos() - lower.as_nanos()).min(u64::MAX as u128) as u64;
			let jitter = rand::rng().random_range(0..=span);

			lower + Duration::from_nanos(jitter)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn err(status: u16, aborted: bool) -> FetchError {
		FetchError { status, data: None, attempt: 1, method: "GET".into(), url: "http://h/x".into(), aborted, cause: None }
	}

	#[test]
	fn attempts_count_up_from_one_and_respect_max() {
		let config = RetryConfig { max_attempts: 2, ..RetryConfig::enabled() };
		let mut executor = RetryExecutor::new(&config);
		assert_eq!(executor.begin_attempt(), 1);
		assert!(executor.can_retry());
		assert_eq!(executor.begin_attempt(), 2);
		assert!(!executor.can_retry());
	}

	#[test]
	fn aborted_errors_are_never_retried() {
		let config = RetryConfig::enabled();
		let executor = RetryExecutor::new(&config);
		assert!(matches!(executor.decide(&err(499, true)), RetryDecision::DoNotRetry));
	}

	#[test]
	fn retryable_status_codes_gate_when_should_retry_is_absent() {
		let config = RetryConfig { retryable_status_codes: Some(vec![502, 503]), ..RetryConfig::enabled() };
		let executor = RetryExecutor::new(&config);
		assert!(matches!(executor.decide(&err(503, false)), RetryDecision::Retry));
		assert!(matches!(executor.decide(&err(400, false)), RetryDecision::DoNotRetry));
	}

	#[test]
	fn should_retry_wins_over_status_code_list() {
		let config = RetryConfig {
			retryable_status_codes: Some(vec![502]),
			should_retry: Some(Arc::new(|e: &FetchError| if e.status == 400 { RetryDecision::Retry } else { RetryDecision::DoNotRetry })),
			..RetryConfig::enabled()
		};
		let executor = RetryExecutor::new(&config);
		assert!(matches!(executor.decide(&err(400, false)), RetryDecision::Retry));
		assert!(matches!(executor.decide(&err(502, false)), RetryDecision::DoNotRetry));
	}

	#[test]
	fn exponential_backoff_is_bounded_by_max_delay() {
		let config = RetryConfig {
			base_delay: Duration::from_millis(100),
			max_delay: Some(Duration::from_millis(250)),
			use_exponential_backoff: true,
			max_attempts: 5,
			..RetryConfig::enabled()
		};
		let mut executor = RetryExecutor::new(&config);
		executor.begin_attempt();
		assert_eq!(executor.backoff_for(RetryDecision::Retry), Duration::from_millis(100));
		executor.begin_attempt();
		assert_eq!(executor.backoff_for(RetryDecision::Retry), Duration::from_millis(200));
		executor.begin_attempt();
		assert_eq!(executor.backoff_for(RetryDecision::Retry), Duration::from_millis(250));
	}
}
