//! Crate-wide error types and `Result` alias.

// std
use std::fmt;
// crates.io
use reqwest::StatusCode;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the fetch engine.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Regex(#[from] regex::Error),

	#[error("Configuration error for {field}: {reason}")]
	Config { field: &'static str, reason: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
	#[error(transparent)]
	Fetch(#[from] FetchError),
	#[error("Rate limit exceeded: at most {max_calls} calls are allowed per window")]
	RateLimit { max_calls: u32, next_available: tokio::time::Instant },
	#[error("Circuit breaker tripped")]
	CircuitOpen,
	/// An error that originated on another task (a throttle's cached outcome,
	/// or the producer another caller joined via inflight dedup) and is being
	/// re-surfaced here. Flattened to its message since the originating error
	/// may wrap a non-`Clone` type such as [`reqwest::Error`].
	#[error("{0}")]
	Shared(String),
}

/// Error envelope surfaced to callers for a failed or aborted request.
///
/// Mirrors the `FetchError` shape of the specification: status codes are
/// synthesized for non-HTTP conditions (499 for abort/timeout), and the
/// attempt number that produced the error is always recorded.
#[derive(Debug, Clone)]
pub struct FetchError {
	/// HTTP status, real or synthesized (499 for abort/timeout).
	pub status: u16,
	/// Best-effort decoded response body, if any.
	pub data: Option<serde_json::Value>,
	/// 1-based attempt number that produced this error.
	pub attempt: u32,
	/// HTTP method of the request that failed.
	pub method: String,
	/// Absolute URL of the request that failed.
	pub url: String,
	/// Whether the request was aborted (caller cancellation or timeout).
	pub aborted: bool,
	/// Underlying cause, if the failure originated below the HTTP layer.
	pub cause: Option<String>,
}
impl FetchError {
	/// Synthesize a 499 abort/timeout error.
	pub fn aborted(method: impl Into<String>, url: impl Into<String>, attempt: u32) -> Self {
		Self {
			status: 499,
			data: None,
			attempt,
			method: method.into(),
			url: url.into(),
			aborted: true,
			cause: None,
		}
	}

	/// Build an error from a real upstream HTTP status.
	pub fn from_status(
		status: StatusCode,
		data: Option<serde_json::Value>,
		attempt: u32,
		method: impl Into<String>,
		url: impl Into<String>,
	) -> Self {
		Self {
			status: status.as_u16(),
			data,
			attempt,
			method: method.into(),
			url: url.into(),
			aborted: false,
			cause: None,
		}
	}

	/// Build a synthetic network-failure error (no HTTP status available).
	pub fn network(
		cause: impl Into<String>,
		attempt: u32,
		method: impl Into<String>,
		url: impl Into<String>,
	) -> Self {
		Self {
			status: 599,
			data: None,
			attempt,
			method: method.into(),
			url: url.into(),
			aborted: false,
			cause: Some(cause.into()),
		}
	}
}
impl fmt::Display for FetchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{method} {url} failed on attempt {attempt} with status {status}{cause}",
			method = self.method,
			url = self.url,
			attempt = self.attempt,
			status = self.status,
			cause = self.cause.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
		)
	}
}
impl std::error::Error for FetchError {}
