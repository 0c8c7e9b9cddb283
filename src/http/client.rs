//! Thin wrapper over the platform HTTP primitive (`reqwest`), bound to an
//! [`AbortSignal`] and a per-attempt timeout.

// std
use std::collections::HashMap;
// crates.io
use reqwest::{Client, Method};
use tokio::time::Duration;
// self
use crate::{
	abort::AbortSignal,
	error::FetchError,
	Result,
};

/// The wire-level outcome of one fetch attempt, before any JSON decoding.
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers, lower-cased for case-insensitive lookup.
	pub headers: HashMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
}

/// Execute one HTTP attempt: `method url` with `headers` and an optional
/// `body`, bound to `timeout` and `signal`.
///
/// A timeout or caller-driven cancellation both race the same way: whichever
/// resolves first wins, and cancellation always yields a
/// [`FetchError::aborted`] regardless of which one fired, matching "timeout
/// is the effective per-attempt deadline; expiry calls abort() and yields
/// status 499".
pub async fn fetch(
	client: &Client,
	method: &str,
	url: &str,
	headers: &HashMap<String, String>,
	body: Option<Vec<u8>>,
	timeout: Duration,
	signal: &AbortSignal,
	attempt: u32,
) -> Result<RawResponse> {
	let reqwest_method = Method::from_bytes(method.as_bytes())
		.map_err(|_| FetchError::network(format!("invalid method {method}"), attempt, method, url))?;

	tracing::debug!(method, url, attempt, "sending http request");

	let mut builder = client.request(reqwest_method, url).timeout(timeout);
	for (name, value) in headers {
		builder = builder.header(name, value);
	}
	if let Some(body) = body {
		builder = builder.body(body);
	}

	tokio::select! {
		biased;
		_ = signal.cancelled() => Err(FetchError::aborted(method, url, attempt).into()),
		result = builder.send() => {
			match result {
				Ok(response) => {
					let status = response.status().as_u16();
					let headers = response
						.headers()
						.iter()
						.filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string())))
						.collect();
					let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
					Ok(RawResponse { status, headers, body })
				},
				Err(err) if err.is_timeout() => Err(FetchError::aborted(method, url, attempt).into()),
				Err(err) => Err(FetchError::network(err.to_string(), attempt, method, url).into()),
			}
		}
	}
}
