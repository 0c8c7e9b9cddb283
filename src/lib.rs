//! Resilient async HTTP client engine with request composition, retry,
//! in-flight dedup, a stale-while-revalidate cache, and a reusable
//! flow-control toolkit (rate limit, circuit breaker, throttle, debounce,
//! batch, compose).

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod abort;
pub mod cache;
pub mod engine;
pub mod events;
pub mod flow;
pub mod http;
pub mod pipeline;
pub mod properties;
pub mod rules;

mod error;
mod key;

pub use crate::{
	engine::{EngineConfig, FetchEngine},
	error::{Error, FetchError, Result},
};

#[cfg(test)]
mod _test {
	use tokio_test as _;
	use tracing_subscriber as _;
	use wiremock as _;
}
