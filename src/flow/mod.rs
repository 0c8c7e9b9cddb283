//! Flow-control toolkit: rate limiting, throttling, debouncing, circuit
//! breaking, in-flight dedup, batching, and composition of the above.
//!
//! Every primitive wraps a *producer* — an async function from some
//! argument type `A` to `Result<T>` — and returns a new value with the same
//! call shape plus primitive-specific helper methods. Rust has no runtime
//! function-wrapping, so "same call signature" is expressed here as a
//! boxed, type-erased [`Producer`]; each primitive both accepts one as its
//! inner callable and can be converted back into one via `into_producer`,
//! which is what lets [`compose::compose_flow`] chain heterogeneous
//! primitives.

pub mod batch;
pub mod circuit_breaker;
pub mod compose;
pub mod debounce;
pub mod inflight;
pub mod rate_limit;
pub mod throttle;

// std
use std::sync::Arc;
// crates.io
pub use futures::future::BoxFuture;
// self
use crate::Result;

/// A type-erased async producer: the common call shape every flow-control
/// primitive wraps and re-exposes.
pub type Producer<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Wrap a plain async closure as a [`Producer`].
pub fn producer<A, T, F, Fut>(f: F) -> Producer<A, T>
where
	F: Fn(A) -> Fut + Send + Sync + 'static,
	Fut: std::future::Future<Output = Result<T>> + Send + 'static,
{
	Arc::new(move |args: A| Box::pin(f(args)) as BoxFuture<'static, Result<T>>)
}
