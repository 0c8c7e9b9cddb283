//! Wire-level HTTP transport: the actual `reqwest` call plus retry bookkeeping.

pub mod client;
pub mod retry;

pub use client::{fetch, RawResponse};
pub use retry::{JitterStrategy, RetryConfig, RetryDecision, RetryExecutor};
