//! TTL + stale-window cache with SWR revalidation (component `CacheStore`).

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, Freshness};
pub use store::{CacheRead, CacheStats, CacheStore, KeyMatcher, SwrHooks};
