//! Typed lifecycle event bus with exact, wildcard, and regex subscription.

// std
use std::{
	collections::HashMap,
	panic::{self, AssertUnwindSafe},
	sync::{
		atomic::{AtomicU64, Ordering},
		RwLock,
	},
};
// crates.io
use regex::Regex;
use serde_json::Value;

/// The closed set of lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EventKind {
	FetchBefore,
	FetchAfter,
	FetchResponse,
	FetchError,
	FetchAbort,
	FetchRetry,
	FetchDedupeStart,
	FetchDedupeJoin,
	FetchCacheMiss,
	FetchCacheHit,
	FetchCacheSet,
	FetchCacheStale,
	FetchCacheRevalidate,
	FetchCacheRevalidateError,
	FetchCacheExpire,
	FetchStateSet,
	FetchStateReset,
	FetchHeaderAdd,
	FetchHeaderRemove,
	FetchUrlChange,
	FetchModifyOptionsChange,
	FetchModifyMethodOptionsChange,
}
impl EventKind {
	/// The wire name used for exact-match subscription and regex testing.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::FetchBefore => "fetch-before",
			Self::FetchAfter => "fetch-after",
			Self::FetchResponse => "fetch-response",
			Self::FetchError => "fetch-error",
			Self::FetchAbort => "fetch-abort",
			Self::FetchRetry => "fetch-retry",
			Self::FetchDedupeStart => "fetch-dedupe-start",
			Self::FetchDedupeJoin => "fetch-dedupe-join",
			Self::FetchCacheMiss => "fetch-cache-miss",
			Self::FetchCacheHit => "fetch-cache-hit",
			Self::FetchCacheSet => "fetch-cache-set",
			Self::FetchCacheStale => "fetch-cache-stale",
			Self::FetchCacheRevalidate => "fetch-cache-revalidate",
			Self::FetchCacheRevalidateError => "fetch-cache-revalidate-error",
			Self::FetchCacheExpire => "fetch-cache-expire",
			Self::FetchStateSet => "fetch-state-set",
			Self::FetchStateReset => "fetch-state-reset",
			Self::FetchHeaderAdd => "fetch-header-add",
			Self::FetchHeaderRemove => "fetch-header-remove",
			Self::FetchUrlChange => "fetch-url-change",
			Self::FetchModifyOptionsChange => "fetch-modify-options-change",
			Self::FetchModifyMethodOptionsChange => "fetch-modify-method-options-change",
		}
	}
}

/// A single emitted lifecycle event.
///
/// `extra` carries the event-specific fields from the observable contract
/// (e.g. `status`/`attempt` for `fetch-error`, `key`/`isStale` for the cache
/// events) as a JSON object so the bus stays generic over event shape.
#[derive(Debug, Clone)]
pub struct Event {
	/// Which lifecycle event this is.
	pub kind: EventKind,
	/// Caller-visible request state snapshot at emission time.
	pub state: Value,
	/// HTTP method, when applicable.
	pub method: Option<String>,
	/// Absolute URL, when applicable.
	pub url: Option<String>,
	/// Composed headers, when applicable.
	pub headers: Option<HashMap<String, String>>,
	/// Request payload, when applicable.
	pub payload: Option<Value>,
	/// Event-specific extra fields, as a JSON object.
	pub extra: Value,
}
impl Event {
	/// Build a minimal event of `kind` with no payload/headers/extra data.
	pub fn new(kind: EventKind) -> Self {
		Self { kind, state: Value::Null, method: None, url: None, headers: None, payload: None, extra: Value::Null }
	}
}

enum Subscription {
	Exact(EventKind),
	Wildcard,
	Pattern(Regex),
}
impl Subscription {
	fn matches(&self, kind: EventKind) -> bool {
		match self {
			Self::Exact(k) => *k == kind,
			Self::Wildcard => true,
			Self::Pattern(re) => re.is_match(kind.as_str()),
		}
	}
}

/// Opaque handle returned by [`LifecycleEmitter::on`], used with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
	id: ListenerId,
	subscription: Subscription,
	callback: Box<dyn Fn(&Event) + Send + Sync>,
	once: bool,
}

/// Synchronous event bus: emission iterates listeners in registration order
/// and isolates panics so one faulty listener cannot break emission or
/// alter request flow.
pub struct LifecycleEmitter {
	listeners: RwLock<Vec<Listener>>,
	next_id: AtomicU64,
}
impl LifecycleEmitter {
	/// Construct an emitter with no listeners.
	pub fn new() -> Self {
		Self { listeners: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) }
	}

	/// Subscribe to an exact event kind. Returns a handle for [`Self::off`].
	pub fn on(&self, kind: EventKind, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.register(Subscription::Exact(kind), callback, false)
	}

	/// Subscribe to every event.
	pub fn on_wildcard(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.register(Subscription::Wildcard, callback, false)
	}

	/// Subscribe to every event whose wire name matches `pattern`.
	pub fn on_pattern(&self, pattern: Regex, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.register(Subscription::Pattern(pattern), callback, false)
	}

	/// Subscribe to an exact event kind for one emission only.
	pub fn once(&self, kind: EventKind, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.register(Subscription::Exact(kind), callback, true)
	}

	fn register(
		&self,
		subscription: Subscription,
		callback: impl Fn(&Event) + Send + Sync + 'static,
		once: bool,
	) -> ListenerId {
		let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.listeners
			.write()
			.expect("listener lock poisoned")
			.push(Listener { id, subscription, callback: Box::new(callback), once });
		id
	}

	/// Unsubscribe a previously registered listener. No-op if unknown.
	pub fn off(&self, id: ListenerId) {
		self.listeners.write().expect("listener lock poisoned").retain(|l| l.id != id);
	}

	/// Emit `event` synchronously to every matching listener.
	///
	/// A listener that panics is caught and dropped from the conversation
	/// (not re-registered) without interrupting the remaining listeners.
	pub fn emit(&self, event: &Event) {
		let once_ids: Vec<ListenerId> = {
			let listeners = self.listeners.read().expect("listener lock poisoned");
			let mut fired_once = Vec::new();
			for listener in listeners.iter() {
				if !listener.subscription.matches(event.kind) {
					continue;
				}
				let callback = AssertUnwindSafe(&listener.callback);
				let _ = panic::catch_unwind(|| (callback.0)(event));
				if listener.once {
					fired_once.push(listener.id);
				}
			}
			fired_once
		};
		if !once_ids.is_empty() {
			self.listeners.write().expect("listener lock poisoned").retain(|l| !once_ids.contains(&l.id));
		}
	}
}
impl Default for LifecycleEmitter {
	fn default() -> Self {
		Self::new()
	}
}
