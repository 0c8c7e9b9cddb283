//! `FetchEngine`: a single-bound facade wiring a validated [`EngineConfig`]
//! to a [`RequestPipeline`].

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use reqwest::Client;
use serde_json::Value;
use tokio::time::Duration;
use url::Url;
// self
use crate::{
	abort::AbortableRequest,
	cache::{CacheStats, KeyMatcher},
	error::Error,
	events::{Event, EventKind, ListenerId, LifecycleEmitter},
	http::RetryConfig,
	pipeline::{CachePolicyConfig, DedupPolicyConfig, ModifyOptions, RequestContext, RequestPipeline, ResponseEnvelope, ValidateHooks},
	properties::{reject_dangerous_keys, PropertyStore, Validator},
	Result,
};

const KNOWN_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Constructor-time configuration for a [`FetchEngine`].
///
/// Validated synchronously and exhaustively at [`FetchEngine::new`]; a
/// misconfigured engine never gets constructed.
pub struct EngineConfig {
	/// Base URL every request path is joined against.
	pub base_url: String,
	/// Method used when a call site doesn't pick one explicitly.
	pub default_method: String,
	/// Default headers, optionally keyed per method.
	pub headers: HashMap<String, String>,
	/// Per-method header overrides, layered over `headers`.
	pub method_headers: HashMap<String, HashMap<String, String>>,
	/// Default query parameters, optionally keyed per method.
	pub params: HashMap<String, String>,
	/// Per-method param overrides, layered over `params`.
	pub method_params: HashMap<String, HashMap<String, String>>,
	/// Initial engine-visible state.
	pub initial_state: Value,
	/// Per-attempt timeout absent a per-call override.
	pub default_timeout: Duration,
	/// Retry policy absent a per-call override.
	pub default_retry: RetryConfig,
	/// `modifyOptions` hook, run on every composed request.
	pub modify_options: Option<ModifyOptions>,
	/// `modifyMethodOptions[method]` hooks, run after `modify_options`.
	pub modify_method_options: HashMap<String, ModifyOptions>,
	/// Composition-time validation hooks.
	pub validate: ValidateHooks,
	/// `cachePolicy`; `None` disables caching.
	pub cache_policy: Option<CachePolicyConfig>,
	/// `dedupePolicy`; `None` disables in-flight dedup.
	pub dedup_policy: Option<DedupPolicyConfig>,
	/// Transport client. Defaults to `Client::new()` when absent from a builder.
	pub client: Client,
}
impl EngineConfig {
	/// A config with an empty base URL, GET default method, no policies, and
	/// a fresh `reqwest::Client`. Callers are expected to at least set
	/// `base_url` before use.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			default_method: "GET".to_string(),
			headers: HashMap::new(),
			method_headers: HashMap::new(),
			params: HashMap::new(),
			method_params: HashMap::new(),
			initial_state: Value::Object(Default::default()),
			default_timeout: Duration::from_secs(30),
			default_retry: RetryConfig::disabled(),
			modify_options: None,
			modify_method_options: HashMap::new(),
			validate: ValidateHooks::default(),
			cache_policy: None,
			dedup_policy: None,
			client: Client::new(),
		}
	}

	/// Validate every field, failing fast on the first violation.
	fn validate(&self) -> Result<()> {
		let url = Url::parse(&self.base_url).map_err(|_| Error::Validation {
			field: "base_url",
			reason: format!("'{}' is not a valid absolute URL.", self.base_url),
		})?;
		if url.host_str().is_none() {
			return Err(Error::Validation { field: "base_url", reason: "Must include a host component.".into() });
		}

		let method = self.default_method.to_ascii_uppercase();
		if !KNOWN_METHODS.contains(&method.as_str()) {
			return Err(Error::Validation {
				field: "default_method",
				reason: format!("'{}' is not a recognized HTTP method.", self.default_method),
			});
		}

		for (name, entries) in std::iter::once((None, &self.headers)).chain(self.method_headers.iter().map(|(m, e)| (Some(m.as_str()), e))) {
			reject_dangerous_keys(entries).map_err(|_| Error::Validation {
				field: "headers",
				reason: format!("header map{} contains a disallowed key.", name.map(|m| format!(" for method {m}")).unwrap_or_default()),
			})?;
		}

		if self.default_timeout.is_zero() {
			return Err(Error::Validation { field: "default_timeout", reason: "Must be greater than zero.".into() });
		}

		for known in self.method_headers.keys().chain(self.method_params.keys()).chain(self.modify_method_options.keys()) {
			if !KNOWN_METHODS.contains(&known.to_ascii_uppercase().as_str()) {
				return Err(Error::Validation {
					field: "method_headers/method_params/modify_method_options",
					reason: format!("'{known}' is not a recognized HTTP method."),
				});
			}
		}

		Ok(())
	}
}

/// Single-tenant facade over one [`RequestPipeline`]: per-method request
/// sugar, live change-operations, cache administration, and teardown.
pub struct FetchEngine {
	pipeline: Arc<RequestPipeline>,
	emitter: Arc<LifecycleEmitter>,
}
impl FetchEngine {
	/// Validate `config`, then build the engine and its pipeline.
	pub fn new(config: EngineConfig) -> Result<Self> {
		config.validate()?;

		let base_url = Url::parse(&config.base_url)?;

		let mut headers = PropertyStore::new().with_validator(header_validator());
		headers.set(config.headers, None)?;
		for (method, entries) in config.method_headers {
			headers.set(entries, Some(&method))?;
		}

		let mut params = PropertyStore::new();
		params.set(config.params, None)?;
		for (method, entries) in config.method_params {
			params.set(entries, Some(&method))?;
		}

		let emitter = Arc::new(LifecycleEmitter::new());
		let pipeline = RequestPipeline::new(
			base_url,
			config.client,
			headers,
			params,
			config.initial_state,
			config.validate,
			config.modify_options,
			config.default_timeout,
			config.default_retry,
			config.cache_policy,
			config.dedup_policy,
			emitter.clone(),
		)?;

		for (method, hook) in config.modify_method_options {
			pipeline.modify_method_options.write().expect("modify method options lock poisoned").insert(method.to_ascii_uppercase(), hook);
		}

		Ok(Self { pipeline, emitter })
	}

	fn request(&self, method: &str, path: impl Into<String>, payload: Option<Value>) -> AbortableRequest<Result<ResponseEnvelope>> {
		let ctx = RequestContext { method: method.to_string(), path: path.into(), payload, ..Default::default() };
		self.pipeline.execute(ctx)
	}

	/// Compose and execute `ctx` directly, for callers who need header/param/
	/// timeout/retry/abort-controller overrides beyond the per-method sugar.
	pub fn execute(&self, ctx: RequestContext) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.pipeline.execute(ctx)
	}

	/// `GET path`.
	pub fn get(&self, path: impl Into<String>) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("GET", path, None)
	}

	/// `HEAD path`.
	pub fn head(&self, path: impl Into<String>) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("HEAD", path, None)
	}

	/// `OPTIONS path`. Named `options_` since `options` collides with nothing
	/// in Rust but reads oddly as a bare verb next to `get`/`post`.
	pub fn options_(&self, path: impl Into<String>) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("OPTIONS", path, None)
	}

	/// `POST path` with a JSON body.
	pub fn post(&self, path: impl Into<String>, payload: Value) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("POST", path, Some(payload))
	}

	/// `PUT path` with a JSON body.
	pub fn put(&self, path: impl Into<String>, payload: Value) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("PUT", path, Some(payload))
	}

	/// `PATCH path` with a JSON body.
	pub fn patch(&self, path: impl Into<String>, payload: Value) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("PATCH", path, Some(payload))
	}

	/// `DELETE path`, with an optional JSON body.
	pub fn delete(&self, path: impl Into<String>, payload: Option<Value>) -> AbortableRequest<Result<ResponseEnvelope>> {
		self.request("DELETE", path, payload)
	}

	/// Merge `entries` into the default header layer, or `method`'s layer if given.
	pub fn add_header(&self, entries: HashMap<String, String>, method: Option<&str>) -> Result<()> {
		let mut headers = self.pipeline.headers.write().expect("header store lock poisoned");
		headers.set(entries.clone(), method)?;
		drop(headers);
		self.emitter.emit(&Event { extra: serde_json::json!({ "method": method, "keys": entries.keys().collect::<Vec<_>>() }), ..Event::new(EventKind::FetchHeaderAdd) });
		Ok(())
	}

	/// Remove `keys` from the default header layer, or `method`'s layer if given.
	pub fn rm_header(&self, keys: &[String], method: Option<&str>) {
		self.pipeline.headers.write().expect("header store lock poisoned").remove(keys, method);
		self.emitter.emit(&Event { extra: serde_json::json!({ "method": method, "keys": keys }), ..Event::new(EventKind::FetchHeaderRemove) });
	}

	/// Whether `key` is present in the effective header view for `method`.
	pub fn has_header(&self, key: &str, method: Option<&str>) -> bool {
		self.pipeline.headers.read().expect("header store lock poisoned").has(key, method)
	}

	/// Merge `entries` into the default param layer, or `method`'s layer if given.
	pub fn add_param(&self, entries: HashMap<String, String>, method: Option<&str>) -> Result<()> {
		self.pipeline.params.write().expect("param store lock poisoned").set(entries, method)
	}

	/// Remove `keys` from the default param layer, or `method`'s layer if given.
	pub fn rm_params(&self, keys: &[String], method: Option<&str>) {
		self.pipeline.params.write().expect("param store lock poisoned").remove(keys, method);
	}

	/// Overwrite the engine-visible state, emitting `fetch-state-set`.
	pub fn set_state(&self, state: Value) {
		*self.pipeline.state.write().expect("state lock poisoned") = state.clone();
		self.emitter.emit(&Event { state, ..Event::new(EventKind::FetchStateSet) });
	}

	/// Reset state to the constructor's `initial_state`, emitting `fetch-state-reset`.
	pub fn reset_state(&self) {
		*self.pipeline.state.write().expect("state lock poisoned") = self.pipeline.initial_state.clone();
		self.emitter.emit(&Event::new(EventKind::FetchStateReset));
	}

	/// A clone of the current engine-visible state.
	pub fn get_state(&self) -> Value {
		self.pipeline.state.read().expect("state lock poisoned").clone()
	}

	/// Change the base URL future requests are joined against.
	pub fn change_base_url(&self, base_url: impl AsRef<str>) -> Result<()> {
		let url = Url::parse(base_url.as_ref())?;
		*self.pipeline.base_url.write().expect("base url lock poisoned") = url.clone();
		self.emitter.emit(&Event { extra: serde_json::json!({ "baseUrl": url.to_string() }), ..Event::new(EventKind::FetchUrlChange) });
		Ok(())
	}

	/// Replace the global `modifyOptions` hook.
	pub fn change_modify_options(&self, hook: Option<ModifyOptions>) {
		*self.pipeline.modify_options.write().expect("modify options lock poisoned") = hook;
		self.emitter.emit(&Event::new(EventKind::FetchModifyOptionsChange));
	}

	/// Replace the `modifyMethodOptions[method]` hook, or remove it if `hook` is `None`.
	pub fn change_modify_method_options(&self, method: &str, hook: Option<ModifyOptions>) {
		let method = method.to_ascii_uppercase();
		let mut table = self.pipeline.modify_method_options.write().expect("modify method options lock poisoned");
		match hook {
			Some(hook) => {
				table.insert(method, hook);
			},
			None => {
				table.remove(&method);
			},
		}
		drop(table);
		self.emitter.emit(&Event::new(EventKind::FetchModifyMethodOptionsChange));
	}

	/// Subscribe to lifecycle events. See [`LifecycleEmitter::on`].
	pub fn on(&self, kind: EventKind, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.emitter.on(kind, callback)
	}

	/// Unsubscribe a listener previously returned by [`Self::on`].
	pub fn off(&self, id: ListenerId) {
		self.emitter.off(id);
	}

	/// `{cacheSize, inflightCount}` for the pipeline's cache store.
	pub async fn cache_stats(&self) -> CacheStats {
		self.pipeline.cache_store.stats().await
	}

	/// Drop every cache entry.
	pub async fn clear_cache(&self) {
		self.pipeline.cache_store.clear().await;
	}

	/// Remove one cache entry by exact key. Returns whether it was present.
	pub async fn delete_cache(&self, key: &str) -> bool {
		self.pipeline.cache_store.delete(key).await
	}

	/// Remove every cache entry matching `matcher`. Returns the count removed.
	pub async fn invalidate_cache(&self, matcher: KeyMatcher) -> usize {
		self.pipeline.cache_store.invalidate(matcher).await
	}

	/// Alias of [`Self::invalidate_cache`] for path-shaped matchers.
	pub async fn invalidate_path(&self, matcher: KeyMatcher) -> usize {
		self.pipeline.cache_store.invalidate_path(matcher).await
	}

	/// Tear the engine down: clears the cache and cancels bookkeeping for any
	/// in-flight background revalidation. In-flight HTTP requests already
	/// under way are not forcibly cancelled; bind them to an
	/// [`crate::abort::AbortController`] for that.
	pub async fn destroy(&self) {
		self.pipeline.cache_store.destroy().await;
	}
}

fn header_validator() -> Validator {
	Box::new(|entries, _method| reject_dangerous_keys(entries))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> EngineConfig {
		EngineConfig::new("https://api.example.com")
	}

	#[test]
	fn rejects_an_invalid_base_url() {
		let mut config = config();
		config.base_url = "not a url".to_string();
		assert!(FetchEngine::new(config).is_err());
	}

	#[test]
	fn rejects_an_unknown_default_method() {
		let mut config = config();
		config.default_method = "FETCH".to_string();
		assert!(FetchEngine::new(config).is_err());
	}

	#[test]
	fn rejects_dangerous_header_keys() {
		let mut config = config();
		config.headers.insert("__proto__".to_string(), "x".to_string());
		assert!(FetchEngine::new(config).is_err());
	}

	#[test]
	fn rejects_a_zero_default_timeout() {
		let mut config = config();
		config.default_timeout = Duration::ZERO;
		assert!(FetchEngine::new(config).is_err());
	}

	#[test]
	fn accepts_a_well_formed_config() {
		assert!(FetchEngine::new(config()).is_ok());
	}

	#[tokio::test]
	async fn reset_state_restores_the_constructor_default_not_null() {
		let mut config = config();
		config.initial_state = serde_json::json!({ "tenant": "acme" });
		let engine = FetchEngine::new(config).unwrap();
		assert_eq!(engine.get_state(), serde_json::json!({ "tenant": "acme" }));

		engine.set_state(serde_json::json!({ "a": 1 }));
		assert_eq!(engine.get_state(), serde_json::json!({ "a": 1 }));

		engine.reset_state();
		assert_eq!(engine.get_state(), serde_json::json!({ "tenant": "acme" }));
	}

	#[test]
	fn change_base_url_rejects_an_invalid_url() {
		let engine = FetchEngine::new(config()).unwrap();
		assert!(engine.change_base_url("not a url").is_err());
	}

	#[tokio::test]
	async fn cache_stats_start_empty() {
		let engine = FetchEngine::new(config()).unwrap();
		let stats = engine.cache_stats().await;
		assert_eq!(stats.cache_size, 0);
		assert_eq!(stats.inflight_count, 0);
	}
}
