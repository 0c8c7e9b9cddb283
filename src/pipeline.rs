//! Compose → cache-check → dedup-check → attempt → classify → events.
//!
//! The heart of the crate: one state machine per outbound request, driving
//! composition, the stale-while-revalidate cache, in-flight dedup, retry,
//! and lifecycle emission in the order fixed by the request lifecycle.

// std
use std::{
	collections::HashMap,
	sync::{Arc, RwLock as StdRwLock},
};
// crates.io
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::time::Duration;
use url::Url;
// self
use crate::{
	abort::{AbortController, AbortableRequest},
	cache::{CacheStore, SwrHooks},
	error::{Error, FetchError},
	events::{Event, EventKind, LifecycleEmitter},
	flow::inflight::{InflightConfig, InflightDedup},
	http::{self, RawResponse, RetryConfig, RetryDecision, RetryExecutor},
	key::fingerprint_parts,
	properties::PropertyStore,
	rules::{PolicyRule, RuleContext, RuleResolver},
	Result,
};

/// Input to one call through the pipeline.
#[derive(Clone, Default)]
pub struct RequestContext {
	/// HTTP method.
	pub method: String,
	/// Request path, joined against the engine's base URL.
	pub path: String,
	/// Per-call header overrides.
	pub headers: HashMap<String, String>,
	/// Per-call query parameters.
	pub params: HashMap<String, String>,
	/// Request payload, encoded per `determineType` (JSON, here).
	pub payload: Option<Value>,
	/// Per-attempt timeout override.
	pub timeout: Option<Duration>,
	/// Per-call retry override.
	pub retry: Option<RetryConfig>,
	/// Caller-supplied abort controller; shared across any other request
	/// bound to the same handle.
	pub abort_controller: Option<AbortController>,
}

/// Immutable snapshot of a request after composition.
#[derive(Clone)]
pub struct ResolvedRequest {
	/// Normalized (upper-case) HTTP method.
	pub method: String,
	/// Path as given by the caller, pre-join; used for rule matching.
	pub path: String,
	/// Absolute URL.
	pub url: String,
	/// Composed headers.
	pub headers: HashMap<String, String>,
	/// Encoded body, if any.
	pub body: Option<Vec<u8>>,
	/// Frozen snapshot of engine state at compose time.
	pub state: Value,
	/// Abort handle bound to this request.
	pub controller: AbortController,
}

/// `{data, headers, status}` returned to callers on success.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
	/// Decoded body; `None` for empty (204 or zero-length) responses.
	pub data: Option<Value>,
	/// Response headers, lower-cased keys.
	pub headers: HashMap<String, String>,
	/// HTTP status code.
	pub status: u16,
}

/// `validate.{headers,params,state}` composition hooks.
#[derive(Default, Clone)]
pub struct ValidateHooks {
	/// Runs against the composed header map before a request is sent.
	pub headers: Option<Arc<dyn Fn(&HashMap<String, String>, &str) -> Result<()> + Send + Sync>>,
	/// Runs against the composed param map before a request is sent.
	pub params: Option<Arc<dyn Fn(&HashMap<String, String>, &str) -> Result<()> + Send + Sync>>,
	/// Runs against the state snapshot at compose time.
	pub state: Option<Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>>,
}

/// `modifyOptions(opts, state)` / `modifyMethodOptions[method](opts, state)`.
pub type ModifyOptions = Arc<dyn Fn(&mut ResolvedRequest, &Value) + Send + Sync>;

/// Per-rule TTL/staleIn override; `None` fields fall back to the policy default.
#[derive(Clone, Copy, Default)]
pub struct CacheRuleOverride {
	/// Override for the matched rule's TTL.
	pub ttl: Option<Duration>,
	/// Override for the matched rule's stale window.
	pub stale_in: Option<Duration>,
}

/// `cachePolicy` configuration.
pub struct CachePolicyConfig {
	/// Method whitelist; defaults to `["GET"]` when constructed via [`Self::new`].
	pub methods: Vec<String>,
	/// Default TTL applied absent a matching rule override.
	pub ttl: Duration,
	/// Default stale window applied absent a matching rule override.
	pub stale_in: Option<Duration>,
	/// Bypasses the cache entirely when it returns `true`.
	pub skip: Option<Arc<dyn Fn(&RuleContext) -> bool + Send + Sync>>,
	/// Overrides the default (method, url) fingerprint used as the cache key.
	pub serializer: Option<Arc<dyn Fn(&ResolvedRequest) -> String + Send + Sync>>,
	/// Ordered rule list resolved per request.
	pub rules: Vec<PolicyRule<CacheRuleOverride>>,
}
impl CachePolicyConfig {
	/// The `cachePolicy: true` shorthand: GET-only, 59.5s TTL, no stale window.
	///
	/// The specification leaves the exact default TTL to the implementation
	/// within `[59000, 60000]`; this crate picks 59500ms.
	pub fn new() -> Self {
		Self { methods: vec!["GET".to_string()], ttl: Duration::from_millis(59_500), stale_in: None, skip: None, serializer: None, rules: Vec::new() }
	}
}
impl Default for CachePolicyConfig {
	fn default() -> Self {
		Self::new()
	}
}

/// `dedupePolicy` configuration.
pub struct DedupPolicyConfig {
	/// Method whitelist; empty means "every method".
	pub methods: Vec<String>,
	/// Overrides the default (method, url, body) fingerprint used as the dedup key.
	pub serializer: Option<Arc<dyn Fn(&ResolvedRequest) -> String + Send + Sync>>,
	/// Ordered rule list resolved per request; the policy payload only carries
	/// match/enabled/methods since dedup has no per-rule tunables beyond that.
	pub rules: Vec<PolicyRule<()>>,
}
impl Default for DedupPolicyConfig {
	fn default() -> Self {
		Self { methods: Vec::new(), serializer: None, rules: Vec::new() }
	}
}

struct CacheDecision {
	ttl: Duration,
	stale_in: Option<Duration>,
}

/// Argument type for the dedup producer: the owner's (first caller's)
/// timeout/retry config travel alongside the request so joiners share the
/// attempt the owner actually started, rather than silently falling back
/// to the engine's defaults.
struct DedupCall {
	resolved: ResolvedRequest,
	timeout: Duration,
	retry: RetryConfig,
}
impl Clone for DedupCall {
	fn clone(&self) -> Self {
		Self { resolved: self.resolved.clone(), timeout: self.timeout, retry: clone_retry(&self.retry) }
	}
}

/// The request pipeline: owns composition state and drives one request's
/// lifecycle through cache, dedup, fetch, retry, and events.
pub struct RequestPipeline {
	pub(crate) base_url: StdRwLock<Url>,
	client: Client,
	pub(crate) headers: StdRwLock<PropertyStore>,
	pub(crate) params: StdRwLock<PropertyStore>,
	pub(crate) state: StdRwLock<Value>,
	pub(crate) initial_state: Value,
	pub(crate) validate: ValidateHooks,
	pub(crate) modify_options: StdRwLock<Option<ModifyOptions>>,
	pub(crate) modify_method_options: StdRwLock<HashMap<String, ModifyOptions>>,
	default_timeout: Duration,
	default_retry: RetryConfig,
	cache_policy: Option<CachePolicyConfig>,
	cache_rules: Option<RuleResolver<CacheRuleOverride>>,
	pub(crate) cache_store: CacheStore<ResponseEnvelope>,
	dedup_rules: Option<RuleResolver<()>>,
	dedup_methods: Vec<String>,
	dedup: Option<InflightDedup<DedupCall, ResponseEnvelope>>,
	pub(crate) emitter: Arc<LifecycleEmitter>,
}
impl RequestPipeline {
	/// Construct a pipeline. `default_retry` backs both live requests without
	/// a per-call override and background SWR revalidations (which have no
	/// caller to supply one).
	pub fn new(
		base_url: Url,
		client: Client,
		headers: PropertyStore,
		params: PropertyStore,
		state: Value,
		validate: ValidateHooks,
		modify_options: Option<ModifyOptions>,
		default_timeout: Duration,
		default_retry: RetryConfig,
		cache_policy: Option<CachePolicyConfig>,
		dedup_policy: Option<DedupPolicyConfig>,
		emitter: Arc<LifecycleEmitter>,
	) -> Result<Arc<Self>> {
		let cache_rules = match &cache_policy {
			Some(policy) if !policy.rules.is_empty() => Some(RuleResolver::new(policy.rules.iter().map(clone_rule).collect())?),
			_ => None,
		};

		let dedup_methods = dedup_policy.as_ref().map(|p| p.methods.clone()).unwrap_or_default();
		let dedup_rules = match &dedup_policy {
			Some(policy) if !policy.rules.is_empty() => Some(RuleResolver::new(policy.rules.iter().map(clone_unit_rule).collect())?),
			_ => None,
		};

		// Built before the pipeline is wrapped in its own `Arc` so the
		// producer only needs to close over `client`/`emitter` clones,
		// never a self-referential `Arc<RequestPipeline>`. The owner's
		// (first caller's) timeout/retry travel on `DedupCall` itself, so
		// joiners share the attempt the owner actually started rather than
		// the engine's defaults.
		let dedup = if dedup_policy.is_some() {
			let producer_client = client.clone();
			let producer_emitter = emitter.clone();
			let inner = crate::flow::producer(move |call: DedupCall| {
				let client = producer_client.clone();
				let emitter = producer_emitter.clone();
				async move { run_attempt_cycle(&client, &emitter, &call.resolved, call.timeout, &call.retry).await }
			});
			let generate_key = Arc::new(|call: &DedupCall| dedup_key(&call.resolved)) as Arc<dyn Fn(&DedupCall) -> String + Send + Sync>;
			let on_start_emitter = emitter.clone();
			let on_join_emitter = emitter.clone();
			Some(InflightDedup::new(
				inner,
				InflightConfig {
					generate_key,
					should_dedupe: None,
					on_start: Some(Arc::new(move |key: &str| on_start_emitter.emit(&bare_event(EventKind::FetchDedupeStart, json!({ "key": key }))))),
					on_join: Some(Arc::new(move |key: &str| on_join_emitter.emit(&bare_event(EventKind::FetchDedupeJoin, json!({ "key": key }))))),
					on_resolve: None,
					on_reject: None,
				},
			))
		} else {
			None
		};

		Ok(Arc::new(Self {
			base_url: StdRwLock::new(base_url),
			client,
			headers: StdRwLock::new(headers),
			params: StdRwLock::new(params),
			state: StdRwLock::new(state.clone()),
			initial_state: state,
			validate,
			modify_options: StdRwLock::new(modify_options),
			modify_method_options: StdRwLock::new(HashMap::new()),
			default_timeout,
			default_retry,
			cache_policy,
			cache_rules,
			cache_store: CacheStore::new(),
			dedup_rules,
			dedup_methods,
			dedup,
			emitter,
		}))
	}

	fn cache_key(&self, resolved: &ResolvedRequest) -> String {
		if let Some(serializer) = self.cache_policy.as_ref().and_then(|p| p.serializer.clone()) {
			return serializer(resolved);
		}
		let parts = vec![Value::String(resolved.method.clone()), Value::String(resolved.url.clone())];
		fingerprint_parts(parts.iter())
	}

	fn cache_decision(&self, ctx: &RuleContext) -> Option<CacheDecision> {
		let policy = self.cache_policy.as_ref()?;
		if !policy.methods.iter().any(|m| m.eq_ignore_ascii_case(&ctx.method)) {
			return None;
		}
		if policy.skip.as_ref().is_some_and(|skip| skip(ctx)) {
			return None;
		}

		let mut ttl = policy.ttl;
		let mut stale_in = policy.stale_in;
		if let Some(rules) = &self.cache_rules {
			let idx = rules.resolve(ctx)?;
			if !rules.is_enabled(idx) {
				return None;
			}
			rules.with_policy(idx, |override_| {
				if let Some(t) = override_.ttl {
					ttl = t;
				}
				if let Some(s) = override_.stale_in {
					stale_in = Some(s);
				}
			});
		}
		Some(CacheDecision { ttl, stale_in })
	}

	fn dedup_enabled(&self, ctx: &RuleContext) -> bool {
		if self.dedup.is_none() {
			return false;
		}
		if !self.dedup_methods.is_empty() && !self.dedup_methods.iter().any(|m| m.eq_ignore_ascii_case(&ctx.method)) {
			return false;
		}
		if let Some(rules) = &self.dedup_rules {
			match rules.resolve(ctx) {
				Some(idx) => rules.is_enabled(idx),
				None => false,
			}
		} else {
			true
		}
	}

	/// Compose a [`ResolvedRequest`] from `ctx` against current engine state.
	pub fn compose(&self, ctx: &RequestContext) -> Result<ResolvedRequest> {
		let method = ctx.method.to_ascii_uppercase();

		let headers = self.headers.read().expect("header store lock poisoned").resolve(Some(&method), Some(&ctx.headers));
		let params = self.params.read().expect("param store lock poisoned").resolve(Some(&method), Some(&ctx.params));
		let state = self.state.read().expect("state lock poisoned").clone();

		let mut url = self.base_url.read().expect("base url lock poisoned").join(&ctx.path)?;
		if !params.is_empty() {
			let mut pairs = url.query_pairs_mut();
			for (k, v) in &params {
				pairs.append_pair(k, v);
			}
			drop(pairs);
		}

		let controller = ctx.abort_controller.clone().unwrap_or_default();
		let mut resolved = ResolvedRequest { method: method.clone(), path: ctx.path.clone(), url: url.to_string(), headers, body: None, state: state.clone(), controller };

		if let Some(modify) = self.modify_options.read().expect("modify options lock poisoned").as_ref() {
			modify(&mut resolved, &state);
		}
		if let Some(modify) = self.modify_method_options.read().expect("modify method options lock poisoned").get(&method) {
			modify(&mut resolved, &state);
		}

		if let Some(validate) = &self.validate.headers {
			validate(&resolved.headers, &method)?;
		}
		if let Some(validate) = &self.validate.params {
			validate(&params, &method)?;
		}
		if let Some(validate) = &self.validate.state {
			validate(&state)?;
		}

		if !matches!(method.as_str(), "GET" | "HEAD") {
			if let Some(payload) = &ctx.payload {
				resolved.body = Some(serde_json::to_vec(payload)?);
				resolved.headers.entry("content-type".to_string()).or_insert_with(|| "application/json".to_string());
			}
		}

		Ok(resolved)
	}

	/// Compose and execute `ctx`, returning an abortable future.
	pub fn execute(self: &Arc<Self>, ctx: RequestContext) -> AbortableRequest<Result<ResponseEnvelope>> {
		match self.compose(&ctx) {
			Ok(resolved) => {
				let controller = resolved.controller.clone();
				let pipeline = self.clone();
				let timeout = ctx.timeout.unwrap_or(self.default_timeout);
				let retry_config = ctx.retry.unwrap_or_else(|| clone_retry(&self.default_retry));
				AbortableRequest::new(controller, async move { pipeline.run(resolved, timeout, retry_config).await })
			},
			Err(err) => {
				// Composition failed pre-flight: no `fetch-before` is emitted,
				// matching "any throw aborts composition and surfaces as a
				// pre-flight error".
				let controller = ctx.abort_controller.clone().unwrap_or_default();
				AbortableRequest::new(controller, async move { Err(err) })
			},
		}
	}

	async fn run(self: Arc<Self>, resolved: ResolvedRequest, timeout: Duration, retry_config: RetryConfig) -> Result<ResponseEnvelope> {
		let rule_ctx = RuleContext { method: resolved.method.clone(), path: resolved.path.clone(), headers: resolved.headers.clone() };

		let cache_decision = self.cache_decision(&rule_ctx);
		let cache_key = cache_decision.as_ref().map(|_| self.cache_key(&resolved));

		if let Some(key) = &cache_key {
			let hooks = self.cache_hooks();
			let client = self.client.clone();
			let emitter = self.emitter.clone();
			let default_timeout = self.default_timeout;
			let default_retry = clone_retry(&self.default_retry);
			let resolved_for_revalidate = resolved.clone();
			let read = self
				.cache_store
				.get_or_revalidate(key, move || async move { run_attempt_cycle(&client, &emitter, &resolved_for_revalidate, default_timeout, &default_retry).await }, hooks)
				.await;
			if let Some(value) = read.value {
				return Ok(value);
			}
		}

		let response = if self.dedup_enabled(&rule_ctx) {
			let call = DedupCall { resolved: resolved.clone(), timeout, retry: clone_retry(&retry_config) };
			self.dedup.as_ref().expect("dedup_enabled implies a table").call(call).await?
		} else {
			run_attempt_cycle(&self.client, &self.emitter, &resolved, timeout, &retry_config).await?
		};

		if let (Some(decision), Some(key)) = (&cache_decision, &cache_key) {
			self.cache_store.set(key.clone(), response.clone(), decision.ttl, decision.stale_in).await;
			self.emit(EventKind::FetchCacheSet, &resolved, json!({ "key": key, "expiresIn": decision.ttl.as_millis() as u64 }));
		}

		Ok(response)
	}

	fn emit(&self, kind: EventKind, resolved: &ResolvedRequest, extra: Value) {
		emit_event(&self.emitter, kind, resolved, extra);
	}

	fn cache_hooks(&self) -> SwrHooks {
		let emitter = self.emitter.clone();
		let on_expire = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str| emitter.emit(&bare_event(EventKind::FetchCacheExpire, json!({ "key": key })))) as Arc<dyn Fn(&str) + Send + Sync>
		};
		let on_miss = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str| emitter.emit(&bare_event(EventKind::FetchCacheMiss, json!({ "key": key })))) as Arc<dyn Fn(&str) + Send + Sync>
		};
		let on_hit = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str, expires_in: Duration| emitter.emit(&bare_event(EventKind::FetchCacheHit, json!({ "key": key, "isStale": false, "expiresIn": expires_in.as_millis() as u64 })))) as Arc<dyn Fn(&str, Duration) + Send + Sync>
		};
		let on_set = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str, expires_in: Duration| emitter.emit(&bare_event(EventKind::FetchCacheSet, json!({ "key": key, "expiresIn": expires_in.as_millis() as u64 })))) as Arc<dyn Fn(&str, Duration) + Send + Sync>
		};
		let on_stale = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str, expires_in: Duration| emitter.emit(&bare_event(EventKind::FetchCacheStale, json!({ "key": key, "isStale": true, "expiresIn": expires_in.as_millis() as u64 })))) as Arc<dyn Fn(&str, Duration) + Send + Sync>
		};
		let on_revalidate = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str| emitter.emit(&bare_event(EventKind::FetchCacheRevalidate, json!({ "key": key })))) as Arc<dyn Fn(&str) + Send + Sync>
		};
		let on_revalidate_error = {
			let emitter = emitter.clone();
			Arc::new(move |key: &str, err: &Error| emitter.emit(&bare_event(EventKind::FetchCacheRevalidateError, json!({ "key": key, "error": err.to_string() })))) as Arc<dyn Fn(&str, &Error) + Send + Sync>
		};

		SwrHooks { on_expire: Some(on_expire), on_miss: Some(on_miss), on_hit: Some(on_hit), on_set: Some(on_set), on_stale: Some(on_stale), on_revalidate: Some(on_revalidate), on_revalidate_error: Some(on_revalidate_error) }
	}
}

/// Runs the fetch/classify/retry cycle for one resolved request. Free
/// function (not a `RequestPipeline` method) so the in-flight dedup
/// producer and the cache's background-revalidation producer can both close
/// over plain `client`/`emitter` clones instead of a self-referential
/// `Arc<RequestPipeline>`.
async fn run_attempt_cycle(client: &Client, emitter: &LifecycleEmitter, resolved: &ResolvedRequest, timeout: Duration, retry_config: &RetryConfig) -> Result<ResponseEnvelope> {
	let mut executor = RetryExecutor::new(retry_config);
	let signal = resolved.controller.signal();

	loop {
		let attempt = executor.begin_attempt();
		emit_event(emitter, EventKind::FetchBefore, resolved, Value::Null);
		let outcome = http::fetch(client, &resolved.method, &resolved.url, &resolved.headers, resolved.body.clone(), timeout, &signal, attempt).await;
		emit_event(emitter, EventKind::FetchAfter, resolved, Value::Null);

		let fetch_err = match outcome {
			Ok(raw) => match classify_response(raw, resolved, attempt) {
				Ok(envelope) => {
					emit_event(emitter, EventKind::FetchResponse, resolved, json!({ "data": envelope.data, "status": envelope.status }));
					return Ok(envelope);
				},
				Err(Error::Fetch(err)) => err,
				Err(other) => return Err(other),
			},
			Err(Error::Fetch(err)) => err,
			Err(other) => return Err(other),
		};

		if fetch_err.aborted {
			emit_event(emitter, EventKind::FetchAbort, resolved, json!({ "status": fetch_err.status, "attempt": fetch_err.attempt }));
			return Err(Error::Fetch(fetch_err));
		}
		emit_event(emitter, EventKind::FetchError, resolved, json!({ "status": fetch_err.status, "data": fetch_err.data, "attempt": fetch_err.attempt, "aborted": fetch_err.aborted }));
		tracing::debug!(method = %resolved.method, url = %resolved.url, status = fetch_err.status, attempt, "fetch attempt failed");

		let decision = executor.decide(&fetch_err);
		if matches!(decision, RetryDecision::DoNotRetry) || !executor.can_retry() {
			tracing::warn!(method = %resolved.method, url = %resolved.url, attempt, "retry budget exhausted");
			return Err(Error::Fetch(fetch_err));
		}
		let delay = executor.backoff_for(decision);
		emit_event(emitter, EventKind::FetchRetry, resolved, json!({ "attempt": attempt, "nextDelay": delay.as_millis() as u64 }));
		executor.sleep_backoff(delay).await;
	}
}

fn classify_response(raw: RawResponse, resolved: &ResolvedRequest, attempt: u32) -> Result<ResponseEnvelope> {
	if raw.status >= 400 {
		let data = serde_json::from_slice::<Value>(&raw.body).ok();
		return Err(FetchError::from_status(StatusCode::from_u16(raw.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), data, attempt, resolved.method.clone(), resolved.url.clone()).into());
	}
	let data = if raw.status == 204 || raw.body.is_empty() { None } else { serde_json::from_slice::<Value>(&raw.body).ok() };
	Ok(ResponseEnvelope { data, headers: raw.headers, status: raw.status })
}

fn emit_event(emitter: &LifecycleEmitter, kind: EventKind, resolved: &ResolvedRequest, extra: Value) {
	emitter.emit(&Event { kind, state: resolved.state.clone(), method: Some(resolved.method.clone()), url: Some(resolved.url.clone()), headers: Some(resolved.headers.clone()), payload: None, extra });
}

fn dedup_key(resolved: &ResolvedRequest) -> String {
	let parts = vec![Value::String(resolved.method.clone()), Value::String(resolved.url.clone())];
	fingerprint_parts(parts.iter())
}

fn bare_event(kind: EventKind, extra: Value) -> Event {
	Event { kind, state: Value::Null, method: None, url: None, headers: None, payload: None, extra }
}

fn clone_retry(config: &RetryConfig) -> RetryConfig {
	RetryConfig {
		max_attempts: config.max_attempts,
		base_delay: config.base_delay,
		max_delay: config.max_delay,
		use_exponential_backoff: config.use_exponential_backoff,
		retryable_status_codes: config.retryable_status_codes.clone(),
		should_retry: config.should_retry.clone(),
		jitter: config.jitter,
	}
}

fn clone_rule(rule: &PolicyRule<CacheRuleOverride>) -> PolicyRule<CacheRuleOverride> {
	PolicyRule {
		match_: clone_criteria(&rule.match_),
		enabled: rule.enabled,
		methods: rule.methods.clone(),
		skip: rule.skip.clone(),
		policy: rule.policy,
	}
}

fn clone_unit_rule(rule: &PolicyRule<()>) -> PolicyRule<()> {
	PolicyRule { match_: clone_criteria(&rule.match_), enabled: rule.enabled, methods: rule.methods.clone(), skip: rule.skip.clone(), policy: () }
}

fn clone_criteria(criteria: &crate::rules::MatchCriteria) -> crate::rules::MatchCriteria {
	crate::rules::MatchCriteria {
		is: criteria.is.clone(),
		starts_with: criteria.starts_with.clone(),
		ends_with: criteria.ends_with.clone(),
		includes: criteria.includes.clone(),
		matches: criteria.matches.clone(),
	}
}
