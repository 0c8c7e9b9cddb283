//! Stale-while-revalidate caching and cache administration.

// std
use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};
// crates.io
use flowfetch::{
	cache::KeyMatcher,
	pipeline::{CachePolicyConfig, ResolvedRequest},
	EngineConfig, FetchEngine, Result,
};
use tokio::time::Duration;
use wiremock::{
	matchers::{method, path},
	Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn serves_stale_data_while_revalidating_in_the_background() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let hits = Arc::new(AtomicUsize::new(0));
	let hits_handle = hits.clone();

	Mock::given(method("GET"))
		.and(path("/price"))
		.respond_with(move |_: &wiremock::Request| {
			let version = hits_handle.fetch_add(1, Ordering::SeqCst);
			ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": version }))
		})
		.mount(&server)
		.await;

	let mut config = EngineConfig::new(server.uri());
	config.cache_policy = Some(CachePolicyConfig {
		ttl: Duration::from_millis(500),
		stale_in: Some(Duration::from_millis(60)),
		..CachePolicyConfig::new()
	});

	let engine = FetchEngine::new(config)?;

	let first = engine.get("/price").await?;
	assert_eq!(first.data, Some(serde_json::json!({ "version": 0 })));

	tokio::time::sleep(Duration::from_millis(90)).await;

	let second = engine.get("/price").await?;
	assert_eq!(second.data, Some(serde_json::json!({ "version": 0 })), "a stale entry is still served immediately");

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(hits.load(Ordering::SeqCst), 2, "the stale read should have kicked off exactly one background revalidation");

	let stats = engine.cache_stats().await;
	assert_eq!(stats.cache_size, 1);

	Ok(())
}

#[tokio::test]
async fn invalidate_path_removes_matching_entries() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true }))).mount(&server).await;

	let mut config = EngineConfig::new(server.uri());
	config.cache_policy =
		Some(CachePolicyConfig { serializer: Some(Arc::new(|r: &ResolvedRequest| r.path.clone())), ..CachePolicyConfig::new() });
	let engine = FetchEngine::new(config)?;

	engine.get("/users/1").await?;
	engine.get("/users/2").await?;
	assert_eq!(engine.cache_stats().await.cache_size, 2);

	let removed = engine.invalidate_path(KeyMatcher::Prefix("/users/".to_string())).await;
	assert_eq!(removed, 2);
	assert_eq!(engine.cache_stats().await.cache_size, 0);

	Ok(())
}
