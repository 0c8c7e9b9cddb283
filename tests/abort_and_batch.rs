//! Shared abort controllers and batched execution.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
// crates.io
use flowfetch::{
	abort::AbortController,
	flow::batch::{batch, BatchHooks, FailureMode},
	pipeline::RequestContext,
	EngineConfig, Error, FetchEngine, Result,
};
use tokio::time::Duration;
use wiremock::{
	matchers::{method, path},
	Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn aborting_a_shared_controller_cancels_every_bound_request() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/slow"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
		.mount(&server)
		.await;

	let engine = FetchEngine::new(EngineConfig::new(server.uri()))?;
	let controller = AbortController::new();

	let ctx_a = RequestContext { method: "GET".into(), path: "/slow".into(), abort_controller: Some(controller.clone()), ..Default::default() };
	let ctx_b = RequestContext { method: "GET".into(), path: "/slow".into(), abort_controller: Some(controller.clone()), ..Default::default() };

	let request_a = engine.execute(ctx_a);
	let request_b = engine.execute(ctx_b);

	tokio::time::sleep(Duration::from_millis(20)).await;
	controller.abort();

	let (result_a, result_b) = tokio::join!(request_a, request_b);

	for result in [result_a, result_b] {
		match result.unwrap_err() {
			Error::Fetch(fetch_err) => assert!(fetch_err.aborted),
			other => panic!("expected an aborted Error::Fetch, got {other:?}"),
		}
	}

	Ok(())
}

#[tokio::test]
async fn batch_abort_mode_settles_the_failing_chunk_then_stops() {
	let invocations = Arc::new(AtomicUsize::new(0));
	let invocations_handle = invocations.clone();

	let outcome = batch(
		(0..6).collect(),
		2,
		FailureMode::Abort,
		move |n: i32| {
			let invocations = invocations_handle.clone();
			async move {
				invocations.fetch_add(1, Ordering::SeqCst);
				if n == 3 {
					Err(Error::Config { field: "n", reason: "simulated failure".into() })
				} else {
					Ok(n)
				}
			}
		},
		BatchHooks::default(),
	)
	.await;

	assert!(outcome.is_err());
	assert_eq!(invocations.load(Ordering::SeqCst), 4, "the chunk containing the failure finishes settling before stopping");
}
