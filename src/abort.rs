//! The abortable-promise contract: a future that also exposes imperative
//! cancellation and status flags.
//!
//! Rust futures are not objects you can attach fields to after the fact,
//! so the cancellation handle travels alongside the future inside a
//! wrapper struct that itself implements [`Future`].

// std
use std::{
	future::Future,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	task::{Context, Poll},
};
// crates.io
use tokio::sync::watch;

/// Owns the shared cancellation flag for one or more bound requests.
///
/// Cloning shares the same underlying flag: aborting any clone aborts
/// every request bound to it, matching "a caller-shared controller aborts
/// every request bound to it".
#[derive(Clone)]
pub struct AbortController {
	tx: Arc<watch::Sender<bool>>,
}
impl AbortController {
	/// Construct a controller that starts not-aborted.
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(false);
		Self { tx: Arc::new(tx) }
	}

	/// Abort every request bound to this controller. Idempotent.
	pub fn abort(&self) {
		let _ = self.tx.send(true);
	}

	/// Whether [`Self::abort`] has been called.
	pub fn is_aborted(&self) -> bool {
		*self.tx.borrow()
	}

	/// Obtain a signal the fetch layer can await on.
	pub fn signal(&self) -> AbortSignal {
		AbortSignal { rx: self.tx.subscribe() }
	}
}
impl Default for AbortController {
	fn default() -> Self {
		Self::new()
	}
}

/// A read-only view of an [`AbortController`]'s cancellation state.
#[derive(Clone)]
pub struct AbortSignal {
	rx: watch::Receiver<bool>,
}
impl AbortSignal {
	/// Current cancellation state.
	pub fn is_aborted(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolve once the controller is aborted. Resolves immediately if it
	/// already has been.
	pub async fn cancelled(&self) {
		let mut rx = self.rx.clone();
		if *rx.borrow() {
			return;
		}
		while rx.changed().await.is_ok() {
			if *rx.borrow() {
				return;
			}
		}
	}
}

/// A future that also exposes `abort()`/`is_aborted()`/`is_finished()`.
///
/// `is_finished` flips only once the wrapped future actually resolves;
/// calling `abort()` sets `is_aborted` immediately but `is_finished`
/// remains `false` until the inner future observes the cancellation and
/// settles with its abort error.
pub struct AbortableRequest<T> {
	controller: AbortController,
	finished: Arc<AtomicBool>,
	inner: Pin<Box<dyn Future<Output = T> + Send>>,
}
impl<T> AbortableRequest<T> {
	/// Wrap `inner`, bound to `controller`.
	pub fn new(controller: AbortController, inner: impl Future<Output = T> + Send + 'static) -> Self {
		Self { controller, finished: Arc::new(AtomicBool::new(false)), inner: Box::pin(inner) }
	}

	/// Cancel the in-flight request. Idempotent.
	pub fn abort(&self) {
		self.controller.abort();
	}

	/// Whether `abort()` has been called (by this handle or a shared one).
	pub fn is_aborted(&self) -> bool {
		self.controller.is_aborted()
	}

	/// Whether the underlying future has resolved.
	pub fn is_finished(&self) -> bool {
		self.finished.load(Ordering::SeqCst)
	}
}
impl<T> Future for AbortableRequest<T> {
	type Output = T;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		let poll = this.inner.as_mut().poll(cx);
		if poll.is_ready() {
			this.finished.store(true, Ordering::SeqCst);
		}
		poll
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn abort_is_idempotent_and_observed_by_every_clone() {
		let controller = AbortController::new();
		let signal_a = controller.signal();
		let signal_b = controller.signal();

		controller.abort();
		controller.abort();

		assert!(signal_a.is_aborted());
		assert!(signal_b.is_aborted());
	}

	#[tokio::test]
	async fn cancelled_resolves_immediately_if_already_aborted() {
		let controller = AbortController::new();
		controller.abort();
		let signal = controller.signal();
		signal.cancelled().await;
	}

	#[tokio::test]
	async fn is_finished_flips_only_after_the_inner_future_resolves() {
		let controller = AbortController::new();
		let request = AbortableRequest::new(controller.clone(), async { 42 });

		assert!(!request.is_finished());
		controller.abort();
		assert!(request.is_aborted());
		assert!(!request.is_finished());

		let value = request.await;
		assert_eq!(value, 42);
	}
}
