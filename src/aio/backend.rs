// src/aio/backend.rs

//! Per-runtime wake adapters.
//!
//! Engine completions fire on engine threads. A `Wakeup` turns that signal into something the
//! awaiting task's runtime can be woken by.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

use futures::future::{self, BoxFuture};
use futures::task::AtomicWaker;
use futures::FutureExt;
use tokio::sync::Notify;

/// Which async runtime `async_*` operations suspend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncBackend {
  /// Wake through a `tokio::sync::Notify`. Requires nothing from the caller's runtime beyond
  /// polling the returned future.
  Tokio,
  /// Wake through a bare `Waker`; works under any executor, including
  /// `futures::executor::block_on`.
  Futures,
}

impl AsyncBackend {
  /// Tokio when called from inside a Tokio runtime, otherwise the executor-agnostic adapter.
  pub fn detect() -> Self {
    if tokio::runtime::Handle::try_current().is_ok() {
      AsyncBackend::Tokio
    } else {
      AsyncBackend::Futures
    }
  }

  pub(crate) fn wakeup(self) -> Arc<dyn Wakeup> {
    match self {
      AsyncBackend::Tokio => Arc::new(TokioWakeup::default()),
      AsyncBackend::Futures => Arc::new(WakerWakeup::default()),
    }
  }
}

/// A level-triggered completion signal: a `signal` before `wait` is not lost.
pub(crate) trait Wakeup: Send + Sync {
  fn signal(&self);
  fn wait(&self) -> BoxFuture<'_, ()>;
}

#[derive(Default)]
struct TokioWakeup {
  notify: Notify,
}

impl Wakeup for TokioWakeup {
  fn signal(&self) {
    // Stores a permit when nobody waits yet.
    self.notify.notify_one();
  }

  fn wait(&self) -> BoxFuture<'_, ()> {
    self.notify.notified().boxed()
  }
}

#[derive(Default)]
struct WakerWakeup {
  waker: AtomicWaker,
  set: AtomicBool,
}

impl Wakeup for WakerWakeup {
  fn signal(&self) {
    self.set.store(true, Ordering::Release);
    self.waker.wake();
  }

  fn wait(&self) -> BoxFuture<'_, ()> {
    future::poll_fn(move |cx| {
      if self.set.swap(false, Ordering::AcqRel) {
        return Poll::Ready(());
      }
      self.waker.register(cx.waker());
      if self.set.swap(false, Ordering::AcqRel) {
        Poll::Ready(())
      } else {
        Poll::Pending
      }
    })
    .boxed()
  }
}
