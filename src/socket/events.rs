// src/socket/events.rs

//! User hooks for pipe lifecycle events.

use std::error::Error;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub use crate::engine::PipeEvent;
use crate::socket::Pipe;

/// What a pipe hook returns. Errors are logged by the dispatcher and otherwise ignored.
pub type HookResult = Result<(), Box<dyn Error + Send + Sync>>;

type HookFn = dyn Fn(&Pipe) -> HookResult + Send + Sync;

/// A shareable pipe hook.
///
/// Two callbacks are equal when they share the same closure allocation, so keep a clone of
/// the callback you register if you want to remove it later.
#[derive(Clone)]
pub struct PipeCallback(Arc<HookFn>);

impl PipeCallback {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(&Pipe) -> HookResult + Send + Sync + 'static,
  {
    Self(Arc::new(f))
  }

  fn addr(&self) -> *const () {
    Arc::as_ptr(&self.0) as *const ()
  }

  /// Runs the hook. Errors and panics are logged, never propagated.
  pub(crate) fn invoke(&self, pipe: &Pipe, event: PipeEvent) {
    match catch_unwind(AssertUnwindSafe(|| (self.0)(pipe))) {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        tracing::error!(pipe_id = pipe.id(), ?event, error = %e, "Pipe hook failed");
      }
      Err(_) => {
        tracing::error!(pipe_id = pipe.id(), ?event, "Pipe hook panicked");
      }
    }
  }
}

impl PartialEq for PipeCallback {
  fn eq(&self, other: &Self) -> bool {
    self.addr() == other.addr()
  }
}

impl Eq for PipeCallback {}

impl fmt::Debug for PipeCallback {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("PipeCallback").field(&self.addr()).finish()
  }
}

impl<F> From<F> for PipeCallback
where
  F: Fn(&Pipe) -> HookResult + Send + Sync + 'static,
{
  fn from(f: F) -> Self {
    PipeCallback::new(f)
  }
}

/// Ordered hook lists, one per event.
#[derive(Default)]
pub(crate) struct PipeHooks {
  lists: [Vec<PipeCallback>; 3],
}

impl PipeHooks {
  pub fn add(&mut self, event: PipeEvent, cb: PipeCallback) {
    self.lists[event.index()].push(cb);
  }

  /// Removes the first registration equal to `cb`.
  pub fn remove(&mut self, event: PipeEvent, cb: &PipeCallback) -> bool {
    let list = &mut self.lists[event.index()];
    match list.iter().position(|c| c == cb) {
      Some(pos) => {
        list.remove(pos);
        true
      }
      None => false,
    }
  }

  /// Snapshot of the hooks for `event`, in registration order.
  pub fn get(&self, event: PipeEvent) -> Vec<PipeCallback> {
    self.lists[event.index()].clone()
  }
}
