// src/runtime/aio.rs

//! The engine's asynchronous I/O handle.
//!
//! An `Aio` carries one operation at a time: the caller loads it (message, flags),
//! hands it to a provider (socket or context), and then either blocks in [`Aio::wait`] or
//! waits for the completion callback. Providers see the shared [`AioInner`] and must finish
//! each operation exactly once; late finishers lose the race and get their message back.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::task::JoinHandle;

use crate::error::{NngError, NngResult};
use crate::message::Msg;

/// Invoked after every completion, on whichever thread completed the operation.
pub(crate) type AioCallback = Box<dyn Fn() + Send + Sync>;

/// Provider hook that removes a waiting operation from its queue and finishes it with the error.
pub(crate) type CancelFn = Box<dyn FnOnce(&AioRef, NngError) + Send>;

pub(crate) type AioRef = Arc<AioInner>;

#[derive(Default)]
struct AioState {
  busy: bool,
  stopped: bool,
  result: Option<NngResult<()>>,
  msg: Option<Msg>,
  nonblock: bool,
  cancel: Option<CancelFn>,
  timer: Option<JoinHandle<()>>,
}

pub(crate) struct AioInner {
  state: Mutex<AioState>,
  done: Condvar,
  callback: Option<AioCallback>,
}

pub(crate) struct Aio {
  inner: AioRef,
}

impl Aio {
  pub fn new(callback: Option<AioCallback>) -> Self {
    Self {
      inner: Arc::new(AioInner {
        state: Mutex::new(AioState::default()),
        done: Condvar::new(),
        callback,
      }),
    }
  }

  pub fn handle(&self) -> AioRef {
    self.inner.clone()
  }

  pub fn set_nonblock(&self, nonblock: bool) {
    self.inner.state.lock().nonblock = nonblock;
  }

  pub fn set_msg(&self, msg: Msg) {
    self.inner.put_msg(msg);
  }

  pub fn take_msg(&self) -> Option<Msg> {
    self.inner.take_msg()
  }

  /// Result of the last operation. `Ok` if nothing was started yet.
  pub fn result(&self) -> NngResult<()> {
    let st = self.inner.state.lock();
    if st.busy {
      return Err(NngError::InvalidState("aio operation still in progress"));
    }
    st.result.clone().unwrap_or(Ok(()))
  }

  /// True while an operation is in flight.
  pub fn is_busy(&self) -> bool {
    self.inner.state.lock().busy
  }

  /// Blocks the calling thread until the current operation (if any) completes.
  pub fn wait(&self) {
    let mut st = self.inner.state.lock();
    while st.busy {
      self.inner.done.wait(&mut st);
    }
  }

  /// Best-effort cancellation; the operation completes with `Canceled` unless it already finished.
  pub fn cancel(&self) {
    self.inner.abort(NngError::Canceled);
  }

  /// Cancels, waits for completion and refuses any later operation.
  pub fn stop(&self) {
    self.inner.state.lock().stopped = true;
    self.cancel();
    self.wait();
  }
}

impl Drop for Aio {
  fn drop(&mut self) {
    self.stop();
  }
}

impl AioInner {
  /// Marks an operation as started. Returns false if the aio was stopped, in which case it has
  /// already been completed with `Canceled`.
  pub fn begin(self: &Arc<Self>) -> bool {
    let mut st = self.state.lock();
    if st.stopped {
      st.result = Some(Err(NngError::Canceled));
      drop(st);
      self.done.notify_all();
      self.fire();
      return false;
    }
    st.busy = true;
    st.result = None;
    st.cancel = None;
    true
  }

  pub fn is_nonblocking(&self) -> bool {
    self.state.lock().nonblock
  }

  /// Arms cancellation and the expiry timer for an operation that must wait.
  ///
  /// `timeout` is the provider's configured timeout, `cap` an optional tighter deadline.
  /// On `Err` the operation was not armed and the caller must dequeue it and finish it with
  /// the returned error.
  pub fn schedule(
    self: &Arc<Self>,
    cancel: CancelFn,
    timeout: Option<Duration>,
    cap: Option<Duration>,
  ) -> NngResult<()> {
    let mut st = self.state.lock();
    if !st.busy {
      // The provider completed it before we got here.
      return Ok(());
    }
    if st.stopped {
      return Err(NngError::Canceled);
    }
    let timeout = match (timeout, cap) {
      (Some(a), Some(b)) => Some(a.min(b)),
      (a, b) => a.or(b),
    };
    if let Some(d) = timeout {
      if d.is_zero() {
        return Err(NngError::Timeout);
      }
      let weak = Arc::downgrade(self);
      let timer = crate::runtime::spawn(async move {
        tokio::time::sleep(d).await;
        if let Some(aio) = weak.upgrade() {
          aio.abort(NngError::Timeout);
        }
      });
      match timer {
        Ok(handle) => st.timer = Some(handle),
        Err(e) => tracing::error!(error = %e, "Could not arm aio timer"),
      }
    }
    st.cancel = Some(cancel);
    Ok(())
  }

  /// Completes the current operation. Returns false if it had already completed.
  pub fn finish(self: &Arc<Self>, result: NngResult<()>) -> bool {
    let mut st = self.state.lock();
    if !st.busy {
      return false;
    }
    st.busy = false;
    st.result = Some(result);
    st.cancel = None;
    if let Some(timer) = st.timer.take() {
      timer.abort();
    }
    drop(st);
    self.done.notify_all();
    self.fire();
    true
  }

  /// Completes a receive with its message. Hands the message back if the operation had
  /// already completed.
  pub fn finish_msg(self: &Arc<Self>, msg: Msg) -> Result<(), Msg> {
    {
      let mut st = self.state.lock();
      if !st.busy {
        return Err(msg);
      }
      st.msg = Some(msg);
    }
    self.finish(Ok(()));
    Ok(())
  }

  /// Starts and immediately fails an operation.
  pub fn fail_now(self: &Arc<Self>, err: NngError) {
    if self.begin() {
      self.finish(Err(err));
    }
  }

  /// Runs the provider's cancel hook, if the operation is waiting in a provider queue.
  pub fn abort(self: &Arc<Self>, err: NngError) {
    let cancel = {
      let mut st = self.state.lock();
      if !st.busy {
        return;
      }
      st.cancel.take()
    };
    if let Some(cancel) = cancel {
      cancel(self, err);
    }
  }

  pub fn put_msg(&self, msg: Msg) {
    self.state.lock().msg = Some(msg);
  }

  pub fn take_msg(&self) -> Option<Msg> {
    self.state.lock().msg.take()
  }

  fn fire(&self) {
    if let Some(cb) = &self.callback {
      cb();
    }
  }
}
