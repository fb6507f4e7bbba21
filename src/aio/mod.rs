// src/aio/mod.rs

//! Bridges engine aio completions to `.await`.
//!
//! An [`AioBridge`] owns one engine aio whose completion callback signals a runtime-specific
//! [`Wakeup`]. Each `async_*` call on a socket, context or pipe creates a bridge, starts exactly
//! one operation on it and awaits the signal. Dropping the awaiting future cancels the operation
//! and waits for the engine to let go of the aio before it is freed.

mod backend;

pub use backend::AsyncBackend;
pub(crate) use backend::Wakeup;

use std::sync::Arc;

use crate::engine::{self, AioTarget};
use crate::error::{NngError, NngResult};
use crate::message::Msg;
use crate::runtime::Aio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
  Idle,
  Started,
  Completed,
  Failed,
  Canceled,
}

pub(crate) struct AioBridge {
  aio: Aio,
  wake: Arc<dyn Wakeup>,
  state: BridgeState,
}

impl AioBridge {
  pub fn new(backend: AsyncBackend) -> Self {
    let wake = backend.wakeup();
    let signal = wake.clone();
    Self {
      aio: Aio::new(Some(Box::new(move || signal.signal()))),
      wake,
      state: BridgeState::Idle,
    }
  }

  fn start(&mut self) -> NngResult<()> {
    if self.state != BridgeState::Idle {
      return Err(NngError::InvalidState("aio bridge already used"));
    }
    self.state = BridgeState::Started;
    Ok(())
  }

  pub fn start_send(&mut self, target: AioTarget, msg: Msg) -> NngResult<()> {
    self.start()?;
    self.aio.set_msg(msg);
    engine::aio_send(target, &self.aio);
    Ok(())
  }

  pub fn start_recv(&mut self, target: AioTarget) -> NngResult<()> {
    self.start()?;
    engine::aio_recv(target, &self.aio);
    Ok(())
  }

  /// Suspends until the started operation completes.
  pub async fn completion(&mut self) -> NngResult<()> {
    while self.aio.is_busy() {
      self.wake.wait().await;
    }
    let result = self.aio.result();
    self.state = match &result {
      Ok(()) => BridgeState::Completed,
      Err(NngError::Canceled) => BridgeState::Canceled,
      Err(_) => BridgeState::Failed,
    };
    result
  }

  pub fn take_msg(&mut self) -> Option<Msg> {
    self.aio.take_msg()
  }
}

impl Drop for AioBridge {
  fn drop(&mut self) {
    if self.state == BridgeState::Started && self.aio.is_busy() {
      tracing::trace!("Async operation dropped while in flight, canceling");
      self.aio.cancel();
    }
    // The aio's own drop stops it and waits for the engine to release it.
  }
}

/// Sends `msg` on `target`, suspending until the engine accepts it.
pub(crate) async fn send(backend: AsyncBackend, target: AioTarget, msg: Msg) -> NngResult<()> {
  let mut bridge = AioBridge::new(backend);
  bridge.start_send(target, msg)?;
  bridge.completion().await
}

/// Receives from `target`.
pub(crate) async fn recv(backend: AsyncBackend, target: AioTarget) -> NngResult<Msg> {
  let mut bridge = AioBridge::new(backend);
  bridge.start_recv(target)?;
  bridge.completion().await?;
  bridge
    .take_msg()
    .ok_or_else(|| NngError::Internal("receive completed without a message".into()))
}
