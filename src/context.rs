// src/context.rs

//! Independent send/receive cursors over one socket.

use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::aio;
use crate::engine::{self, AioTarget, RawCtx};
use crate::error::{NngError, NngResult};
use crate::message::{Message, Msg, OpFlags};
use crate::socket::Socket;

/// A context carries its own protocol state, so several request/reply (or survey) exchanges
/// can be in flight on one socket at once without seeing each other's messages.
///
/// Supported by req0, rep0, surveyor0 and respondent0. A context keeps its socket alive.
pub struct Context {
  raw: Mutex<Option<RawCtx>>,
  socket: Socket,
}

impl Context {
  pub(crate) fn open(socket: Socket) -> NngResult<Self> {
    let raw = engine::ctx_open(socket.inner().raw())?;
    Ok(Self {
      raw: Mutex::new(Some(raw)),
      socket,
    })
  }

  fn target(&self) -> NngResult<AioTarget> {
    self.raw.lock().map(AioTarget::Context).ok_or(NngError::Closed)
  }

  /// The context id, or `None` once closed.
  pub fn id(&self) -> Option<u32> {
    self.raw.lock().map(RawCtx::id)
  }

  pub fn socket(&self) -> &Socket {
    &self.socket
  }

  pub fn send(&self, data: &[u8]) -> NngResult<()> {
    engine::send(self.target()?, Msg::from_slice(data), OpFlags::empty())
  }

  pub fn recv(&self) -> NngResult<Bytes> {
    engine::recv(self.target()?, OpFlags::empty()).map(Msg::into_bytes)
  }

  /// Sends `msg` on this context. A failed send leaves the message live.
  pub fn send_message(&self, msg: &Message) -> NngResult<()> {
    let target = self.target()?;
    msg.send_with(|raw| engine::send_msg(target, raw, OpFlags::empty()))
  }

  pub fn recv_message(&self) -> NngResult<Message> {
    let msg = engine::recv(self.target()?, OpFlags::empty())?;
    Ok(self.socket.inner().adopt_received(msg))
  }

  pub async fn async_send(&self, data: &[u8]) -> NngResult<()> {
    let target = self.target()?;
    aio::send(self.socket.inner().backend(), target, Msg::from_slice(data)).await
  }

  pub async fn async_recv(&self) -> NngResult<Bytes> {
    let target = self.target()?;
    aio::recv(self.socket.inner().backend(), target).await.map(Msg::into_bytes)
  }

  pub async fn async_send_message(&self, msg: &Message) -> NngResult<()> {
    let target = self.target()?;
    let raw = msg.with_sendable(|m| m)?;
    aio::send(self.socket.inner().backend(), target, raw).await
  }

  pub async fn async_recv_message(&self) -> NngResult<Message> {
    let target = self.target()?;
    let msg = aio::recv(self.socket.inner().backend(), target).await?;
    Ok(self.socket.inner().adopt_received(msg))
  }

  /// Closes the context; pending operations on it fail with `Closed`. Closing twice, or after
  /// the socket closed, is not an error.
  pub fn close(&self) -> NngResult<()> {
    let Some(raw) = self.raw.lock().take() else {
      return Ok(());
    };
    match engine::ctx_close(raw) {
      Ok(()) | Err(NngError::Closed) => Ok(()),
      Err(e) => Err(e),
    }
  }
}

impl Drop for Context {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      tracing::debug!(error = %e, "Error closing dropped context");
    }
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("id", &self.id())
      .field("socket", &self.socket.id())
      .finish()
  }
}
