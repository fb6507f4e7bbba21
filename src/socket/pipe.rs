// src/socket/pipe.rs

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::core::{Socket, SocketInner};
use super::endpoint::{Dialer, Listener};
use super::options::{self as opt, OptionValue};
use super::types::Protocol;
use crate::engine::{self, RawPipe};
use crate::error::{NngError, NngResult};
use crate::message::Message;
use crate::transport::SockAddr;

struct PipeInner {
  raw: RawPipe,
  socket: Weak<SocketInner>,
  closed: AtomicBool,
}

/// One live connection of a socket.
///
/// Pipes are created by the socket when the engine reports a new connection and dropped from
/// its table when the connection goes away. Clones share state, and a `Pipe` kept past its
/// removal only reports errors: pipe ids are reused by later connections.
#[derive(Clone)]
pub struct Pipe {
  inner: Arc<PipeInner>,
}

impl Pipe {
  pub(crate) fn new(raw: RawPipe, socket: Weak<SocketInner>) -> Self {
    Self {
      inner: Arc::new(PipeInner {
        raw,
        socket,
        closed: AtomicBool::new(false),
      }),
    }
  }

  pub fn id(&self) -> u32 {
    self.inner.raw.id()
  }

  pub(crate) fn raw(&self) -> RawPipe {
    self.inner.raw
  }

  /// True once [`close`](Pipe::close) was called on this pipe.
  pub fn closed(&self) -> bool {
    self.inner.closed.load(Ordering::Acquire)
  }

  /// Closes the connection. Closing from a pre-add hook keeps the pipe from ever joining the
  /// socket.
  pub fn close(&self) -> NngResult<()> {
    if self.inner.closed.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    tracing::debug!(pipe_id = self.id(), "Closing pipe");
    match engine::pipe_close(self.inner.raw) {
      Ok(()) | Err(NngError::Closed) => Ok(()),
      Err(e) => Err(e),
    }
  }

  /// The socket this pipe belongs to.
  pub fn socket(&self) -> NngResult<Socket> {
    self.inner.socket.upgrade().map(Socket::from_inner).ok_or(NngError::Closed)
  }

  /// The dialer that created this pipe. Fails with `BadType` on a pipe accepted by a listener.
  pub fn dialer(&self) -> NngResult<Dialer> {
    match engine::pipe_dialer(self.inner.raw)? {
      Some(raw) => Ok(Dialer::new(raw, self.inner.socket.clone())),
      None => Err(NngError::BadType(format!("pipe {} was not created by a dialer", self.id()))),
    }
  }

  /// The listener that accepted this pipe. Fails with `BadType` on a dialed pipe.
  pub fn listener(&self) -> NngResult<Listener> {
    match engine::pipe_listener(self.inner.raw)? {
      Some(raw) => Ok(Listener::new(raw, self.inner.socket.clone())),
      None => Err(NngError::BadType(format!("pipe {} was not created by a listener", self.id()))),
    }
  }

  pub fn get_option(&self, name: &str) -> NngResult<OptionValue> {
    engine::pipe_get(self.inner.raw, name)
  }

  pub fn local_address(&self) -> NngResult<SockAddr> {
    self.get_option(opt::LOCAL_ADDRESS)?.into_addr()
  }

  pub fn remote_address(&self) -> NngResult<SockAddr> {
    self.get_option(opt::REMOTE_ADDRESS)?.into_addr()
  }

  pub fn url(&self) -> NngResult<String> {
    self.get_option(opt::URL)?.into_string()
  }

  /// The protocol spoken by the other end.
  pub fn peer(&self) -> NngResult<Protocol> {
    let id = self.get_option(opt::PEER)?.into_int()?;
    u16::try_from(id)
      .ok()
      .and_then(Protocol::from_id)
      .ok_or_else(|| NngError::Internal(format!("unknown peer protocol {id}")))
  }

  pub fn peer_name(&self) -> NngResult<String> {
    self.get_option(opt::PEER_NAME)?.into_string()
  }

  /// Sends `data` through the owning socket, addressed to this pipe.
  pub fn send(&self, data: &[u8]) -> NngResult<()> {
    self.send_message(&Message::with_pipe(data, self))
  }

  /// Addresses `msg` to this pipe and sends it through the owning socket.
  pub fn send_message(&self, msg: &Message) -> NngResult<()> {
    msg.set_pipe(self)?;
    self.socket()?.send_message(msg, true)
  }

  pub async fn async_send(&self, data: &[u8]) -> NngResult<()> {
    self.async_send_message(&Message::with_pipe(data, self)).await
  }

  pub async fn async_send_message(&self, msg: &Message) -> NngResult<()> {
    msg.set_pipe(self)?;
    self.socket()?.async_send_message(msg).await
  }
}

impl PartialEq for Pipe {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Eq for Pipe {}

impl fmt::Debug for Pipe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipe")
      .field("id", &self.id())
      .field("closed", &self.closed())
      .finish()
  }
}
