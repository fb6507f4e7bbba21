// src/engine/mod.rs

//! The protocol engine.
//!
//! Engine objects (sockets, dialers, listeners, pipes, contexts) live in process-wide id tables
//! and are addressed through small copyable handles. Connection I/O runs on the engine runtime;
//! pipe lifecycle changes are reported through a per-socket notification callback that fires on
//! engine threads (or on the closing thread during socket close).
//!
//! Everything here is crate-private. The public object layer in [`crate::socket`] wraps these
//! handles.

pub(crate) mod core;
pub(crate) mod endpoint;
pub(crate) mod options;
pub(crate) mod pipe;
pub(crate) mod protocol;

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use self::core::{SocketCore, SOCKET_CTX};
use self::endpoint::EndpointCore;
use self::pipe::PipeCore;
use crate::error::{NngError, NngResult};
use crate::message::{Msg, OpFlags};
use crate::runtime::{self, Aio, IdMap};
use crate::socket::options::OptionValue;
use crate::socket::Protocol;

macro_rules! raw_handle {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct $name(pub(crate) u32);

    impl $name {
      pub fn id(self) -> u32 {
        self.0
      }
    }
  };
}

raw_handle!(RawSocket);
raw_handle!(RawDialer);
raw_handle!(RawListener);
raw_handle!(
  /// Copied by value everywhere: the id is reused once the pipe is gone.
  RawPipe
);
raw_handle!(RawCtx);

/// Pipe lifecycle transitions reported to socket hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeEvent {
  /// The connection is negotiated but not yet part of the socket. Closing the pipe here
  /// rejects it.
  PreAdd,
  /// The pipe is attached and carries traffic.
  PostAdd,
  /// The pipe has left the socket.
  PostRemove,
}

impl PipeEvent {
  pub const ALL: [PipeEvent; 3] = [PipeEvent::PreAdd, PipeEvent::PostAdd, PipeEvent::PostRemove];

  pub(crate) fn index(self) -> usize {
    match self {
      PipeEvent::PreAdd => 0,
      PipeEvent::PostAdd => 1,
      PipeEvent::PostRemove => 2,
    }
  }
}

/// Notification entry point: `(pipe, event, correlation token)`. Must not block indefinitely.
pub(crate) type PipeNotifyFn = fn(RawPipe, PipeEvent, u64);

/// What an aio operation runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AioTarget {
  Socket(RawSocket),
  Context(RawCtx),
}

#[derive(Default)]
struct Engine {
  sockets: Mutex<IdMap<Arc<SocketCore>>>,
  dialers: Mutex<IdMap<Arc<EndpointCore>>>,
  listeners: Mutex<IdMap<Arc<EndpointCore>>>,
  pipes: Mutex<IdMap<Arc<PipeCore>>>,
  // Context id -> owning socket.
  contexts: Mutex<IdMap<Arc<SocketCore>>>,
}

static ENGINE: Lazy<Engine> = Lazy::new(Engine::default);

fn socket_core(raw: RawSocket) -> NngResult<Arc<SocketCore>> {
  ENGINE.sockets.lock().get(raw.0).cloned().ok_or(NngError::Closed)
}

fn dialer_core(raw: RawDialer) -> NngResult<Arc<EndpointCore>> {
  ENGINE.dialers.lock().get(raw.0).cloned().ok_or(NngError::Closed)
}

fn listener_core(raw: RawListener) -> NngResult<Arc<EndpointCore>> {
  ENGINE.listeners.lock().get(raw.0).cloned().ok_or(NngError::Closed)
}

fn pipe_core(raw: RawPipe) -> NngResult<Arc<PipeCore>> {
  ENGINE.pipes.lock().get(raw.0).cloned().ok_or(NngError::Closed)
}

fn resolve(target: AioTarget) -> NngResult<(Arc<SocketCore>, u32)> {
  match target {
    AioTarget::Socket(raw) => Ok((socket_core(raw)?, SOCKET_CTX)),
    AioTarget::Context(raw) => {
      let core = ENGINE.contexts.lock().get(raw.0).cloned().ok_or(NngError::Closed)?;
      Ok((core, raw.0))
    }
  }
}

// --- Sockets ---

pub(crate) fn socket_open(protocol: Protocol) -> NngResult<RawSocket> {
  // Start the I/O threads up front so later calls never fail on runtime start-up.
  runtime::handle()?;
  let id = ENGINE
    .sockets
    .lock()
    .alloc(|id| Arc::new(SocketCore::new(id, protocol)));
  tracing::debug!(socket_id = id, %protocol, "Engine socket opened");
  Ok(RawSocket(id))
}

/// Closes a socket: its endpoints stop, its contexts go away, waiting operations fail with
/// `Closed` and every pipe is torn down on the calling thread.
pub(crate) fn socket_close(raw: RawSocket) -> NngResult<()> {
  let core = ENGINE.sockets.lock().remove(raw.0).ok_or(NngError::Closed)?;
  let owned = core.shut_down();
  for id in owned.dialers {
    let ep = ENGINE.dialers.lock().remove(id);
    if let Some(ep) = ep {
      ep.close();
    }
  }
  for id in owned.listeners {
    let ep = ENGINE.listeners.lock().remove(id);
    if let Some(ep) = ep {
      ep.close();
    }
  }
  {
    let mut contexts = ENGINE.contexts.lock();
    for id in owned.contexts {
      contexts.remove(id);
    }
  }
  core.teardown_pipes();
  tracing::debug!(socket_id = raw.0, "Engine socket closed");
  Ok(())
}

pub(crate) fn pipe_notify(raw: RawSocket, event: PipeEvent, cb: PipeNotifyFn, arg: u64) -> NngResult<()> {
  socket_core(raw)?.set_notify(event, cb, arg);
  Ok(())
}

pub(crate) fn subscribe(raw: RawSocket, topic: &[u8], add: bool) -> NngResult<()> {
  socket_core(raw)?.subscribe(topic, add)
}

// --- Data path ---

pub(crate) fn aio_send(target: AioTarget, aio: &Aio) {
  match resolve(target) {
    Ok((core, ctx)) => core.send(ctx, aio.handle()),
    Err(e) => aio.handle().fail_now(e),
  }
}

pub(crate) fn aio_recv(target: AioTarget, aio: &Aio) {
  match resolve(target) {
    Ok((core, ctx)) => core.recv(ctx, aio.handle()),
    Err(e) => aio.handle().fail_now(e),
  }
}

/// Sends on a socket or context, blocking the calling thread until done.
pub(crate) fn send(target: AioTarget, msg: Msg, flags: OpFlags) -> NngResult<()> {
  send_msg(target, msg, flags).map_err(|(e, _)| e)
}

/// Like [`send`], but a failed send hands the message back with its protocol header cleared.
pub(crate) fn send_msg(target: AioTarget, msg: Msg, flags: OpFlags) -> Result<(), (NngError, Option<Msg>)> {
  let aio = Aio::new(None);
  aio.set_msg(msg);
  aio.set_nonblock(flags.contains(OpFlags::NONBLOCK));
  aio_send(target, &aio);
  aio.wait();
  aio.result().map_err(|e| {
    let returned = aio.take_msg().map(|mut msg| {
      msg.set_header(&[]);
      msg
    });
    (e, returned)
  })
}

/// Receives on a socket or context, blocking the calling thread until done.
pub(crate) fn recv(target: AioTarget, flags: OpFlags) -> NngResult<Msg> {
  let aio = Aio::new(None);
  aio.set_nonblock(flags.contains(OpFlags::NONBLOCK));
  aio_recv(target, &aio);
  aio.wait();
  aio.result()?;
  aio
    .take_msg()
    .ok_or_else(|| NngError::Internal("receive completed without a message".into()))
}

// --- Contexts ---

pub(crate) fn ctx_open(raw: RawSocket) -> NngResult<RawCtx> {
  let core = socket_core(raw)?;
  if !core.protocol.supports_contexts() {
    return Err(NngError::NotSupported("contexts"));
  }
  let id = ENGINE.contexts.lock().alloc(|_| core.clone());
  core.add_context(id);
  tracing::debug!(socket_id = raw.0, ctx_id = id, "Context opened");
  Ok(RawCtx(id))
}

pub(crate) fn ctx_close(raw: RawCtx) -> NngResult<()> {
  let core = ENGINE.contexts.lock().remove(raw.0).ok_or(NngError::Closed)?;
  core.remove_context(raw.0);
  tracing::debug!(socket_id = core.id, ctx_id = raw.0, "Context closed");
  Ok(())
}

// --- Endpoints and pipes ---

pub(crate) fn dial(raw: RawSocket, url: &str, flags: OpFlags) -> NngResult<RawDialer> {
  endpoint::dial(&socket_core(raw)?, url, flags)
}

pub(crate) fn listen(raw: RawSocket, url: &str) -> NngResult<RawListener> {
  endpoint::listen(&socket_core(raw)?, url)
}

pub(crate) fn dialer_close(raw: RawDialer) -> NngResult<()> {
  let ep = ENGINE.dialers.lock().remove(raw.0).ok_or(NngError::Closed)?;
  ep.close();
  Ok(())
}

pub(crate) fn listener_close(raw: RawListener) -> NngResult<()> {
  let ep = ENGINE.listeners.lock().remove(raw.0).ok_or(NngError::Closed)?;
  ep.close();
  Ok(())
}

/// Requests a pipe close. Teardown and the post-remove notification happen on the pipe's
/// I/O task, or right after the pre-add notification if called from there.
pub(crate) fn pipe_close(raw: RawPipe) -> NngResult<()> {
  pipe_core(raw)?.close();
  Ok(())
}

pub(crate) fn pipe_dialer(raw: RawPipe) -> NngResult<Option<RawDialer>> {
  Ok(pipe_core(raw)?.dialer.map(RawDialer))
}

pub(crate) fn pipe_listener(raw: RawPipe) -> NngResult<Option<RawListener>> {
  Ok(pipe_core(raw)?.listener.map(RawListener))
}

// --- Options ---

pub(crate) fn socket_get(raw: RawSocket, name: &str) -> NngResult<OptionValue> {
  options::SOCKET_OPTIONS.get(&*socket_core(raw)?, name)
}

pub(crate) fn socket_set(raw: RawSocket, name: &str, value: OptionValue) -> NngResult<()> {
  options::SOCKET_OPTIONS.set(&*socket_core(raw)?, name, value)
}

pub(crate) fn dialer_get(raw: RawDialer, name: &str) -> NngResult<OptionValue> {
  options::DIALER_OPTIONS.get(&*dialer_core(raw)?, name)
}

pub(crate) fn dialer_set(raw: RawDialer, name: &str, value: OptionValue) -> NngResult<()> {
  options::DIALER_OPTIONS.set(&*dialer_core(raw)?, name, value)
}

pub(crate) fn listener_get(raw: RawListener, name: &str) -> NngResult<OptionValue> {
  options::LISTENER_OPTIONS.get(&*listener_core(raw)?, name)
}

pub(crate) fn listener_set(raw: RawListener, name: &str, value: OptionValue) -> NngResult<()> {
  options::LISTENER_OPTIONS.set(&*listener_core(raw)?, name, value)
}

pub(crate) fn pipe_get(raw: RawPipe, name: &str) -> NngResult<OptionValue> {
  options::PIPE_OPTIONS.get(&*pipe_core(raw)?, name)
}
