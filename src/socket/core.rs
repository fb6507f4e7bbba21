// src/socket/core.rs

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::dispatcher;
use super::endpoint::{Dialer, Listener};
use super::events::{PipeCallback, PipeEvent, PipeHooks};
use super::options::{self as opt, OptionValue, SocketConfig};
use super::pipe::Pipe;
use super::registry::REGISTRY;
use super::types::{DialMode, Protocol};
use crate::aio::{self, AsyncBackend};
use crate::context::Context;
use crate::engine::{self, AioTarget, RawPipe, RawSocket};
use crate::error::{NngError, NngResult};
use crate::message::{Message, Msg, OpFlags};

fn flags(blocking: bool) -> OpFlags {
  if blocking {
    OpFlags::empty()
  } else {
    OpFlags::NONBLOCK
  }
}

pub(crate) struct SocketInner {
  raw: RawSocket,
  protocol: Protocol,
  token: u64,
  closed: AtomicBool,
  // Reentrant so hooks can call back into the socket on the dispatching thread. No RefCell
  // borrow is held while hooks run.
  pipes: ReentrantMutex<RefCell<HashMap<u32, Pipe>>>,
  dialers: Mutex<HashMap<u32, Dialer>>,
  listeners: Mutex<HashMap<u32, Listener>>,
  hooks: RwLock<PipeHooks>,
  backend: Option<AsyncBackend>,
}

impl SocketInner {
  pub(crate) fn raw(&self) -> RawSocket {
    self.raw
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  pub(crate) fn ensure_open(&self) -> NngResult<()> {
    if self.is_closed() {
      Err(NngError::Closed)
    } else {
      Ok(())
    }
  }

  /// The configured async backend, or the one matching the calling context.
  pub(crate) fn backend(&self) -> AsyncBackend {
    self.backend.unwrap_or_else(AsyncBackend::detect)
  }

  pub(crate) fn forget_dialer(&self, id: u32) {
    self.dialers.lock().remove(&id);
  }

  pub(crate) fn forget_listener(&self, id: u32) {
    self.listeners.lock().remove(&id);
  }

  /// Wraps a received buffer, attaching the pipe it came in on if that pipe is still known.
  pub(crate) fn adopt_received(&self, msg: Msg) -> Message {
    let pipe_id = msg.pipe();
    let message = Message::adopt(msg);
    let Some(raw) = pipe_id else {
      return message;
    };
    let pipe = {
      let table = self.pipes.lock();
      let found = table.borrow().get(&raw.id()).cloned();
      found
    };
    match pipe {
      Some(pipe) => message.associate(pipe),
      None => tracing::warn!(socket_id = self.raw.id(), pipe_id = raw.id(), "Received message from an unknown pipe"),
    }
    message
  }

  fn run_hooks(&self, event: PipeEvent, pipe: &Pipe) {
    let hooks = self.hooks.read().get(event);
    for hook in hooks {
      hook.invoke(pipe, event);
    }
  }

  /// Applies one engine pipe notification to the pipe table and runs the user hooks.
  pub(crate) fn handle_pipe_event(self: &Arc<Self>, raw: RawPipe, event: PipeEvent) {
    let table = self.pipes.lock();
    let id = raw.id();
    match event {
      PipeEvent::PreAdd => {
        if self.is_closed() {
          return;
        }
        let pipe = Pipe::new(raw, Arc::downgrade(self));
        table.borrow_mut().insert(id, pipe.clone());
        self.run_hooks(event, &pipe);
        if pipe.closed() {
          table.borrow_mut().remove(&id);
          tracing::debug!(socket_id = self.raw.id(), pipe_id = id, "Pipe closed by pre-add hook");
        }
      }
      PipeEvent::PostAdd => {
        let pipe = table.borrow().get(&id).cloned();
        match pipe {
          Some(pipe) => self.run_hooks(event, &pipe),
          None => tracing::debug!(socket_id = self.raw.id(), pipe_id = id, "Post-add for a pipe not in the table"),
        }
      }
      PipeEvent::PostRemove => {
        let pipe = table.borrow().get(&id).cloned();
        let Some(pipe) = pipe else {
          tracing::debug!(socket_id = self.raw.id(), pipe_id = id, "Post-remove for a pipe not in the table");
          return;
        };
        self.run_hooks(event, &pipe);
        table.borrow_mut().remove(&id);
      }
    }
  }

  fn close(&self) -> NngResult<()> {
    if self.closed.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    let result = match engine::socket_close(self.raw) {
      Ok(()) | Err(NngError::Closed) => Ok(()),
      Err(e) => Err(e),
    };
    self.dialers.lock().clear();
    self.listeners.lock().clear();
    self.pipes.lock().borrow_mut().clear();
    tracing::debug!(socket_id = self.raw.id(), protocol = %self.protocol, "Socket closed");
    result
  }
}

impl Drop for SocketInner {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      tracing::error!(socket_id = self.raw.id(), error = %e, "Error closing dropped socket");
    }
    REGISTRY.unregister(self.token);
  }
}

/// A scalability-protocol socket.
///
/// `Socket` is a cheap, clonable handle; the socket closes when [`close`](Socket::close) is
/// called or the last handle (including those held by contexts) is dropped.
#[derive(Clone)]
pub struct Socket {
  inner: Arc<SocketInner>,
}

impl Socket {
  /// Opens a socket speaking `protocol` with default settings.
  pub fn new(protocol: Protocol) -> NngResult<Self> {
    Self::open(protocol, SocketConfig::default())
  }

  /// Opens a socket, applies `config`, then listens and dials the configured addresses.
  pub fn open(protocol: Protocol, config: SocketConfig) -> NngResult<Self> {
    let raw = engine::socket_open(protocol).map_err(|e| NngError::ProtocolOpen {
      protocol: protocol.name(),
      reason: e.to_string(),
    })?;
    for (name, value) in config.initial_options() {
      if let Err(e) = engine::socket_set(raw, name, value) {
        tracing::debug!(socket_id = raw.id(), option = name, error = %e, "Rejected initial option");
        if let Err(close_err) = engine::socket_close(raw) {
          tracing::debug!(socket_id = raw.id(), error = %close_err, "Close after failed setup");
        }
        return Err(e);
      }
    }

    let inner = Arc::new_cyclic(|weak: &Weak<SocketInner>| SocketInner {
      raw,
      protocol,
      token: REGISTRY.register(weak.clone()),
      closed: AtomicBool::new(false),
      pipes: ReentrantMutex::new(RefCell::new(HashMap::new())),
      dialers: Mutex::new(HashMap::new()),
      listeners: Mutex::new(HashMap::new()),
      hooks: RwLock::new(PipeHooks::default()),
      backend: config.async_backend,
    });
    let socket = Socket { inner };
    for event in PipeEvent::ALL {
      engine::pipe_notify(raw, event, dispatcher::on_pipe_event, socket.inner.token)?;
    }
    tracing::debug!(socket_id = raw.id(), %protocol, "Socket opened");

    for url in &config.listen {
      socket.listen(url)?;
    }
    for url in &config.dial {
      socket.dial(url, config.dial_mode)?;
    }
    Ok(socket)
  }

  pub(crate) fn from_inner(inner: Arc<SocketInner>) -> Self {
    Self { inner }
  }

  pub(crate) fn inner(&self) -> &Arc<SocketInner> {
    &self.inner
  }

  fn target(&self) -> AioTarget {
    AioTarget::Socket(self.inner.raw)
  }

  pub fn id(&self) -> u32 {
    self.inner.raw.id()
  }

  pub fn protocol(&self) -> Protocol {
    self.inner.protocol
  }

  pub fn is_closed(&self) -> bool {
    self.inner.is_closed()
  }

  // --- Endpoints ---

  /// Dials `url`. See [`DialMode`] for how the first attempt is handled.
  pub fn dial(&self, url: &str, mode: DialMode) -> NngResult<Dialer> {
    self.inner.ensure_open()?;
    let raw = self.inner.raw;
    let dialer = match mode {
      DialMode::Blocking => engine::dial(raw, url, OpFlags::empty())?,
      DialMode::NonBlocking => engine::dial(raw, url, OpFlags::NONBLOCK)?,
      DialMode::Auto => match engine::dial(raw, url, OpFlags::empty()) {
        Ok(d) => d,
        Err(NngError::ConnectionRefused(_)) => {
          tracing::warn!(
            socket_id = raw.id(),
            %url,
            "Synchronous dial refused, retrying in the background"
          );
          engine::dial(raw, url, OpFlags::NONBLOCK)?
        }
        Err(e) => return Err(e),
      },
    };
    let dialer = Dialer::new(dialer, Arc::downgrade(&self.inner));
    self.inner.dialers.lock().insert(dialer.id(), dialer.clone());
    tracing::info!(socket_id = raw.id(), dialer_id = dialer.id(), %url, ?mode, "Dialer started");
    Ok(dialer)
  }

  /// Binds `url` and starts accepting connections.
  pub fn listen(&self, url: &str) -> NngResult<Listener> {
    self.inner.ensure_open()?;
    let raw = engine::listen(self.inner.raw, url)?;
    let listener = Listener::new(raw, Arc::downgrade(&self.inner));
    self.inner.listeners.lock().insert(listener.id(), listener.clone());
    Ok(listener)
  }

  pub fn dialers(&self) -> Vec<Dialer> {
    let mut dialers: Vec<_> = self.inner.dialers.lock().values().cloned().collect();
    dialers.sort_by_key(Dialer::id);
    dialers
  }

  pub fn listeners(&self) -> Vec<Listener> {
    let mut listeners: Vec<_> = self.inner.listeners.lock().values().cloned().collect();
    listeners.sort_by_key(Listener::id);
    listeners
  }

  /// Snapshot of the live pipes, ordered by id.
  pub fn pipes(&self) -> Vec<Pipe> {
    let table = self.inner.pipes.lock();
    let mut pipes: Vec<_> = table.borrow().values().cloned().collect();
    pipes.sort_by_key(Pipe::id);
    pipes
  }

  /// Closes the socket. Safe to call more than once, and from a pipe hook.
  pub fn close(&self) -> NngResult<()> {
    self.inner.close()
  }

  // --- Data path ---

  pub fn send(&self, data: &[u8]) -> NngResult<()> {
    self.inner.ensure_open()?;
    engine::send(self.target(), Msg::from_slice(data), OpFlags::empty())
  }

  /// Receives one message body. With `blocking == false` an empty queue fails with
  /// `WouldBlock`.
  pub fn recv(&self, blocking: bool) -> NngResult<Bytes> {
    self.inner.ensure_open()?;
    engine::recv(self.target(), flags(blocking)).map(Msg::into_bytes)
  }

  /// Sends `msg`, consuming its buffer once the send succeeds. A message can be sent only once;
  /// after a failed send (`Timeout`, or `WouldBlock` with `blocking == false`) it stays live.
  pub fn send_message(&self, msg: &Message, blocking: bool) -> NngResult<()> {
    self.inner.ensure_open()?;
    msg.send_with(|raw| engine::send_msg(self.target(), raw, flags(blocking)))
  }

  pub fn recv_message(&self, blocking: bool) -> NngResult<Message> {
    self.inner.ensure_open()?;
    let msg = engine::recv(self.target(), flags(blocking))?;
    Ok(self.inner.adopt_received(msg))
  }

  pub async fn async_send(&self, data: &[u8]) -> NngResult<()> {
    self.inner.ensure_open()?;
    aio::send(self.inner.backend(), self.target(), Msg::from_slice(data)).await
  }

  pub async fn async_recv(&self) -> NngResult<Bytes> {
    self.inner.ensure_open()?;
    aio::recv(self.inner.backend(), self.target()).await.map(Msg::into_bytes)
  }

  pub async fn async_send_message(&self, msg: &Message) -> NngResult<()> {
    self.inner.ensure_open()?;
    let raw = msg.with_sendable(|m| m)?;
    aio::send(self.inner.backend(), self.target(), raw).await
  }

  pub async fn async_recv_message(&self) -> NngResult<Message> {
    self.inner.ensure_open()?;
    let msg = aio::recv(self.inner.backend(), self.target()).await?;
    Ok(self.inner.adopt_received(msg))
  }

  // --- Contexts ---

  pub fn new_context(&self) -> NngResult<Context> {
    self.inner.ensure_open()?;
    Context::open(self.clone())
  }

  pub fn new_contexts(&self, count: usize) -> NngResult<Vec<Context>> {
    (0..count).map(|_| self.new_context()).collect()
  }

  // --- Hooks ---

  fn add_hook(&self, event: PipeEvent, cb: PipeCallback) {
    self.inner.hooks.write().add(event, cb);
  }

  fn remove_hook(&self, event: PipeEvent, cb: &PipeCallback) -> bool {
    self.inner.hooks.write().remove(event, cb)
  }

  /// Runs `cb` before a new pipe joins the socket. Closing the pipe from the hook rejects it.
  pub fn add_pre_add_callback(&self, cb: PipeCallback) {
    self.add_hook(PipeEvent::PreAdd, cb);
  }

  pub fn add_post_add_callback(&self, cb: PipeCallback) {
    self.add_hook(PipeEvent::PostAdd, cb);
  }

  pub fn add_post_remove_callback(&self, cb: PipeCallback) {
    self.add_hook(PipeEvent::PostRemove, cb);
  }

  pub fn remove_pre_add_callback(&self, cb: &PipeCallback) -> bool {
    self.remove_hook(PipeEvent::PreAdd, cb)
  }

  pub fn remove_post_add_callback(&self, cb: &PipeCallback) -> bool {
    self.remove_hook(PipeEvent::PostAdd, cb)
  }

  pub fn remove_post_remove_callback(&self, cb: &PipeCallback) -> bool {
    self.remove_hook(PipeEvent::PostRemove, cb)
  }

  // --- Options ---

  pub fn get_option(&self, name: &str) -> NngResult<OptionValue> {
    engine::socket_get(self.inner.raw, name)
  }

  pub fn set_option(&self, name: &str, value: impl Into<OptionValue>) -> NngResult<()> {
    engine::socket_set(self.inner.raw, name, value.into())
  }

  pub fn name(&self) -> NngResult<String> {
    self.get_option(opt::SOCKET_NAME)?.into_string()
  }

  pub fn set_name(&self, name: &str) -> NngResult<()> {
    self.set_option(opt::SOCKET_NAME, name)
  }

  /// `None` means receives wait forever.
  pub fn recv_timeout(&self) -> NngResult<Option<Duration>> {
    self.get_option(opt::RECV_TIMEOUT)?.into_ms()
  }

  pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> NngResult<()> {
    self.set_option(opt::RECV_TIMEOUT, timeout)
  }

  pub fn send_timeout(&self) -> NngResult<Option<Duration>> {
    self.get_option(opt::SEND_TIMEOUT)?.into_ms()
  }

  pub fn set_send_timeout(&self, timeout: Option<Duration>) -> NngResult<()> {
    self.set_option(opt::SEND_TIMEOUT, timeout)
  }

  pub fn recv_buffer_size(&self) -> NngResult<i32> {
    self.get_option(opt::RECV_BUFFER)?.into_int()
  }

  pub fn set_recv_buffer_size(&self, depth: i32) -> NngResult<()> {
    self.set_option(opt::RECV_BUFFER, depth)
  }

  pub fn send_buffer_size(&self) -> NngResult<i32> {
    self.get_option(opt::SEND_BUFFER)?.into_int()
  }

  pub fn set_send_buffer_size(&self, depth: i32) -> NngResult<()> {
    self.set_option(opt::SEND_BUFFER, depth)
  }

  pub fn recv_max_size(&self) -> NngResult<usize> {
    self.get_option(opt::RECV_SIZE_MAX)?.into_size()
  }

  pub fn set_recv_max_size(&self, bytes: usize) -> NngResult<()> {
    self.set_option(opt::RECV_SIZE_MAX, bytes)
  }

  pub fn reconnect_time_min(&self) -> NngResult<Option<Duration>> {
    self.get_option(opt::RECONNECT_TIME_MIN)?.into_ms()
  }

  pub fn reconnect_time_max(&self) -> NngResult<Option<Duration>> {
    self.get_option(opt::RECONNECT_TIME_MAX)?.into_ms()
  }

  pub fn protocol_name(&self) -> &'static str {
    self.inner.protocol.name()
  }

  pub fn peer_name(&self) -> &'static str {
    self.inner.protocol.peer_name()
  }

  /// Adds a subscription prefix. Sub0 only; the empty topic matches everything.
  pub fn subscribe(&self, topic: &[u8]) -> NngResult<()> {
    engine::subscribe(self.inner.raw, topic, true)
  }

  pub fn unsubscribe(&self, topic: &[u8]) -> NngResult<()> {
    engine::subscribe(self.inner.raw, topic, false)
  }
}

impl PartialEq for Socket {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Eq for Socket {}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket")
      .field("id", &self.id())
      .field("protocol", &self.inner.protocol)
      .field("closed", &self.is_closed())
      .finish()
  }
}
