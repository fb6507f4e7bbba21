// src/engine/core.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

use super::endpoint::{EndpointKind, EndpointOptions};
use super::pipe::PipeCore;
use super::protocol::{ProtoState, Ready, Route, SendParams, Target};
use super::{PipeEvent, PipeNotifyFn, RawPipe};
use crate::error::{NngError, NngResult};
use crate::message::Msg;
use crate::runtime::aio::CancelFn;
use crate::runtime::AioRef;
use crate::socket::Protocol;

/// Context id of the socket's own implicit context.
pub(crate) const SOCKET_CTX: u32 = 0;

const MAX_QUEUE_DEPTH: i32 = 8192;

#[derive(Debug, Clone)]
pub(crate) struct CoreOptions {
  pub name: String,
  pub recv_buffer: i32,
  pub send_buffer: i32,
  pub recv_timeout: Option<Duration>,
  pub send_timeout: Option<Duration>,
  pub ttl_max: i32,
  pub recv_max_size: usize,
  pub reconnect_min: Duration,
  pub reconnect_max: Duration,
  pub tcp_nodelay: bool,
  pub tcp_keepalive: bool,
  pub polyamorous: bool,
  pub survey_time: Duration,
}

impl CoreOptions {
  fn new(id: u32) -> Self {
    Self {
      name: id.to_string(),
      recv_buffer: 128,
      send_buffer: 128,
      recv_timeout: None,
      send_timeout: None,
      ttl_max: 8,
      recv_max_size: 1024 * 1024,
      reconnect_min: Duration::from_millis(100),
      reconnect_max: Duration::ZERO,
      tcp_nodelay: true,
      tcp_keepalive: false,
      polyamorous: false,
      survey_time: Duration::from_secs(1),
    }
  }
}

/// Checks a queue depth written through the option surface.
pub(crate) fn validate_depth(name: &str, depth: i32) -> NngResult<i32> {
  if (0..=MAX_QUEUE_DEPTH).contains(&depth) {
    Ok(depth)
  } else {
    Err(NngError::InvalidArgument(format!("{} must be within 0..={}", name, MAX_QUEUE_DEPTH)))
  }
}

struct PipeLink {
  core: Arc<PipeCore>,
  tx: mpsc::Sender<Msg>,
}

struct Waiter {
  ctx: u32,
  aio: AioRef,
  route: Route,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
  Send,
  Recv,
}

#[derive(Default)]
struct CoreState {
  closed: bool,
  pipes: BTreeMap<u32, PipeLink>,
  rr_next: u32,
  recv_queue: VecDeque<Msg>,
  recv_waiters: VecDeque<Waiter>,
  send_waiters: VecDeque<Waiter>,
  dialers: BTreeSet<u32>,
  listeners: BTreeSet<u32>,
}

/// Objects a socket owned at the moment it closed.
#[derive(Debug, Default)]
pub(crate) struct Owned {
  pub dialers: Vec<u32>,
  pub listeners: Vec<u32>,
  pub contexts: Vec<u32>,
}

/// The engine half of a socket: routing state, queues and attached pipes.
pub(crate) struct SocketCore {
  pub id: u32,
  pub protocol: Protocol,
  pub(crate) options: RwLock<CoreOptions>,
  state: Mutex<CoreState>,
  proto: Mutex<ProtoState>,
  notify: RwLock<[Option<(PipeNotifyFn, u64)>; 3]>,
  /// Signalled whenever a receive makes room in (or starts waiting on) the receive queue.
  pub(crate) recv_space: Notify,
  closed: AtomicBool,
}

impl SocketCore {
  pub fn new(id: u32, protocol: Protocol) -> Self {
    Self {
      id,
      protocol,
      options: RwLock::new(CoreOptions::new(id)),
      state: Mutex::new(CoreState::default()),
      proto: Mutex::new(ProtoState::new(protocol)),
      notify: RwLock::new([None; 3]),
      recv_space: Notify::new(),
      closed: AtomicBool::new(false),
    }
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  pub fn set_notify(&self, event: PipeEvent, cb: PipeNotifyFn, arg: u64) {
    self.notify.write()[event.index()] = Some((cb, arg));
  }

  /// Runs the registered notification for `event`. Never called with the state lock held.
  pub fn fire(&self, pipe: RawPipe, event: PipeEvent) {
    let slot = self.notify.read()[event.index()];
    if let Some((cb, arg)) = slot {
      if std::panic::catch_unwind(|| cb(pipe, event, arg)).is_err() {
        tracing::error!(socket_id = self.id, pipe_id = pipe.id(), ?event, "Pipe notification panicked");
      }
    }
  }

  pub fn endpoint_defaults(&self) -> EndpointOptions {
    let opts = self.options.read();
    EndpointOptions {
      reconnect_min: opts.reconnect_min,
      reconnect_max: opts.reconnect_max,
      recv_max_size: opts.recv_max_size,
      tcp_nodelay: opts.tcp_nodelay,
      tcp_keepalive: opts.tcp_keepalive,
    }
  }

  pub fn send_depth(&self) -> usize {
    self.options.read().send_buffer.max(1) as usize
  }

  fn send_params(&self) -> (SendParams, Option<Duration>) {
    let opts = self.options.read();
    (
      SendParams {
        survey_time: opts.survey_time,
        polyamorous: opts.polyamorous,
      },
      opts.send_timeout,
    )
  }

  pub fn subscribe(&self, topic: &[u8], add: bool) -> NngResult<()> {
    if self.protocol != Protocol::Sub0 {
      return Err(NngError::NotSupported("subscriptions"));
    }
    self.proto.lock().subscribe(topic, add)
  }

  // --- Endpoints and contexts ---

  pub fn add_endpoint(&self, kind: EndpointKind, id: u32) -> NngResult<()> {
    let mut st = self.state.lock();
    if st.closed {
      return Err(NngError::Closed);
    }
    match kind {
      EndpointKind::Dialer => st.dialers.insert(id),
      EndpointKind::Listener => st.listeners.insert(id),
    };
    Ok(())
  }

  pub fn remove_endpoint(&self, kind: EndpointKind, id: u32) {
    let mut st = self.state.lock();
    match kind {
      EndpointKind::Dialer => st.dialers.remove(&id),
      EndpointKind::Listener => st.listeners.remove(&id),
    };
  }

  pub fn add_context(&self, ctx: u32) {
    self.proto.lock().add_context(ctx);
  }

  /// Drops a context. Operations waiting on it fail with `Closed`.
  pub fn remove_context(&self, ctx: u32) {
    let failed = {
      let mut guard = self.state.lock();
      let st = &mut *guard;
      self.proto.lock().remove_context(ctx);
      let mut failed = Vec::new();
      for queue in [&mut st.recv_waiters, &mut st.send_waiters] {
        let (gone, kept): (VecDeque<Waiter>, VecDeque<Waiter>) = queue.drain(..).partition(|w| w.ctx == ctx);
        *queue = kept;
        failed.extend(gone.into_iter().map(|w| w.aio));
      }
      failed
    };
    for aio in failed {
      aio.finish(Err(NngError::Closed));
    }
  }

  /// Marks the socket closed and fails every waiting operation. Returns what the socket owned.
  pub fn shut_down(&self) -> Owned {
    self.closed.store(true, Ordering::Release);
    let (owned, waiters) = {
      let mut st = self.state.lock();
      st.closed = true;
      st.recv_queue.clear();
      let owned = Owned {
        dialers: std::mem::take(&mut st.dialers).into_iter().collect(),
        listeners: std::mem::take(&mut st.listeners).into_iter().collect(),
        contexts: self.proto.lock().context_ids(),
      };
      let mut waiters: Vec<AioRef> = st.recv_waiters.drain(..).map(|w| w.aio).collect();
      waiters.extend(st.send_waiters.drain(..).map(|w| w.aio));
      (owned, waiters)
    };
    for aio in waiters {
      aio.finish(Err(NngError::Closed));
    }
    self.recv_space.notify_waiters();
    owned
  }

  // --- Pipes ---

  /// Attaches a negotiated pipe. Pair sockets (pair1 unless polyamorous) take a single peer.
  pub fn add_pipe(&self, pipe: &Arc<PipeCore>, tx: mpsc::Sender<Msg>) -> NngResult<()> {
    let polyamorous = self.options.read().polyamorous;
    let mut st = self.state.lock();
    if st.closed {
      return Err(NngError::Closed);
    }
    let exclusive = match self.protocol {
      Protocol::Pair0 => true,
      Protocol::Pair1 => !polyamorous,
      _ => false,
    };
    if exclusive && !st.pipes.is_empty() {
      return Err(NngError::InvalidState("pair socket already has a peer"));
    }
    st.pipes.insert(
      pipe.id,
      PipeLink {
        core: pipe.clone(),
        tx,
      },
    );
    tracing::debug!(socket_id = self.id, pipe_id = pipe.id, pipes = st.pipes.len(), "Pipe attached");
    Ok(())
  }

  pub fn remove_pipe(&self, pipe_id: u32) {
    let removed = self.state.lock().pipes.remove(&pipe_id);
    if removed.is_some() {
      tracing::debug!(socket_id = self.id, pipe_id, "Pipe detached");
    }
  }

  /// Detaches every pipe on the calling thread, firing post-remove for each.
  pub fn teardown_pipes(&self) {
    let pipes: Vec<Arc<PipeCore>> = self.state.lock().pipes.values().map(|l| l.core.clone()).collect();
    for pipe in pipes {
      pipe.detach(self);
    }
  }

  // --- Data path ---

  fn dispatch(&self, st: &mut CoreState, msg: Msg, route: Route) -> Result<(), Msg> {
    match route {
      Route::Broadcast { except } => {
        for (id, link) in st.pipes.iter() {
          if Some(*id) == except {
            continue;
          }
          if let Err(TrySendError::Full(_)) = link.tx.try_send(msg.duplicate()) {
            tracing::trace!(socket_id = self.id, pipe_id = *id, "Pipe full, broadcast copy dropped");
          }
        }
        Ok(())
      }
      Route::Any => {
        let order: Vec<u32> = st
          .pipes
          .range(st.rr_next..)
          .chain(st.pipes.range(..st.rr_next))
          .map(|(id, _)| *id)
          .collect();
        let mut msg = msg;
        for id in order {
          let Some(link) = st.pipes.get(&id) else { continue };
          match link.tx.try_send(msg) {
            Ok(()) => {
              st.rr_next = id.wrapping_add(1);
              return Ok(());
            }
            Err(TrySendError::Full(m)) | Err(TrySendError::Closed(m)) => msg = m,
          }
        }
        Err(msg)
      }
      Route::Direct(id) => {
        let Some(link) = st.pipes.get(&id) else {
          tracing::debug!(socket_id = self.id, pipe_id = id, "Destination pipe gone, message dropped");
          return Ok(());
        };
        match link.tx.try_send(msg) {
          Ok(()) | Err(TrySendError::Closed(_)) => Ok(()),
          Err(TrySendError::Full(m)) => Err(m),
        }
      }
    }
  }

  /// Queues an operation and arms its cancellation and deadline.
  fn arm(self: &Arc<Self>, aio: &AioRef, queue: Queue, ctx: u32, default: Option<Duration>, cap: Option<Duration>) {
    let weak: Weak<SocketCore> = Arc::downgrade(self);
    let cancel: CancelFn = Box::new(move |aio: &AioRef, err: NngError| {
      let Some(core) = weak.upgrade() else {
        aio.finish(Err(err));
        return;
      };
      if core.take_waiter(queue, aio) {
        if queue == Queue::Recv && err == NngError::Timeout {
          core.proto.lock().expire_survey(ctx);
        }
        aio.finish(Err(err));
      }
    });
    if let Err(e) = aio.schedule(cancel, default, cap) {
      if self.take_waiter(queue, aio) {
        aio.finish(Err(e));
      }
    }
  }

  /// Removes a waiting operation. Whoever removes it finishes it.
  fn take_waiter(&self, queue: Queue, aio: &AioRef) -> bool {
    let mut st = self.state.lock();
    let waiters = match queue {
      Queue::Send => &mut st.send_waiters,
      Queue::Recv => &mut st.recv_waiters,
    };
    match waiters.iter().position(|w| Arc::ptr_eq(&w.aio, aio)) {
      Some(i) => {
        waiters.remove(i);
        true
      }
      None => false,
    }
  }

  pub fn send(self: &Arc<Self>, ctx: u32, aio: AioRef) {
    if !aio.begin() {
      return;
    }
    if !self.protocol.can_send() {
      aio.finish(Err(NngError::NotSupported("send")));
      return;
    }
    // A failed send leaves the message in the aio for the caller to take back.
    let Some(mut msg) = aio.take_msg() else {
      aio.finish(Err(NngError::InvalidArgument("no message to send".into())));
      return;
    };
    let (params, timeout) = self.send_params();
    let mut st = self.state.lock();
    if st.closed {
      drop(st);
      aio.put_msg(msg);
      aio.finish(Err(NngError::Closed));
      return;
    }
    let prepared = self.proto.lock().prepare_send(ctx, &mut msg, params);
    let route = match prepared {
      Ok(route) => route,
      Err(e) => {
        drop(st);
        aio.put_msg(msg);
        aio.finish(Err(e));
        return;
      }
    };
    match self.dispatch(&mut st, msg, route) {
      Ok(()) => {
        drop(st);
        aio.finish(Ok(()));
      }
      Err(msg) if aio.is_nonblocking() => {
        drop(st);
        aio.put_msg(msg);
        aio.finish(Err(NngError::WouldBlock));
      }
      Err(msg) => {
        aio.put_msg(msg);
        st.send_waiters.push_back(Waiter {
          ctx,
          aio: aio.clone(),
          route,
        });
        drop(st);
        self.arm(&aio, Queue::Send, ctx, timeout, None);
      }
    }
  }

  /// Retries queued sends after a pipe gained room or a new pipe arrived.
  pub fn flush_send_waiters(&self) {
    let mut done = Vec::new();
    {
      let mut st = self.state.lock();
      while let Some(waiter) = st.send_waiters.pop_front() {
        let Some(msg) = waiter.aio.take_msg() else {
          done.push(waiter.aio);
          continue;
        };
        match self.dispatch(&mut st, msg, waiter.route) {
          Ok(()) => done.push(waiter.aio),
          Err(msg) => {
            waiter.aio.put_msg(msg);
            st.send_waiters.push_front(waiter);
            break;
          }
        }
      }
    }
    for aio in done {
      aio.finish(Ok(()));
    }
  }

  pub fn recv(self: &Arc<Self>, ctx: u32, aio: AioRef) {
    if !aio.begin() {
      return;
    }
    if !self.protocol.can_recv() {
      aio.finish(Err(NngError::NotSupported("recv")));
      return;
    }
    let timeout = self.options.read().recv_timeout;
    let mut st = self.state.lock();
    if st.closed {
      drop(st);
      aio.finish(Err(NngError::Closed));
      return;
    }
    let ready = self.proto.lock().take_ready(ctx, &mut st.recv_queue);
    match ready {
      Ready::Msg(msg) => {
        drop(st);
        self.recv_space.notify_waiters();
        if aio.finish_msg(msg).is_err() {
          tracing::trace!(socket_id = self.id, "Receive already completed, message dropped");
        }
      }
      Ready::Fail(e) => {
        drop(st);
        aio.finish(Err(e));
      }
      Ready::Wait(_) if aio.is_nonblocking() => {
        drop(st);
        aio.finish(Err(NngError::WouldBlock));
      }
      Ready::Wait(cap) => {
        st.recv_waiters.push_back(Waiter {
          ctx,
          aio: aio.clone(),
          route: Route::Any,
        });
        drop(st);
        self.recv_space.notify_waiters();
        self.arm(&aio, Queue::Recv, ctx, timeout, cap);
      }
    }
  }

  /// Hands an incoming message to a receiver or queues it.
  ///
  /// Returns the message back when the shared receive queue is full and the protocol applies
  /// backpressure; the caller retries after `recv_space` is signalled.
  pub fn deliver(&self, mut msg: Msg) -> Option<Msg> {
    let cap = self.options.read().recv_buffer.max(0) as usize;
    let mut st = self.state.lock();
    if st.closed {
      return None;
    }
    let Some(target) = self.proto.lock().classify(&msg) else {
      tracing::trace!(socket_id = self.id, "Incoming message dropped by protocol filter");
      return None;
    };
    loop {
      let waiter = {
        let proto = self.proto.lock();
        st.recv_waiters.iter().position(|w| proto.accepts(target, w.ctx))
      };
      let Some(i) = waiter else {
        return self.enqueue(&mut st, target, msg, cap);
      };
      let waiter = st.recv_waiters.remove(i)?;
      self.proto.lock().claim(waiter.ctx, &msg);
      drop(st);
      match waiter.aio.finish_msg(msg) {
        Ok(()) => return None,
        Err(back) => msg = back,
      }
      st = self.state.lock();
      if st.closed {
        return None;
      }
    }
  }

  fn enqueue(&self, st: &mut MutexGuard<'_, CoreState>, target: Target, msg: Msg, cap: usize) -> Option<Msg> {
    match target {
      Target::Ctx(ctx) => {
        if !self.proto.lock().stash(ctx, msg, cap) {
          tracing::trace!(socket_id = self.id, ctx_id = ctx, "Reply dropped");
        }
        None
      }
      Target::Shared if st.recv_queue.len() < cap => {
        st.recv_queue.push_back(msg);
        None
      }
      Target::Shared if matches!(self.protocol, Protocol::Sub0 | Protocol::Bus0) => {
        tracing::trace!(socket_id = self.id, "Receive queue full, message dropped");
        None
      }
      Target::Shared => Some(msg),
    }
  }
}
