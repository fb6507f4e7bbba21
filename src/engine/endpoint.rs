// src/engine/endpoint.rs

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::core::SocketCore;
use super::pipe::{self, PipeCore};
use super::{RawDialer, RawListener, ENGINE};
use crate::error::{NngError, NngResult};
use crate::message::OpFlags;
use crate::runtime::{self, Aio, AioRef};
use crate::transport::{self, Acceptor, Endpoint, SockAddr, TransportConfig};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointKind {
  Dialer,
  Listener,
}

/// Settings an endpoint copies from its socket when created and may override afterwards.
#[derive(Debug, Clone)]
pub(crate) struct EndpointOptions {
  pub reconnect_min: Duration,
  pub reconnect_max: Duration,
  pub recv_max_size: usize,
  pub tcp_nodelay: bool,
  pub tcp_keepalive: bool,
}

impl EndpointOptions {
  fn transport(&self) -> TransportConfig {
    TransportConfig {
      tcp_nodelay: self.tcp_nodelay,
      tcp_keepalive: self.tcp_keepalive,
    }
  }

  /// Next reconnect delay: starts at the minimum and doubles up to the maximum. A maximum not
  /// above the minimum keeps the delay fixed.
  fn next_backoff(&self, previous: Option<Duration>) -> Duration {
    match previous {
      None => self.reconnect_min,
      Some(d) if self.reconnect_max > self.reconnect_min => (d * 2).min(self.reconnect_max),
      Some(_) => self.reconnect_min,
    }
  }
}

/// A dialer or listener.
pub(crate) struct EndpointCore {
  pub id: u32,
  pub kind: EndpointKind,
  pub socket_id: u32,
  socket: Weak<SocketCore>,
  pub url: String,
  endpoint: Endpoint,
  pub(crate) options: RwLock<EndpointOptions>,
  pub(crate) local: Mutex<Option<SockAddr>>,
  pipes: Mutex<BTreeSet<u32>>,
  cancel: CancellationToken,
}

impl EndpointCore {
  fn new(id: u32, kind: EndpointKind, socket: &Arc<SocketCore>, url: &str, endpoint: Endpoint) -> Self {
    Self {
      id,
      kind,
      socket_id: socket.id,
      socket: Arc::downgrade(socket),
      url: url.to_string(),
      endpoint,
      options: RwLock::new(socket.endpoint_defaults()),
      local: Mutex::new(None),
      pipes: Mutex::new(BTreeSet::new()),
      cancel: CancellationToken::new(),
    }
  }

  /// Token for a pipe created by this endpoint; closing the endpoint cancels it.
  pub fn child_token(&self) -> CancellationToken {
    self.cancel.child_token()
  }

  pub fn adopt_pipe(&self, pipe: &Arc<PipeCore>) {
    self.pipes.lock().insert(pipe.id);
  }

  pub fn forget_pipe(&self, pipe_id: u32) {
    self.pipes.lock().remove(&pipe_id);
  }

  /// Stops connecting or accepting and closes the pipes this endpoint created.
  pub fn close(&self) {
    if self.cancel.is_cancelled() {
      return;
    }
    self.cancel.cancel();
    if let Some(socket) = self.socket.upgrade() {
      socket.remove_endpoint(self.kind, self.id);
    }
    tracing::debug!(
      socket_id = self.socket_id,
      endpoint_id = self.id,
      kind = ?self.kind,
      url = %self.url,
      pipes = self.pipes.lock().len(),
      "Endpoint closed"
    );
  }
}

fn register(kind: EndpointKind, socket: &Arc<SocketCore>, url: &str, endpoint: Endpoint) -> NngResult<Arc<EndpointCore>> {
  let table = match kind {
    EndpointKind::Dialer => &ENGINE.dialers,
    EndpointKind::Listener => &ENGINE.listeners,
  };
  let ep = {
    let mut eps = table.lock();
    let id = eps.alloc(|id| Arc::new(EndpointCore::new(id, kind, socket, url, endpoint)));
    eps.get(id).cloned().ok_or_else(|| NngError::Internal("endpoint vanished during setup".into()))?
  };
  if let Err(e) = socket.add_endpoint(kind, ep.id) {
    table.lock().remove(ep.id);
    return Err(e);
  }
  Ok(ep)
}

fn unregister(ep: &Arc<EndpointCore>) {
  let table = match ep.kind {
    EndpointKind::Dialer => &ENGINE.dialers,
    EndpointKind::Listener => &ENGINE.listeners,
  };
  table.lock().remove(ep.id);
  ep.close();
}

/// Starts a dialer.
///
/// Without `NONBLOCK` the first connection attempt runs to completion (handshake included)
/// before returning and its failure is returned. Either way the dialer then keeps the
/// connection up in the background, redialing with backoff after failures or disconnects.
pub(crate) fn dial(socket: &Arc<SocketCore>, url: &str, flags: OpFlags) -> NngResult<RawDialer> {
  let endpoint = Endpoint::parse(url)?;
  let handle = runtime::handle()?;
  let ep = register(EndpointKind::Dialer, socket, url, endpoint)?;
  let raw = RawDialer(ep.id);

  if flags.contains(OpFlags::NONBLOCK) {
    tracing::debug!(socket_id = socket.id, dialer_id = ep.id, %url, "Dialing in background");
    handle.spawn(run_dialer(ep, None));
    return Ok(raw);
  }

  let first = Aio::new(None);
  let waiter = first.handle();
  waiter.begin();
  handle.spawn(run_dialer(ep.clone(), Some(waiter)));
  first.wait();
  if let Err(e) = first.result() {
    tracing::debug!(socket_id = socket.id, %url, error = %e, "Synchronous dial failed");
    unregister(&ep);
    return Err(e);
  }
  tracing::debug!(socket_id = socket.id, dialer_id = ep.id, %url, "Dialed");
  Ok(raw)
}

async fn run_dialer(ep: Arc<EndpointCore>, mut first: Option<AioRef>) {
  let mut backoff: Option<Duration> = None;
  loop {
    match connect_once(&ep).await {
      Ok(Some(pipe)) => {
        if let Some(aio) = first.take() {
          aio.finish(Ok(()));
        }
        backoff = None;
        tokio::select! {
          _ = ep.cancel.cancelled() => break,
          _ = pipe.cancel.cancelled() => {}
        }
        tracing::debug!(dialer_id = ep.id, pipe_id = pipe.id, "Dialer lost its pipe, redialing");
      }
      Ok(None) => break,
      Err(e) => {
        if let Some(aio) = first.take() {
          aio.finish(Err(e));
          return;
        }
        tracing::debug!(dialer_id = ep.id, url = %ep.url, error = %e, "Dial attempt failed");
      }
    }
    let delay = ep.options.read().next_backoff(backoff);
    backoff = Some(delay);
    tokio::select! {
      _ = ep.cancel.cancelled() => break,
      _ = tokio::time::sleep(delay) => {}
    }
  }
  if let Some(aio) = first.take() {
    aio.finish(Err(NngError::Closed));
  }
}

/// One connection attempt. `Ok(None)` means the dialer was closed while connecting.
async fn connect_once(ep: &Arc<EndpointCore>) -> NngResult<Option<Arc<PipeCore>>> {
  let socket = ep.socket.upgrade().ok_or(NngError::Closed)?;
  let cfg = ep.options.read().transport();
  let conn = tokio::select! {
    _ = ep.cancel.cancelled() => return Ok(None),
    conn = transport::connect(&ep.endpoint, &ep.url, cfg) => conn?,
  };
  pipe::establish(&socket, ep, conn).await.map(Some)
}

/// Binds and starts accepting. Bind failures are returned to the caller.
pub(crate) fn listen(socket: &Arc<SocketCore>, url: &str) -> NngResult<RawListener> {
  let endpoint = Endpoint::parse(url)?;
  let handle = runtime::handle()?;
  let cfg = socket.endpoint_defaults().transport();
  let acceptor = {
    let _guard = handle.enter();
    transport::bind(&endpoint, url, cfg)?
  };
  let local = acceptor.local_addr();
  let ep = register(EndpointKind::Listener, socket, url, endpoint)?;
  *ep.local.lock() = Some(local.clone());
  tracing::info!(socket_id = socket.id, listener_id = ep.id, %url, %local, "Listening");
  handle.spawn(run_listener(ep.clone(), acceptor));
  Ok(RawListener(ep.id))
}

async fn run_listener(ep: Arc<EndpointCore>, mut acceptor: Acceptor) {
  loop {
    let accepted = tokio::select! {
      _ = ep.cancel.cancelled() => break,
      accepted = acceptor.accept() => accepted,
    };
    match accepted {
      Ok(conn) => {
        let Some(socket) = ep.socket.upgrade() else { break };
        let ep = ep.clone();
        tokio::spawn(async move {
          if let Err(e) = pipe::establish(&socket, &ep, conn).await {
            tracing::debug!(listener_id = ep.id, error = %e, "Inbound connection not attached");
          }
        });
      }
      Err(NngError::Closed) => break,
      Err(e) => {
        tracing::warn!(listener_id = ep.id, url = %ep.url, error = %e, "Accept failed");
        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
      }
    }
  }
  tracing::debug!(listener_id = ep.id, "Listener stopped accepting");
}
