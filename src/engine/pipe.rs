// src/engine/pipe.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::core::SocketCore;
use super::endpoint::{EndpointCore, EndpointKind};
use super::{PipeEvent, RawPipe, ENGINE};
use crate::error::{NngError, NngResult};
use crate::message::Msg;
use crate::protocol::sp::handshake;
use crate::protocol::sp::SpCodec;
use crate::socket::Protocol;
use crate::transport::{Conn, Connection, SockAddr};

type SpSink = SplitSink<Framed<Conn, SpCodec>, Msg>;
type SpStream = SplitStream<Framed<Conn, SpCodec>>;

/// One negotiated connection.
pub(crate) struct PipeCore {
  pub id: u32,
  pub socket_id: u32,
  pub dialer: Option<u32>,
  pub listener: Option<u32>,
  endpoint: Weak<EndpointCore>,
  pub url: String,
  pub local: SockAddr,
  pub remote: SockAddr,
  pub protocol: Protocol,
  pub peer: Protocol,
  pub tcp_nodelay: bool,
  pub tcp_keepalive: bool,
  pub recv_max_size: usize,
  closed: AtomicBool,
  removed: AtomicBool,
  pub(crate) cancel: CancellationToken,
}

impl PipeCore {
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled()
  }

  /// Flags the pipe closed and stops its I/O tasks. Detaching follows on the I/O task.
  pub fn close(&self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      tracing::debug!(socket_id = self.socket_id, pipe_id = self.id, "Pipe close requested");
    }
    self.cancel.cancel();
  }

  /// Removes the pipe from its socket and endpoint and releases its id. Runs once; the
  /// post-remove notification fires before the id can be reused.
  pub fn detach(self: &Arc<Self>, socket: &SocketCore) {
    if self.removed.swap(true, Ordering::AcqRel) {
      return;
    }
    self.close();
    socket.remove_pipe(self.id);
    socket.fire(RawPipe(self.id), PipeEvent::PostRemove);
    if let Some(ep) = self.endpoint.upgrade() {
      ep.forget_pipe(self.id);
    }
    ENGINE.pipes.lock().remove(self.id);
  }
}

/// Negotiates a fresh connection and attaches it to `socket`.
///
/// The dialing side sends its header first. The listening side answers only after the pipe is
/// part of its socket, so a dialer that completes the exchange knows both ends are attached.
pub(crate) async fn establish(
  socket: &Arc<SocketCore>,
  ep: &Arc<EndpointCore>,
  conn: Connection,
) -> NngResult<Arc<PipeCore>> {
  let Connection {
    mut stream,
    local,
    remote,
  } = conn;
  let protocol = socket.protocol;
  if ep.kind == EndpointKind::Dialer {
    handshake::send_header(&mut stream, protocol).await?;
  }
  let peer = handshake::recv_header(&mut stream, protocol).await?;

  let opts = ep.options.read().clone();
  let pipe = {
    let mut pipes = ENGINE.pipes.lock();
    let id = pipes.alloc(|id| {
      Arc::new(PipeCore {
        id,
        socket_id: socket.id,
        dialer: (ep.kind == EndpointKind::Dialer).then_some(ep.id),
        listener: (ep.kind == EndpointKind::Listener).then_some(ep.id),
        endpoint: Arc::downgrade(ep),
        url: ep.url.clone(),
        local,
        remote,
        protocol,
        peer,
        tcp_nodelay: opts.tcp_nodelay,
        tcp_keepalive: opts.tcp_keepalive,
        recv_max_size: opts.recv_max_size,
        closed: AtomicBool::new(false),
        removed: AtomicBool::new(false),
        cancel: ep.child_token(),
      })
    });
    pipes.get(id).cloned().ok_or_else(|| NngError::Internal("pipe vanished during setup".into()))?
  };
  ep.adopt_pipe(&pipe);
  tracing::debug!(socket_id = socket.id, pipe_id = pipe.id, peer = %peer, "Pipe negotiated");

  socket.fire(RawPipe(pipe.id), PipeEvent::PreAdd);
  if pipe.is_closed() {
    tracing::debug!(pipe_id = pipe.id, "Pipe rejected during pre-add");
    pipe.detach(socket);
    return Err(NngError::Closed);
  }
  let (tx, rx) = mpsc::channel(socket.send_depth());
  if let Err(e) = socket.add_pipe(&pipe, tx) {
    tracing::debug!(pipe_id = pipe.id, error = %e, "Socket refused pipe");
    pipe.detach(socket);
    return Err(e);
  }
  socket.fire(RawPipe(pipe.id), PipeEvent::PostAdd);

  if ep.kind == EndpointKind::Listener {
    if let Err(e) = handshake::send_header(&mut stream, protocol).await {
      pipe.detach(socket);
      return Err(e);
    }
  }

  let framed = Framed::new(stream, SpCodec::new(protocol.header_len(), opts.recv_max_size));
  let (sink, frames) = framed.split();
  tokio::spawn(run_writer(socket.clone(), pipe.clone(), sink, rx));
  tokio::spawn(run_reader(socket.clone(), pipe.clone(), frames));
  socket.flush_send_waiters();
  Ok(pipe)
}

async fn run_writer(socket: Arc<SocketCore>, pipe: Arc<PipeCore>, mut sink: SpSink, mut rx: mpsc::Receiver<Msg>) {
  loop {
    let msg = tokio::select! {
      _ = pipe.cancel.cancelled() => break,
      next = rx.recv() => match next {
        Some(msg) => msg,
        None => break,
      },
    };
    // A slot just freed up in this pipe's queue.
    socket.flush_send_waiters();
    tokio::select! {
      _ = pipe.cancel.cancelled() => break,
      sent = sink.send(msg) => {
        if let Err(e) = sent {
          tracing::debug!(pipe_id = pipe.id, error = %e, "Pipe write failed");
          break;
        }
      }
    }
  }
  pipe.cancel.cancel();
}

async fn run_reader(socket: Arc<SocketCore>, pipe: Arc<PipeCore>, mut frames: SpStream) {
  'read: loop {
    let frame = tokio::select! {
      _ = pipe.cancel.cancelled() => break,
      frame = frames.next() => frame,
    };
    let mut msg = match frame {
      Some(Ok(msg)) => msg,
      Some(Err(e)) => {
        tracing::debug!(pipe_id = pipe.id, error = %e, "Pipe read failed");
        break;
      }
      None => {
        tracing::debug!(pipe_id = pipe.id, "Peer closed the connection");
        break;
      }
    };
    msg.set_pipe(Some(RawPipe(pipe.id)));
    let mut pending = msg;
    loop {
      let space = socket.recv_space.notified();
      tokio::pin!(space);
      space.as_mut().enable();
      match socket.deliver(pending) {
        None => break,
        Some(back) => {
          pending = back;
          tokio::select! {
            _ = pipe.cancel.cancelled() => break 'read,
            _ = space => {}
          }
        }
      }
    }
  }
  pipe.detach(&socket);
}
