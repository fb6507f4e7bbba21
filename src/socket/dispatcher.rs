// src/socket/dispatcher.rs

//! Entry point the engine calls on pipe lifecycle transitions.

use super::registry::REGISTRY;
use crate::engine::{PipeEvent, RawPipe};

/// Registered with the engine once per socket and event; `token` identifies the socket.
///
/// Runs on an engine I/O thread, or on the thread closing the socket. A socket that is
/// already gone is ignored.
pub(crate) fn on_pipe_event(pipe: RawPipe, event: PipeEvent, token: u64) {
  let Some(socket) = REGISTRY.lookup(token) else {
    tracing::trace!(pipe_id = pipe.id(), ?event, "Pipe event for a socket that is gone");
    return;
  };
  socket.handle_pipe_event(pipe, event);
}
