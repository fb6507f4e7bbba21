// src/transport/inproc.rs

//! In-process transport: listeners register a name, dialers receive one half of an in-memory
//! duplex stream through the listener's accept queue.

use std::collections::HashMap;

use async_channel::{Receiver as AsyncReceiver, Sender as AsyncSender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::io::DuplexStream;

use crate::error::{NngError, NngResult};
use crate::transport::{Connection, SockAddr};

const DUPLEX_BUFFER: usize = 64 * 1024;

static INPROC_BINDINGS: Lazy<Mutex<HashMap<String, AsyncSender<DuplexStream>>>> =
  Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) struct InprocAcceptor {
  name: String,
  queue: AsyncReceiver<DuplexStream>,
}

pub(crate) fn bind(name: &str, url: &str) -> NngResult<InprocAcceptor> {
  let mut bindings = INPROC_BINDINGS.lock();
  if bindings.contains_key(name) {
    return Err(NngError::AddrInUse(url.to_string()));
  }
  let (tx, rx) = async_channel::unbounded();
  bindings.insert(name.to_string(), tx);
  tracing::info!(name = %name, "Inproc listener bound");
  Ok(InprocAcceptor {
    name: name.to_string(),
    queue: rx,
  })
}

impl InprocAcceptor {
  pub fn local_addr(&self) -> SockAddr {
    SockAddr::Inproc(self.name.clone())
  }

  pub async fn accept(&mut self) -> NngResult<Connection> {
    let stream = self.queue.recv().await.map_err(|_| NngError::Closed)?;
    Ok(Connection {
      stream: Box::new(stream),
      local: SockAddr::Inproc(self.name.clone()),
      remote: SockAddr::Inproc(self.name.clone()),
    })
  }
}

impl Drop for InprocAcceptor {
  fn drop(&mut self) {
    INPROC_BINDINGS.lock().remove(&self.name);
    tracing::debug!(name = %self.name, "Inproc name unregistered");
  }
}

pub(crate) async fn connect(name: &str, url: &str) -> NngResult<Connection> {
  let binder = INPROC_BINDINGS.lock().get(name).cloned();
  let Some(binder) = binder else {
    tracing::debug!(name = %name, "Inproc lookup failed: name not bound");
    return Err(NngError::ConnectionRefused(url.to_string()));
  };
  let (ours, theirs) = tokio::io::duplex(DUPLEX_BUFFER);
  binder
    .send(theirs)
    .await
    .map_err(|_| NngError::ConnectionRefused(url.to_string()))?;
  Ok(Connection {
    stream: Box::new(ours),
    local: SockAddr::Inproc(name.to_string()),
    remote: SockAddr::Inproc(name.to_string()),
  })
}
