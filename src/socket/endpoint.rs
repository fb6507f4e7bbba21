// src/socket/endpoint.rs

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use super::core::{Socket, SocketInner};
use super::options::{self as opt, OptionValue};
use crate::engine::{self, RawDialer, RawListener};
use crate::error::{NngError, NngResult};
use crate::transport::SockAddr;

fn tolerate_closed(result: NngResult<()>) -> NngResult<()> {
  match result {
    Ok(()) | Err(NngError::Closed) => Ok(()),
    Err(e) => Err(e),
  }
}

/// Outbound connection manager. Keeps its connection up, redialing with backoff after failures.
#[derive(Clone)]
pub struct Dialer {
  raw: RawDialer,
  socket: Weak<SocketInner>,
}

impl Dialer {
  pub(crate) fn new(raw: RawDialer, socket: Weak<SocketInner>) -> Self {
    Self { raw, socket }
  }

  pub fn id(&self) -> u32 {
    self.raw.id()
  }

  /// Stops dialing, closes the dialer's pipe and removes it from its socket.
  pub fn close(&self) -> NngResult<()> {
    tracing::debug!(dialer_id = self.id(), "Closing dialer");
    let result = tolerate_closed(engine::dialer_close(self.raw));
    if let Some(socket) = self.socket.upgrade() {
      socket.forget_dialer(self.id());
    }
    result
  }

  pub fn socket(&self) -> NngResult<Socket> {
    self.socket.upgrade().map(Socket::from_inner).ok_or(NngError::Closed)
  }

  pub fn get_option(&self, name: &str) -> NngResult<OptionValue> {
    engine::dialer_get(self.raw, name)
  }

  pub fn set_option(&self, name: &str, value: impl Into<OptionValue>) -> NngResult<()> {
    engine::dialer_set(self.raw, name, value.into())
  }

  pub fn url(&self) -> NngResult<String> {
    self.get_option(opt::URL)?.into_string()
  }

  pub fn reconnect_time_min(&self) -> NngResult<Option<Duration>> {
    self.get_option(opt::RECONNECT_TIME_MIN)?.into_ms()
  }

  pub fn set_reconnect_time_min(&self, delay: Duration) -> NngResult<()> {
    self.set_option(opt::RECONNECT_TIME_MIN, delay)
  }

  pub fn reconnect_time_max(&self) -> NngResult<Option<Duration>> {
    self.get_option(opt::RECONNECT_TIME_MAX)?.into_ms()
  }

  pub fn set_reconnect_time_max(&self, delay: Duration) -> NngResult<()> {
    self.set_option(opt::RECONNECT_TIME_MAX, delay)
  }

  pub fn recv_max_size(&self) -> NngResult<usize> {
    self.get_option(opt::RECV_SIZE_MAX)?.into_size()
  }
}

impl fmt::Debug for Dialer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Dialer").field("id", &self.id()).finish()
  }
}

/// Inbound connection manager bound to a local address.
#[derive(Clone)]
pub struct Listener {
  raw: RawListener,
  socket: Weak<SocketInner>,
}

impl Listener {
  pub(crate) fn new(raw: RawListener, socket: Weak<SocketInner>) -> Self {
    Self { raw, socket }
  }

  pub fn id(&self) -> u32 {
    self.raw.id()
  }

  /// Stops accepting, closes accepted pipes and removes the listener from its socket.
  pub fn close(&self) -> NngResult<()> {
    tracing::debug!(listener_id = self.id(), "Closing listener");
    let result = tolerate_closed(engine::listener_close(self.raw));
    if let Some(socket) = self.socket.upgrade() {
      socket.forget_listener(self.id());
    }
    result
  }

  pub fn socket(&self) -> NngResult<Socket> {
    self.socket.upgrade().map(Socket::from_inner).ok_or(NngError::Closed)
  }

  pub fn get_option(&self, name: &str) -> NngResult<OptionValue> {
    engine::listener_get(self.raw, name)
  }

  pub fn set_option(&self, name: &str, value: impl Into<OptionValue>) -> NngResult<()> {
    engine::listener_set(self.raw, name, value.into())
  }

  pub fn url(&self) -> NngResult<String> {
    self.get_option(opt::URL)?.into_string()
  }

  /// The bound address. For `tcp://host:0` this carries the port actually picked.
  pub fn local_address(&self) -> NngResult<SockAddr> {
    self.get_option(opt::LOCAL_ADDRESS)?.into_addr()
  }

  pub fn recv_max_size(&self) -> NngResult<usize> {
    self.get_option(opt::RECV_SIZE_MAX)?.into_size()
  }
}

impl fmt::Debug for Listener {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Listener").field("id", &self.id()).finish()
  }
}
