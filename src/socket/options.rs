// src/socket/options.rs

use std::time::Duration;

use crate::aio::AsyncBackend;
use crate::error::{NngError, NngResult};
use crate::socket::types::DialMode;
use crate::transport::SockAddr;

// --- Option names ---
// Socket options
pub const SOCKET_NAME: &str = "socket-name";
pub const RAW: &str = "raw";
pub const PROTOCOL: &str = "protocol";
pub const PROTOCOL_NAME: &str = "protocol-name";
pub const PEER: &str = "peer";
pub const PEER_NAME: &str = "peer-name";
pub const RECV_BUFFER: &str = "recv-buffer";
pub const SEND_BUFFER: &str = "send-buffer";
pub const RECV_TIMEOUT: &str = "recv-timeout";
pub const SEND_TIMEOUT: &str = "send-timeout";
pub const TTL_MAX: &str = "ttl-max";
pub const RECV_SIZE_MAX: &str = "recv-size-max";
pub const RECONNECT_TIME_MIN: &str = "reconnect-time-min";
pub const RECONNECT_TIME_MAX: &str = "reconnect-time-max";
// Transport options (socket defaults, dialer/listener overrides, pipe read-back)
pub const TCP_NODELAY: &str = "tcp-nodelay";
pub const TCP_KEEPALIVE: &str = "tcp-keepalive";
pub const URL: &str = "url";
pub const LOCAL_ADDRESS: &str = "local-address";
pub const REMOTE_ADDRESS: &str = "remote-address";
// Protocol-specific
pub const PAIR1_POLYAMOROUS: &str = "pair1:polyamorous";
pub const SUB_SUBSCRIBE: &str = "sub:subscribe";
pub const SUB_UNSUBSCRIBE: &str = "sub:unsubscribe";
pub const SURVEYOR_SURVEY_TIME: &str = "surveyor:survey-time";

/// The value type an option stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
  Int,
  /// Milliseconds; absent means infinite.
  Ms,
  Size,
  Bool,
  Str,
  Addr,
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
  Int(i32),
  /// `None` is an infinite duration.
  Ms(Option<Duration>),
  Size(usize),
  Bool(bool),
  Str(String),
  Addr(SockAddr),
}

fn bad_type(expected: OptionKind, got: OptionKind) -> NngError {
  NngError::BadType(format!("expected {:?} option value, got {:?}", expected, got))
}

impl OptionValue {
  pub fn kind(&self) -> OptionKind {
    match self {
      OptionValue::Int(_) => OptionKind::Int,
      OptionValue::Ms(_) => OptionKind::Ms,
      OptionValue::Size(_) => OptionKind::Size,
      OptionValue::Bool(_) => OptionKind::Bool,
      OptionValue::Str(_) => OptionKind::Str,
      OptionValue::Addr(_) => OptionKind::Addr,
    }
  }

  pub fn into_int(self) -> NngResult<i32> {
    match self {
      OptionValue::Int(v) => Ok(v),
      other => Err(bad_type(OptionKind::Int, other.kind())),
    }
  }

  pub fn into_ms(self) -> NngResult<Option<Duration>> {
    match self {
      OptionValue::Ms(v) => Ok(v),
      other => Err(bad_type(OptionKind::Ms, other.kind())),
    }
  }

  pub fn into_size(self) -> NngResult<usize> {
    match self {
      OptionValue::Size(v) => Ok(v),
      other => Err(bad_type(OptionKind::Size, other.kind())),
    }
  }

  pub fn into_bool(self) -> NngResult<bool> {
    match self {
      OptionValue::Bool(v) => Ok(v),
      other => Err(bad_type(OptionKind::Bool, other.kind())),
    }
  }

  pub fn into_string(self) -> NngResult<String> {
    match self {
      OptionValue::Str(v) => Ok(v),
      other => Err(bad_type(OptionKind::Str, other.kind())),
    }
  }

  pub fn into_addr(self) -> NngResult<SockAddr> {
    match self {
      OptionValue::Addr(v) => Ok(v),
      other => Err(bad_type(OptionKind::Addr, other.kind())),
    }
  }
}

impl From<i32> for OptionValue {
  fn from(v: i32) -> Self {
    OptionValue::Int(v)
  }
}

impl From<Duration> for OptionValue {
  fn from(v: Duration) -> Self {
    OptionValue::Ms(Some(v))
  }
}

impl From<Option<Duration>> for OptionValue {
  fn from(v: Option<Duration>) -> Self {
    OptionValue::Ms(v)
  }
}

impl From<usize> for OptionValue {
  fn from(v: usize) -> Self {
    OptionValue::Size(v)
  }
}

impl From<bool> for OptionValue {
  fn from(v: bool) -> Self {
    OptionValue::Bool(v)
  }
}

impl From<&str> for OptionValue {
  fn from(v: &str) -> Self {
    OptionValue::Str(v.to_string())
  }
}

impl From<String> for OptionValue {
  fn from(v: String) -> Self {
    OptionValue::Str(v)
  }
}

impl From<SockAddr> for OptionValue {
  fn from(v: SockAddr) -> Self {
    OptionValue::Addr(v)
  }
}

/// Construction-time settings for [`Socket::open`](crate::Socket::open).
///
/// Options are applied before any listen or dial, so a polyamorous pair1 socket or a short
/// receive timeout is in force for the very first connection.
#[derive(Debug, Clone, Default)]
pub struct SocketConfig {
  /// Addresses to dial once the socket is set up, using `dial_mode`.
  pub dial: Vec<String>,
  /// Addresses to listen on once the socket is set up.
  pub listen: Vec<String>,
  pub dial_mode: DialMode,
  pub recv_timeout: Option<Duration>,
  pub send_timeout: Option<Duration>,
  pub recv_buffer_size: Option<i32>,
  pub send_buffer_size: Option<i32>,
  pub recv_max_size: Option<usize>,
  pub reconnect_time_min: Option<Duration>,
  pub reconnect_time_max: Option<Duration>,
  pub name: Option<String>,
  pub polyamorous: Option<bool>,
  /// Async adapter for `async_*` calls. Detected from the calling context when absent.
  pub async_backend: Option<AsyncBackend>,
}

impl SocketConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_dial(mut self, address: impl Into<String>) -> Self {
    self.dial.push(address.into());
    self
  }

  pub fn with_listen(mut self, address: impl Into<String>) -> Self {
    self.listen.push(address.into());
    self
  }

  pub fn with_dial_mode(mut self, mode: DialMode) -> Self {
    self.dial_mode = mode;
    self
  }

  pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
    self.recv_timeout = Some(timeout);
    self
  }

  pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
    self.send_timeout = Some(timeout);
    self
  }

  pub fn with_recv_buffer_size(mut self, depth: i32) -> Self {
    self.recv_buffer_size = Some(depth);
    self
  }

  pub fn with_send_buffer_size(mut self, depth: i32) -> Self {
    self.send_buffer_size = Some(depth);
    self
  }

  pub fn with_recv_max_size(mut self, bytes: usize) -> Self {
    self.recv_max_size = Some(bytes);
    self
  }

  pub fn with_reconnect_time(mut self, min: Duration, max: Duration) -> Self {
    self.reconnect_time_min = Some(min);
    self.reconnect_time_max = Some(max);
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_polyamorous(mut self, enabled: bool) -> Self {
    self.polyamorous = Some(enabled);
    self
  }

  pub fn with_async_backend(mut self, backend: AsyncBackend) -> Self {
    self.async_backend = Some(backend);
    self
  }

  /// The option writes this config implies, in application order.
  pub(crate) fn initial_options(&self) -> Vec<(&'static str, OptionValue)> {
    let mut opts = Vec::new();
    if let Some(v) = self.recv_timeout {
      opts.push((RECV_TIMEOUT, OptionValue::from(v)));
    }
    if let Some(v) = self.send_timeout {
      opts.push((SEND_TIMEOUT, OptionValue::from(v)));
    }
    if let Some(v) = self.recv_buffer_size {
      opts.push((RECV_BUFFER, OptionValue::Int(v)));
    }
    if let Some(v) = self.send_buffer_size {
      opts.push((SEND_BUFFER, OptionValue::Int(v)));
    }
    if let Some(v) = self.recv_max_size {
      opts.push((RECV_SIZE_MAX, OptionValue::Size(v)));
    }
    if let Some(v) = self.reconnect_time_min {
      opts.push((RECONNECT_TIME_MIN, OptionValue::from(v)));
    }
    if let Some(v) = self.reconnect_time_max {
      opts.push((RECONNECT_TIME_MAX, OptionValue::from(v)));
    }
    if let Some(v) = &self.name {
      opts.push((SOCKET_NAME, OptionValue::Str(v.clone())));
    }
    if let Some(v) = self.polyamorous {
      opts.push((PAIR1_POLYAMOROUS, OptionValue::Bool(v)));
    }
    opts
  }
}
