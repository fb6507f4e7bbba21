// src/error.rs

use std::io;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NngError {
  // --- Open / Lifecycle ---
  #[error("Failed to open {protocol} socket: {reason}")]
  ProtocolOpen { protocol: &'static str, reason: String },
  #[error("Object closed")]
  Closed, // ECLOSED
  #[error("Operation canceled")]
  Canceled, // ECANCELED
  #[error("Entry not found: {0}")]
  NotFound(String), // ENOENT

  // --- Dial / Listen ---
  #[error("Address in use: {0}")]
  AddrInUse(String), // EADDRINUSE
  #[error("Address invalid: {0}")]
  AddressInvalid(String), // EADDRINVAL
  #[error("Connection refused: {0}")]
  ConnectionRefused(String), // ECONNREFUSED
  #[error("Connection reset by peer")]
  ConnectionReset, // ECONNRESET
  #[error("Connection shutdown")]
  ConnectionShutdown, // ECONNSHUT
  #[error("Destination unreachable: {0}")]
  Unreachable(String), // EUNREACHABLE
  #[error("Transport scheme not supported or enabled: {0}")]
  UnsupportedTransport(String),
  #[error("Protocol error: {0}")]
  Protocol(String), // EPROTO

  // --- Data Path ---
  #[error("Timed out")]
  Timeout, // ETIMEDOUT
  #[error("Try again")]
  WouldBlock, // EAGAIN
  #[error("Not supported: {0}")]
  NotSupported(&'static str), // ENOTSUP
  #[error("Incorrect state: {0}")]
  InvalidState(&'static str), // ESTATE
  #[error("{0}")]
  MessageState(&'static str),
  #[error("Message too large: {size} bytes (max {max})")]
  MessageTooLarge { size: usize, max: usize }, // EMSGSIZE

  // --- Options ---
  #[error("Invalid option: {0}")]
  InvalidOption(String),
  #[error("Incorrect type: {0}")]
  BadType(String), // EBADTYPE
  #[error("Option is read-only: {0}")]
  ReadOnly(String), // EREADONLY
  #[error("Option is write-only: {0}")]
  WriteOnly(String), // EWRITEONLY
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String), // EINVAL

  // --- Fallbacks ---
  #[error("I/O error ({kind:?}): {message}")]
  Io { kind: io::ErrorKind, message: String },
  #[error("Native error code {0}")]
  Native(i32),
  #[error("Internal library error: {0}")]
  Internal(String),
}

pub type NngResult<T> = Result<T, NngError>;

impl From<io::Error> for NngError {
  fn from(e: io::Error) -> Self {
    NngError::Io {
      kind: e.kind(),
      message: e.to_string(),
    }
  }
}

// nng's numeric error codes.
const EINTR: i32 = 1;
const ENOMEM: i32 = 2;
const EINVAL: i32 = 3;
const ETIMEDOUT: i32 = 5;
const ECONNREFUSED: i32 = 6;
const ECLOSED: i32 = 7;
const EAGAIN: i32 = 8;
const ENOTSUP: i32 = 9;
const EADDRINUSE: i32 = 10;
const ESTATE: i32 = 11;
const ENOENT: i32 = 12;
const EPROTO: i32 = 13;
const EUNREACHABLE: i32 = 14;
const EADDRINVAL: i32 = 15;
const EMSGSIZE: i32 = 17;
const ECONNRESET: i32 = 19;
const ECANCELED: i32 = 20;
const EREADONLY: i32 = 24;
const EWRITEONLY: i32 = 25;
const EBADTYPE: i32 = 30;
const ECONNSHUT: i32 = 31;
const EINTERNAL: i32 = 1000;

impl NngError {
  /// Maps an I/O error raised while working on `endpoint` to the matching endpoint error.
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::AddrInUse => NngError::AddrInUse(endpoint.to_string()),
      io::ErrorKind::AddrNotAvailable | io::ErrorKind::InvalidInput => {
        NngError::AddressInvalid(endpoint.to_string())
      }
      io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => {
        NngError::ConnectionRefused(endpoint.to_string())
      }
      io::ErrorKind::TimedOut => NngError::Timeout,
      io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => NngError::ConnectionReset,
      io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted => NngError::ConnectionShutdown,
      _ => NngError::from(e),
    }
  }

  /// True for the failures a `listen` reports when the address cannot be bound.
  pub fn is_bind_error(&self) -> bool {
    matches!(self, NngError::AddrInUse(_) | NngError::AddressInvalid(_))
  }

  /// The nng numeric code for this error.
  pub fn code(&self) -> i32 {
    match self {
      NngError::ProtocolOpen { .. } => ENOTSUP,
      NngError::Closed => ECLOSED,
      NngError::Canceled => ECANCELED,
      NngError::NotFound(_) => ENOENT,
      NngError::AddrInUse(_) => EADDRINUSE,
      NngError::AddressInvalid(_) => EADDRINVAL,
      NngError::ConnectionRefused(_) => ECONNREFUSED,
      NngError::ConnectionReset => ECONNRESET,
      NngError::ConnectionShutdown => ECONNSHUT,
      NngError::Unreachable(_) => EUNREACHABLE,
      NngError::UnsupportedTransport(_) => ENOTSUP,
      NngError::Protocol(_) => EPROTO,
      NngError::Timeout => ETIMEDOUT,
      NngError::WouldBlock => EAGAIN,
      NngError::NotSupported(_) => ENOTSUP,
      NngError::InvalidState(_) => ESTATE,
      NngError::MessageState(_) => ESTATE,
      NngError::MessageTooLarge { .. } => EMSGSIZE,
      NngError::InvalidOption(_) => ENOTSUP,
      NngError::BadType(_) => EBADTYPE,
      NngError::ReadOnly(_) => EREADONLY,
      NngError::WriteOnly(_) => EWRITEONLY,
      NngError::InvalidArgument(_) => EINVAL,
      NngError::Io { .. } => EINTERNAL,
      NngError::Native(code) => *code,
      NngError::Internal(_) => EINTERNAL,
    }
  }

  /// Builds an error from an nng numeric code. Codes without a dedicated variant become `Native`.
  pub fn from_code(code: i32) -> Self {
    match code {
      ETIMEDOUT => NngError::Timeout,
      ECONNREFUSED => NngError::ConnectionRefused(String::new()),
      ECLOSED => NngError::Closed,
      EAGAIN => NngError::WouldBlock,
      ENOTSUP => NngError::NotSupported("operation"),
      EADDRINUSE => NngError::AddrInUse(String::new()),
      ESTATE => NngError::InvalidState("incorrect state"),
      ENOENT => NngError::NotFound(String::new()),
      EPROTO => NngError::Protocol(String::new()),
      EUNREACHABLE => NngError::Unreachable(String::new()),
      EADDRINVAL => NngError::AddressInvalid(String::new()),
      EMSGSIZE => NngError::MessageTooLarge { size: 0, max: 0 },
      ECONNRESET => NngError::ConnectionReset,
      ECANCELED => NngError::Canceled,
      EREADONLY => NngError::ReadOnly(String::new()),
      EWRITEONLY => NngError::WriteOnly(String::new()),
      EBADTYPE => NngError::BadType(String::new()),
      ECONNSHUT => NngError::ConnectionShutdown,
      EINVAL => NngError::InvalidArgument(String::new()),
      EINTR | ENOMEM => NngError::Native(code),
      other => NngError::Native(other),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_errors_map_to_endpoint_errors() {
    let e = io::Error::new(io::ErrorKind::AddrInUse, "busy");
    let mapped = NngError::from_io_endpoint(e, "tcp://127.0.0.1:1");
    assert_eq!(mapped, NngError::AddrInUse("tcp://127.0.0.1:1".into()));
    assert!(mapped.is_bind_error());

    let e = io::Error::new(io::ErrorKind::ConnectionRefused, "nope");
    let mapped = NngError::from_io_endpoint(e, "tcp://127.0.0.1:1");
    assert!(matches!(mapped, NngError::ConnectionRefused(_)));
    assert!(!mapped.is_bind_error());
  }

  #[test]
  fn codes_round_trip_for_common_errors() {
    for err in [
      NngError::Timeout,
      NngError::WouldBlock,
      NngError::Closed,
      NngError::Canceled,
      NngError::ConnectionReset,
    ] {
      assert_eq!(NngError::from_code(err.code()), err);
    }
    assert_eq!(NngError::from_code(4242), NngError::Native(4242));
    assert_eq!(NngError::Native(4242).code(), 4242);
  }
}
