//! rnng - scalability-protocol sockets (pair, pub/sub, req/rep, pipeline, bus, survey) in pure
//! Rust.
//!
//! A [`Socket`] speaks one [`Protocol`]. It dials and listens on `inproc://`, `ipc://` and
//! `tcp://` addresses, producing [`Dialer`]s, [`Listener`]s and, as connections come up,
//! [`Pipe`]s. Messages move through the socket (or one of its [`Context`]s) synchronously or
//! through `async_*` methods that work under Tokio or any `futures` executor.
//!
//! ```no_run
//! use rnng::{DialMode, Protocol, Socket};
//!
//! # fn main() -> rnng::NngResult<()> {
//! let rep = Socket::new(Protocol::Rep0)?;
//! rep.listen("inproc://greeter")?;
//! let req = Socket::new(Protocol::Req0)?;
//! req.dial("inproc://greeter", DialMode::Blocking)?;
//!
//! req.send(b"hello")?;
//! let request = rep.recv(true)?;
//! rep.send(&request)?;
//! assert_eq!(&req.recv(true)?[..], b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! Protocol work and connection I/O run on a small pool of engine threads started with the
//! first socket (see [`init`] and [`EngineConfig`]). Pipe hooks registered with
//! [`Socket::add_post_add_callback`] and friends run on those threads.

pub mod aio;
pub mod context;
pub(crate) mod engine;
pub mod error;
pub mod message;
pub(crate) mod protocol;
pub mod runtime;
pub mod socket;
pub mod transport;

pub use aio::AsyncBackend;
pub use context::Context;
pub use error::{NngError, NngResult};
pub use message::Message;
pub use runtime::{init, EngineConfig};
pub use socket::options;
pub use socket::{
  DialMode, Dialer, HookResult, Listener, OptionKind, OptionValue, Pipe, PipeCallback, PipeEvent, Protocol,
  Socket, SocketConfig,
};
pub use transport::SockAddr;

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}
