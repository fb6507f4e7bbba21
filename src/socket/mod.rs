// src/socket/mod.rs

//! The public object layer: sockets and the dialers, listeners and pipes they own.

mod core;
mod dispatcher;
mod endpoint;
pub mod events;
pub mod options;
mod pipe;
mod registry;
pub mod types;

pub use self::core::Socket;
pub use endpoint::{Dialer, Listener};
pub use events::{HookResult, PipeCallback, PipeEvent};
pub use options::{OptionKind, OptionValue, SocketConfig};
pub use pipe::Pipe;
pub use types::{DialMode, Protocol};
