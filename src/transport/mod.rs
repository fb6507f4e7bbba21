// src/transport/mod.rs

//! Byte-stream transports: address parsing, connect and bind/accept.

#[cfg(feature = "inproc")]
pub(crate) mod inproc;
#[cfg(all(unix, feature = "ipc"))]
pub(crate) mod ipc;
pub(crate) mod tcp;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{NngError, NngResult};

/// Address of one end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SockAddr {
  Inproc(String),
  Ipc(PathBuf),
  Tcp(SocketAddr),
  Unspecified,
}

impl fmt::Display for SockAddr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SockAddr::Inproc(name) => write!(f, "inproc://{}", name),
      SockAddr::Ipc(path) => write!(f, "ipc://{}", path.display()),
      SockAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
      SockAddr::Unspecified => Ok(()),
    }
  }
}

/// A parsed dial/listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Endpoint {
  Tcp { host: String, port: u16 },
  Ipc(PathBuf),
  Inproc(String),
}

impl Endpoint {
  pub fn parse(url: &str) -> NngResult<Self> {
    let (scheme, rest) = url
      .split_once("://")
      .ok_or_else(|| NngError::AddressInvalid(url.to_string()))?;
    match scheme {
      "tcp" | "tcp4" | "tcp6" => {
        let (host, port) = rest
          .rsplit_once(':')
          .ok_or_else(|| NngError::AddressInvalid(url.to_string()))?;
        let port = port
          .parse::<u16>()
          .map_err(|_| NngError::AddressInvalid(url.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let host = match host {
          "" | "*" => "0.0.0.0".to_string(),
          h => h.to_string(),
        };
        Ok(Endpoint::Tcp { host, port })
      }
      "ipc" if !rest.is_empty() => Ok(Endpoint::Ipc(PathBuf::from(rest))),
      "inproc" if !rest.is_empty() => Ok(Endpoint::Inproc(rest.to_string())),
      "ipc" | "inproc" => Err(NngError::AddressInvalid(url.to_string())),
      _ => Err(NngError::UnsupportedTransport(url.to_string())),
    }
  }
}

pub(crate) trait AsyncConn: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T> AsyncConn for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub(crate) type Conn = Box<dyn AsyncConn>;

/// An established byte stream with both addresses.
pub(crate) struct Connection {
  pub stream: Conn,
  pub local: SockAddr,
  pub remote: SockAddr,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TransportConfig {
  pub tcp_nodelay: bool,
  pub tcp_keepalive: bool,
}

pub(crate) async fn connect(endpoint: &Endpoint, url: &str, cfg: TransportConfig) -> NngResult<Connection> {
  match endpoint {
    Endpoint::Tcp { host, port } => tcp::connect(host, *port, url, cfg).await,
    #[cfg(all(unix, feature = "ipc"))]
    Endpoint::Ipc(path) => ipc::connect(path, url).await,
    #[cfg(feature = "inproc")]
    Endpoint::Inproc(name) => inproc::connect(name, url).await,
    #[allow(unreachable_patterns)]
    _ => Err(NngError::UnsupportedTransport(url.to_string())),
  }
}

/// Binds a listening endpoint. Must run inside the engine runtime context.
pub(crate) fn bind(endpoint: &Endpoint, url: &str, cfg: TransportConfig) -> NngResult<Acceptor> {
  match endpoint {
    Endpoint::Tcp { host, port } => tcp::bind(host, *port, url, cfg).map(Acceptor::Tcp),
    #[cfg(all(unix, feature = "ipc"))]
    Endpoint::Ipc(path) => ipc::bind(path, url).map(Acceptor::Ipc),
    #[cfg(feature = "inproc")]
    Endpoint::Inproc(name) => inproc::bind(name, url).map(Acceptor::Inproc),
    #[allow(unreachable_patterns)]
    _ => Err(NngError::UnsupportedTransport(url.to_string())),
  }
}

/// A bound listening endpoint.
pub(crate) enum Acceptor {
  Tcp(tcp::TcpAcceptor),
  #[cfg(all(unix, feature = "ipc"))]
  Ipc(ipc::IpcAcceptor),
  #[cfg(feature = "inproc")]
  Inproc(inproc::InprocAcceptor),
}

impl Acceptor {
  pub fn local_addr(&self) -> SockAddr {
    match self {
      Acceptor::Tcp(a) => a.local_addr(),
      #[cfg(all(unix, feature = "ipc"))]
      Acceptor::Ipc(a) => a.local_addr(),
      #[cfg(feature = "inproc")]
      Acceptor::Inproc(a) => a.local_addr(),
    }
  }

  pub async fn accept(&mut self) -> NngResult<Connection> {
    match self {
      Acceptor::Tcp(a) => a.accept().await,
      #[cfg(all(unix, feature = "ipc"))]
      Acceptor::Ipc(a) => a.accept().await,
      #[cfg(feature = "inproc")]
      Acceptor::Inproc(a) => a.accept().await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_supported_schemes() {
    assert_eq!(
      Endpoint::parse("tcp://127.0.0.1:5555"),
      Ok(Endpoint::Tcp {
        host: "127.0.0.1".into(),
        port: 5555
      })
    );
    assert_eq!(
      Endpoint::parse("tcp://*:0"),
      Ok(Endpoint::Tcp {
        host: "0.0.0.0".into(),
        port: 0
      })
    );
    assert_eq!(
      Endpoint::parse("tcp://[::1]:80"),
      Ok(Endpoint::Tcp { host: "::1".into(), port: 80 })
    );
    assert_eq!(Endpoint::parse("inproc://svc"), Ok(Endpoint::Inproc("svc".into())));
    assert_eq!(Endpoint::parse("ipc:///tmp/x.sock"), Ok(Endpoint::Ipc("/tmp/x.sock".into())));
  }

  #[test]
  fn rejects_malformed_addresses() {
    assert!(matches!(Endpoint::parse("nonsense"), Err(NngError::AddressInvalid(_))));
    assert!(matches!(Endpoint::parse("tcp://host"), Err(NngError::AddressInvalid(_))));
    assert!(matches!(Endpoint::parse("tcp://host:99999"), Err(NngError::AddressInvalid(_))));
    assert!(matches!(Endpoint::parse("inproc://"), Err(NngError::AddressInvalid(_))));
    assert!(matches!(Endpoint::parse("ws://x:1"), Err(NngError::UnsupportedTransport(_))));
  }

  #[test]
  fn sockaddr_displays_as_url() {
    let addr: SocketAddr = "127.0.0.1:4000".parse().expect("addr");
    assert_eq!(SockAddr::Tcp(addr).to_string(), "tcp://127.0.0.1:4000");
    assert_eq!(SockAddr::Inproc("a".into()).to_string(), "inproc://a");
  }
}
