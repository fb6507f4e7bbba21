// src/transport/tcp.rs

use std::net::{SocketAddr, ToSocketAddrs};

use socket2::{Domain, Protocol as SockProtocol, SockRef, Socket as RawTcpSocket, Type};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{NngError, NngResult};
use crate::transport::{Connection, SockAddr, TransportConfig};

const LISTEN_BACKLOG: i32 = 128;

pub(crate) struct TcpAcceptor {
  listener: TcpListener,
  local: SocketAddr,
  cfg: TransportConfig,
}

/// Binds with SO_REUSEADDR through socket2, then hands the socket to tokio.
pub(crate) fn bind(host: &str, port: u16, url: &str, cfg: TransportConfig) -> NngResult<TcpAcceptor> {
  let addr = (host, port)
    .to_socket_addrs()
    .map_err(|_| NngError::AddressInvalid(url.to_string()))?
    .next()
    .ok_or_else(|| NngError::AddressInvalid(url.to_string()))?;

  let socket = RawTcpSocket::new(Domain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;
  socket.set_reuse_address(true)?;
  socket.set_nonblocking(true)?;
  socket
    .bind(&addr.into())
    .map_err(|e| NngError::from_io_endpoint(e, url))?;
  socket.listen(LISTEN_BACKLOG)?;

  let listener = TcpListener::from_std(socket.into())?;
  let local = listener.local_addr()?;
  tracing::info!(%local, uri = %url, "TCP listener bound");
  Ok(TcpAcceptor { listener, local, cfg })
}

impl TcpAcceptor {
  pub fn local_addr(&self) -> SockAddr {
    SockAddr::Tcp(self.local)
  }

  pub async fn accept(&mut self) -> NngResult<Connection> {
    let (stream, peer) = self.listener.accept().await?;
    apply_tcp_options(&stream, self.cfg)?;
    tracing::debug!(local = %self.local, %peer, "Accepted TCP connection");
    Ok(Connection {
      local: SockAddr::Tcp(stream.local_addr()?),
      remote: SockAddr::Tcp(peer),
      stream: Box::new(stream),
    })
  }
}

pub(crate) async fn connect(host: &str, port: u16, url: &str, cfg: TransportConfig) -> NngResult<Connection> {
  let stream = TcpStream::connect((host, port))
    .await
    .map_err(|e| NngError::from_io_endpoint(e, url))?;
  apply_tcp_options(&stream, cfg)?;
  let local = stream.local_addr()?;
  let remote = stream.peer_addr()?;
  tracing::debug!(%local, %remote, "TCP connection established");
  Ok(Connection {
    local: SockAddr::Tcp(local),
    remote: SockAddr::Tcp(remote),
    stream: Box::new(stream),
  })
}

fn apply_tcp_options(stream: &TcpStream, cfg: TransportConfig) -> NngResult<()> {
  stream.set_nodelay(cfg.tcp_nodelay)?;
  SockRef::from(stream).set_keepalive(cfg.tcp_keepalive)?;
  Ok(())
}
