// tests/lifecycle.rs

use rnng::{DialMode, NngError, NngResult, Protocol, SockAddr, Socket};
use serial_test::serial;
mod common;

#[test]
fn test_loopback_ping() -> NngResult<()> {
  println!("Starting test_loopback_ping...");
  let (server, client) = common::connected_pair(Protocol::Pair0, Protocol::Pair0)?;

  // A blocking dial returns once both ends are attached.
  assert_eq!(server.pipes().len(), 1);
  assert_eq!(client.pipes().len(), 1);
  assert_eq!(client.dialers().len(), 1);
  assert_eq!(server.listeners().len(), 1);

  client.send(b"ping")?;
  let got = server.recv(true)?;
  assert_eq!(&got[..], b"ping");
  server.send(b"pong")?;
  assert_eq!(&client.recv(true)?[..], b"pong");
  println!("Loopback round trip done.");
  Ok(())
}

#[test]
fn test_close_is_idempotent_and_final() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Pair0, Protocol::Pair0)?;
  client.close()?;
  client.close()?;
  assert!(client.is_closed());
  assert!(client.pipes().is_empty());
  assert!(client.dialers().is_empty());

  assert!(matches!(client.send(b"x"), Err(NngError::Closed)));
  assert!(matches!(client.recv(false), Err(NngError::Closed)));
  assert!(matches!(client.dial("inproc://anything", DialMode::NonBlocking), Err(NngError::Closed)));

  // The far side notices the disconnect.
  assert!(common::wait_until(common::LONG_TIMEOUT, || server.pipes().is_empty()));
  Ok(())
}

#[test]
fn test_dial_modes_without_listener() -> NngResult<()> {
  let s = common::socket(Protocol::Push0);
  let url = common::unique_inproc_endpoint();

  let blocking = s.dial(&url, DialMode::Blocking);
  assert!(matches!(blocking, Err(NngError::ConnectionRefused(_))));
  assert!(s.dialers().is_empty());

  let auto = s.dial(&url, DialMode::Auto)?;
  let background = s.dial(&url, DialMode::NonBlocking)?;
  assert_ne!(auto.id(), background.id());
  assert_eq!(s.dialers().len(), 2);
  Ok(())
}

#[test]
fn test_background_dialer_connects_once_listener_appears() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let push = common::socket(Protocol::Push0);
  let dialer = push.dial(&url, DialMode::NonBlocking)?;
  assert_eq!(dialer.url()?, url);

  let pull = common::socket(Protocol::Pull0);
  pull.listen(&url)?;
  assert!(common::wait_until(common::LONG_TIMEOUT, || push.pipes().len() == 1));

  push.send(b"late")?;
  assert_eq!(&pull.recv(true)?[..], b"late");
  Ok(())
}

#[test]
fn test_listen_errors() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let a = common::socket(Protocol::Bus0);
  let b = common::socket(Protocol::Bus0);
  a.listen(&url)?;

  let taken = b.listen(&url);
  assert!(matches!(taken, Err(NngError::AddrInUse(_))));
  assert!(taken.unwrap_err().is_bind_error());

  assert!(matches!(b.listen("inproc://"), Err(NngError::AddressInvalid(_))));
  assert!(matches!(b.listen("nonsense"), Err(NngError::AddressInvalid(_))));
  assert!(matches!(b.listen("ws://127.0.0.1:1"), Err(NngError::UnsupportedTransport(_))));
  assert!(b.listeners().is_empty());
  Ok(())
}

#[test]
fn test_endpoint_close_removes_it_from_socket() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let server = common::socket(Protocol::Pair1);
  let listener = server.listen(&url)?;
  let client = common::socket(Protocol::Pair1);
  let dialer = client.dial(&url, DialMode::Blocking)?;

  dialer.close()?;
  dialer.close()?;
  assert!(client.dialers().is_empty());
  assert!(common::wait_until(common::LONG_TIMEOUT, || client.pipes().is_empty()));
  assert!(common::wait_until(common::LONG_TIMEOUT, || server.pipes().is_empty()));

  listener.close()?;
  assert!(server.listeners().is_empty());
  // The name is released once the accept loop winds down.
  assert!(common::wait_until(common::LONG_TIMEOUT, || server.listen(&url).is_ok()));
  Ok(())
}

#[test]
fn test_handles_outliving_their_socket() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let (dialer, pipe) = {
    let server = common::socket(Protocol::Pair0);
    server.listen(&url)?;
    let client = common::socket(Protocol::Pair0);
    let dialer = client.dial(&url, DialMode::Blocking)?;
    let pipe = client.pipes().pop().expect("one pipe");
    assert_eq!(pipe.socket()?, client);
    (dialer, pipe)
  };
  assert!(matches!(dialer.socket(), Err(NngError::Closed)));
  assert!(matches!(pipe.socket(), Err(NngError::Closed)));
  assert!(matches!(dialer.url(), Err(NngError::Closed)));
  assert!(matches!(pipe.url(), Err(NngError::Closed)));
  assert!(matches!(pipe.send(b"gone"), Err(NngError::Closed)));
  Ok(())
}

#[test]
fn test_open_config_listens_and_dials() -> NngResult<()> {
  common::setup_tracing();
  let url = common::unique_inproc_endpoint();
  let server = Socket::open(
    Protocol::Pull0,
    rnng::SocketConfig::new()
      .with_listen(url.clone())
      .with_recv_timeout(common::LONG_TIMEOUT)
      .with_name("sink"),
  )?;
  let client = Socket::open(
    Protocol::Push0,
    rnng::SocketConfig::new()
      .with_dial(url.clone())
      .with_dial_mode(DialMode::Blocking),
  )?;
  assert_eq!(server.name()?, "sink");
  assert_eq!(server.listeners().len(), 1);
  assert_eq!(client.dialers().len(), 1);
  client.send(b"configured")?;
  assert_eq!(&server.recv(true)?[..], b"configured");
  Ok(())
}

#[test]
fn test_bad_initial_option_fails_open() {
  common::setup_tracing();
  let result = Socket::open(Protocol::Pair0, rnng::SocketConfig::new().with_polyamorous(true));
  assert!(matches!(result, Err(NngError::NotSupported(_))));
}

#[test]
#[serial]
fn test_tcp_ephemeral_port() -> NngResult<()> {
  let server = common::socket(Protocol::Rep0);
  let listener = server.listen("tcp://127.0.0.1:0")?;
  let addr = listener.local_address()?;
  let port = match &addr {
    SockAddr::Tcp(a) => a.port(),
    other => panic!("unexpected address {:?}", other),
  };
  assert_ne!(port, 0);

  let client = common::socket(Protocol::Req0);
  let dialer = client.dial(&common::dialable(&addr), DialMode::Blocking)?;
  client.send(b"over tcp")?;
  let request = server.recv(true)?;
  server.send(&request)?;
  assert_eq!(&client.recv(true)?[..], b"over tcp");

  let pipe = client.pipes().pop().expect("one pipe");
  assert_eq!(pipe.remote_address()?, addr);
  assert_eq!(pipe.dialer()?.id(), dialer.id());
  Ok(())
}

#[cfg(unix)]
#[test]
#[serial]
fn test_ipc_round_trip() -> NngResult<()> {
  let url = common::unique_ipc_endpoint();
  let pull = common::socket(Protocol::Pull0);
  pull.listen(&url)?;
  let push = common::socket(Protocol::Push0);
  push.dial(&url, DialMode::Blocking)?;
  push.send(b"over ipc")?;
  assert_eq!(&pull.recv(true)?[..], b"over ipc");
  Ok(())
}
