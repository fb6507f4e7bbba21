// tests/messages.rs

use rnng::{DialMode, Message, NngError, NngResult, Protocol, Socket, SocketConfig};
use std::time::Duration;
mod common;

#[test]
fn test_message_round_trip_carries_pipe() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Pair0, Protocol::Pair0)?;
  let payload = b"bytes in, bytes out".to_vec();

  let outgoing = Message::from(payload.clone());
  client.send_message(&outgoing, true)?;
  assert!(outgoing.was_sent());
  assert!(outgoing.is_disposed());
  assert_eq!(outgoing.len(), 0);

  let incoming = server.recv_message(true)?;
  assert_eq!(incoming.to_vec()?, payload);
  assert_eq!(incoming.len(), payload.len());
  let pipe = incoming.pipe().expect("pipe association");
  assert_eq!(server.pipes(), vec![pipe]);
  Ok(())
}

#[test]
fn test_message_sent_twice_is_rejected() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Push0.peer(), Protocol::Push0)?;
  let msg = Message::new(b"once");
  client.send_message(&msg, true)?;
  let again = client.send_message(&msg, true);
  assert!(matches!(again, Err(NngError::MessageState(_))));
  assert_eq!(&server.recv(true)?[..], b"once");
  Ok(())
}

#[test]
fn test_failed_send_keeps_message_for_retry() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let push = common::socket(Protocol::Push0);
  push.set_send_timeout(Some(Duration::from_millis(50)))?;
  let msg = Message::new(b"second chance");

  assert!(matches!(push.send_message(&msg, true), Err(NngError::Timeout)));
  assert!(!msg.is_disposed());
  assert!(!msg.was_sent());
  assert!(matches!(push.send_message(&msg, false), Err(NngError::WouldBlock)));
  assert_eq!(msg.to_vec()?, b"second chance".to_vec());

  let pull = common::socket(Protocol::Pull0);
  pull.listen(&url)?;
  push.dial(&url, DialMode::Blocking)?;
  push.set_send_timeout(Some(common::LONG_TIMEOUT))?;
  push.send_message(&msg, true)?;
  assert!(msg.was_sent());
  assert_eq!(&pull.recv(true)?[..], b"second chance");
  Ok(())
}

#[test]
fn test_premature_reply_keeps_message() -> NngResult<()> {
  let rep = common::socket(Protocol::Rep0);
  let msg = Message::new(b"too early");
  assert!(matches!(rep.send_message(&msg, true), Err(NngError::InvalidState(_))));
  assert!(!msg.is_disposed());
  assert_eq!(msg.len(), 9);
  Ok(())
}

#[test]
fn test_dispose_frees_once() {
  let msg = Message::new(b"temporary");
  assert!(!msg.is_disposed());
  assert!(msg.dispose());
  assert!(!msg.dispose());
  assert!(msg.buffer().is_none());
  assert!(matches!(msg.bytes(), Err(NngError::MessageState(_))));
}

#[test]
fn test_set_pipe_on_disposed_message_fails() -> NngResult<()> {
  let (server, _client) = common::connected_pair(Protocol::Pair0, Protocol::Pair0)?;
  let pipe = server.pipes().pop().expect("pipe");
  let msg = Message::new(b"x");
  msg.set_pipe(&pipe)?;
  assert_eq!(msg.pipe(), Some(pipe.clone()));
  msg.dispose();
  assert!(matches!(msg.set_pipe(&pipe), Err(NngError::MessageState(_))));
  Ok(())
}

#[test]
fn test_received_buffer_can_be_edited_in_place() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Pair1, Protocol::Pair1)?;
  client.send(b"hello")?;
  let msg = server.recv_message(true)?;
  if let Some(mut body) = msg.buffer() {
    body.make_ascii_uppercase();
  }
  // Echo the edited buffer back without copying it out first.
  server.send_message(&msg, true)?;
  assert_eq!(&client.recv(true)?[..], b"HELLO");
  Ok(())
}

#[test]
fn test_polyamorous_pair_directs_replies() -> NngResult<()> {
  common::setup_tracing();
  let url = common::unique_inproc_endpoint();
  let hub = Socket::open(
    Protocol::Pair1,
    SocketConfig::new()
      .with_polyamorous(true)
      .with_recv_timeout(common::LONG_TIMEOUT)
      .with_listen(url.clone()),
  )?;
  let left = common::socket(Protocol::Pair1);
  left.dial(&url, DialMode::Blocking)?;
  let right = common::socket(Protocol::Pair1);
  right.dial(&url, DialMode::Blocking)?;
  assert_eq!(hub.pipes().len(), 2);

  right.send(b"from right")?;
  let msg = hub.recv_message(true)?;
  assert_eq!(msg.to_vec()?, b"from right".to_vec());
  let origin = msg.pipe().expect("origin pipe");
  origin.send(b"to right")?;

  assert_eq!(&right.recv(true)?[..], b"to right");
  left.set_recv_timeout(Some(std::time::Duration::from_millis(100)))?;
  assert!(matches!(left.recv(true), Err(NngError::Timeout)));
  Ok(())
}

#[test]
fn test_pair0_accepts_a_single_peer() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let server = common::socket(Protocol::Pair0);
  server.listen(&url)?;
  let first = common::socket(Protocol::Pair0);
  first.dial(&url, DialMode::Blocking)?;
  let second = common::socket(Protocol::Pair0);
  // The extra connection is refused, so the synchronous dial fails and the pipe never lands.
  assert!(second.dial(&url, DialMode::Blocking).is_err());
  assert_eq!(server.pipes().len(), 1);
  Ok(())
}
