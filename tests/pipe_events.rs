// tests/pipe_events.rs

use rnng::{DialMode, NngError, NngResult, PipeCallback, Protocol, Socket, SocketConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
mod common;

fn counter() -> (Arc<AtomicUsize>, PipeCallback) {
  let count = Arc::new(AtomicUsize::new(0));
  let c = count.clone();
  let cb = PipeCallback::new(move |_| {
    c.fetch_add(1, Ordering::SeqCst);
    Ok(())
  });
  (count, cb)
}

#[test]
fn test_add_and_remove_hooks_fire_once_per_pipe() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let server = common::socket(Protocol::Pair1);
  let (pre, pre_cb) = counter();
  let (post, post_cb) = counter();
  let (removed, removed_cb) = counter();
  server.add_pre_add_callback(pre_cb);
  server.add_post_add_callback(post_cb);
  server.add_post_remove_callback(removed_cb);
  server.listen(&url)?;

  let client = common::socket(Protocol::Pair1);
  let dialer = client.dial(&url, DialMode::Blocking)?;
  assert_eq!(pre.load(Ordering::SeqCst), 1);
  assert_eq!(post.load(Ordering::SeqCst), 1);
  assert_eq!(removed.load(Ordering::SeqCst), 0);

  dialer.close()?;
  assert!(common::wait_until(common::LONG_TIMEOUT, || removed.load(Ordering::SeqCst) == 1));
  assert!(server.pipes().is_empty());
  // Nothing fires twice.
  std::thread::sleep(Duration::from_millis(50));
  assert_eq!(removed.load(Ordering::SeqCst), 1);
  assert_eq!(post.load(Ordering::SeqCst), 1);
  Ok(())
}

#[test]
fn test_hooks_run_in_registration_order() -> anyhow::Result<()> {
  let url = common::unique_inproc_endpoint();
  let server = common::socket(Protocol::Bus0);
  let (tx, rx) = mpsc::channel();
  for tag in ["first", "second", "third"] {
    let tx = tx.clone();
    server.add_post_add_callback(PipeCallback::new(move |_| {
      tx.send(tag)?;
      Ok(())
    }));
  }
  server.listen(&url)?;
  let client = common::socket(Protocol::Bus0);
  client.dial(&url, DialMode::Blocking)?;

  let seen = (0..3)
    .map(|_| rx.recv_timeout(common::LONG_TIMEOUT))
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| anyhow::anyhow!("post-add hook did not run: {}", e))?;
  assert_eq!(seen, vec!["first", "second", "third"]);
  Ok(())
}

#[test]
fn test_pre_add_close_rejects_pipe() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let server = common::socket(Protocol::Pair0);
  let (pre, _) = counter();
  let pre_count = pre.clone();
  server.add_pre_add_callback(PipeCallback::new(move |pipe| {
    pre_count.fetch_add(1, Ordering::SeqCst);
    pipe.close()?;
    Ok(())
  }));
  let (post, post_cb) = counter();
  let (removed, removed_cb) = counter();
  server.add_post_add_callback(post_cb);
  server.add_post_remove_callback(removed_cb);
  server.listen(&url)?;

  let client = common::socket(Protocol::Pair0);
  client.dial(&url, DialMode::NonBlocking)?;
  assert!(common::wait_until(common::LONG_TIMEOUT, || pre.load(Ordering::SeqCst) >= 1));
  std::thread::sleep(Duration::from_millis(50));

  assert!(server.pipes().is_empty());
  assert_eq!(post.load(Ordering::SeqCst), 0);
  assert_eq!(removed.load(Ordering::SeqCst), 0);
  Ok(())
}

#[test]
fn test_failing_and_panicking_hooks_are_contained() -> NngResult<()> {
  let server = common::socket(Protocol::Pair0);
  server.add_post_add_callback(PipeCallback::new(|_| Err("hook refused".into())));
  server.add_post_add_callback(PipeCallback::new(|_| panic!("hook exploded")));
  let (post, post_cb) = counter();
  server.add_post_add_callback(post_cb);

  let url = common::unique_inproc_endpoint();
  server.listen(&url)?;
  let client = common::socket(Protocol::Pair0);
  client.dial(&url, DialMode::Blocking)?;

  // Later hooks still ran and the pipe carries traffic.
  assert_eq!(post.load(Ordering::SeqCst), 1);
  assert_eq!(server.pipes().len(), 1);
  client.send(b"still alive")?;
  assert_eq!(&server.recv(true)?[..], b"still alive");
  Ok(())
}

#[test]
fn test_removed_hook_no_longer_fires() -> NngResult<()> {
  let server = common::socket(Protocol::Bus0);
  let (count, cb) = counter();
  server.add_post_add_callback(cb.clone());
  assert!(server.remove_post_add_callback(&cb));
  assert!(!server.remove_post_add_callback(&cb));
  assert!(!server.remove_pre_add_callback(&cb));

  let url = common::unique_inproc_endpoint();
  server.listen(&url)?;
  let client = common::socket(Protocol::Bus0);
  client.dial(&url, DialMode::Blocking)?;
  assert_eq!(server.pipes().len(), 1);
  assert_eq!(count.load(Ordering::SeqCst), 0);
  Ok(())
}

#[test]
fn test_hook_can_call_back_into_its_socket() -> anyhow::Result<()> {
  let server = common::socket(Protocol::Pair1);
  let (tx, rx) = mpsc::channel();
  server.add_post_add_callback(PipeCallback::new(move |pipe| {
    let socket = pipe.socket()?;
    let ids: Vec<u32> = socket.pipes().iter().map(|p| p.id()).collect();
    tx.send((pipe.id(), ids))?;
    Ok(())
  }));
  let url = common::unique_inproc_endpoint();
  server.listen(&url)?;
  let client = common::socket(Protocol::Pair1);
  client.dial(&url, DialMode::Blocking)?;

  let (id, ids) = rx.recv_timeout(common::LONG_TIMEOUT)?;
  assert_eq!(ids, vec![id]);
  Ok(())
}

#[test]
fn test_closing_socket_from_hook() -> NngResult<()> {
  let server = common::socket(Protocol::Pair0);
  let (tx, rx) = mpsc::channel();
  server.add_post_add_callback(PipeCallback::new(move |pipe| {
    pipe.socket()?.close()?;
    tx.send(())?;
    Ok(())
  }));
  let url = common::unique_inproc_endpoint();
  server.listen(&url)?;
  let client = common::socket(Protocol::Pair0);
  client.dial(&url, DialMode::NonBlocking)?;

  rx.recv_timeout(common::LONG_TIMEOUT).expect("hook ran");
  assert!(server.is_closed());
  assert!(server.pipes().is_empty());
  assert!(server.listeners().is_empty());
  Ok(())
}

#[test]
fn test_pipe_accessors() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let server = common::socket(Protocol::Rep0);
  let listener = server.listen(&url)?;
  // Slow reconnects so the closed pipe is not replaced while we watch.
  let client = Socket::open(
    Protocol::Req0,
    SocketConfig::new().with_reconnect_time(Duration::from_secs(5), Duration::from_secs(5)),
  )?;
  let dialer = client.dial(&url, DialMode::Blocking)?;

  let outbound = client.pipes().pop().expect("client pipe");
  assert_eq!(outbound.dialer()?.id(), dialer.id());
  assert!(matches!(outbound.listener(), Err(NngError::BadType(_))));
  assert_eq!(outbound.peer()?, Protocol::Rep0);
  assert_eq!(outbound.peer_name()?, "rep");
  assert_eq!(outbound.url()?, url);

  let inbound = server.pipes().pop().expect("server pipe");
  assert_eq!(inbound.listener()?.id(), listener.id());
  assert!(matches!(inbound.dialer(), Err(NngError::BadType(_))));
  assert_eq!(inbound.peer()?, Protocol::Req0);

  inbound.close()?;
  assert!(inbound.closed());
  assert!(common::wait_until(common::LONG_TIMEOUT, || server.pipes().is_empty()));
  Ok(())
}
