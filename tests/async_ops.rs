// tests/async_ops.rs

use rnng::{AsyncBackend, DialMode, Message, NngError, NngResult, Protocol, Socket, SocketConfig};
use std::time::Duration;
mod common;

#[tokio::test]
async fn test_async_round_trip_under_tokio() -> NngResult<()> {
  println!("Starting test_async_round_trip_under_tokio...");
  let (server, client) = common::connected_pair(Protocol::Pair1, Protocol::Pair1)?;

  client.async_send(b"async hello").await?;
  let got = server.async_recv().await?;
  assert_eq!(&got[..], b"async hello");

  let reply = Message::new(b"async reply");
  server.async_send_message(&reply).await?;
  assert!(reply.was_sent());
  let msg = client.async_recv_message().await?;
  assert_eq!(msg.to_vec()?, b"async reply".to_vec());
  assert_eq!(msg.pipe(), client.pipes().pop());
  Ok(())
}

#[tokio::test]
async fn test_async_recv_times_out() -> NngResult<()> {
  common::setup_tracing();
  let pull = Socket::open(
    Protocol::Pull0,
    SocketConfig::new().with_recv_timeout(Duration::from_millis(50)),
  )?;
  let result = pull.async_recv().await;
  assert!(matches!(result, Err(NngError::Timeout)));
  Ok(())
}

#[tokio::test]
async fn test_dropped_async_recv_leaves_message_for_next_receiver() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Pull0, Protocol::Push0)?;
  server.set_recv_timeout(None)?;

  // Abandon a receive that has nothing to return yet.
  let abandoned = tokio::time::timeout(Duration::from_millis(50), server.async_recv()).await;
  assert!(abandoned.is_err(), "nothing was sent yet");

  client.async_send(b"for whoever is next").await?;
  let got = tokio::time::timeout(common::LONG_TIMEOUT, server.async_recv())
    .await
    .expect("message arrives");
  assert_eq!(&got?[..], b"for whoever is next");
  Ok(())
}

#[tokio::test]
async fn test_dropped_async_send_disposes_message() -> NngResult<()> {
  let url = common::unique_inproc_endpoint();
  let push = common::socket(Protocol::Push0);
  push.set_send_timeout(None)?;
  let msg = Message::new(b"abandoned");

  // No peer yet: the send parks until the future is dropped.
  let abandoned = tokio::time::timeout(Duration::from_millis(50), push.async_send_message(&msg)).await;
  assert!(abandoned.is_err(), "no peer to take the message");
  assert!(msg.was_sent());
  assert!(msg.is_disposed());
  let again = push.async_send_message(&msg).await;
  assert!(matches!(again, Err(NngError::MessageState(_))));

  // The canceled operation released the socket and took its buffer with it.
  let pull = common::socket(Protocol::Pull0);
  pull.listen(&url)?;
  push.dial(&url, DialMode::Blocking)?;
  push.async_send(b"after").await?;
  let got = tokio::time::timeout(common::LONG_TIMEOUT, pull.async_recv())
    .await
    .expect("message arrives");
  assert_eq!(&got?[..], b"after");
  Ok(())
}

#[tokio::test]
async fn test_async_send_of_sent_message_fails() -> NngResult<()> {
  let (_server, client) = common::connected_pair(Protocol::Pull0, Protocol::Push0)?;
  let msg = Message::new(b"one shot");
  client.async_send_message(&msg).await?;
  let again = client.async_send_message(&msg).await;
  assert!(matches!(again, Err(NngError::MessageState(_))));
  Ok(())
}

#[tokio::test]
async fn test_concurrent_async_tasks() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Pull0, Protocol::Push0)?;
  let count = 20;
  let producer = tokio::spawn(async move {
    for i in 0..count {
      client.async_send(format!("msg {}", i).as_bytes()).await?;
    }
    NngResult::Ok(client)
  });
  for i in 0..count {
    let got = server.async_recv().await?;
    assert_eq!(got, format!("msg {}", i).into_bytes());
  }
  let _client = producer.await.expect("producer task")?;
  Ok(())
}

#[test]
fn test_async_under_futures_executor() -> NngResult<()> {
  common::setup_tracing();
  let url = common::unique_inproc_endpoint();
  let config = SocketConfig::new()
    .with_async_backend(AsyncBackend::Futures)
    .with_recv_timeout(common::LONG_TIMEOUT);
  let rep = Socket::open(Protocol::Rep0, config.clone().with_listen(url.clone()))?;
  let req = Socket::open(Protocol::Req0, config)?;
  req.dial(&url, DialMode::Blocking)?;

  futures::executor::block_on(async {
    req.async_send(b"question").await?;
    let q = rep.async_recv().await?;
    rep.async_send(&q).await?;
    let answer = req.async_recv().await?;
    assert_eq!(&answer[..], b"question");
    NngResult::Ok(())
  })
}

#[test]
fn test_pipe_async_send() -> NngResult<()> {
  let (server, client) = common::connected_pair(Protocol::Pair0, Protocol::Pair0)?;
  let pipe = client.pipes().pop().expect("pipe");
  futures::executor::block_on(pipe.async_send(b"via pipe"))?;
  assert_eq!(&server.recv(true)?[..], b"via pipe");
  Ok(())
}
