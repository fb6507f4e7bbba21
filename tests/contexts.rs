// tests/contexts.rs

use rnng::{NngError, NngResult, Protocol};
use std::thread;
mod common;

#[test]
fn test_contexts_keep_exchanges_apart() -> NngResult<()> {
  let (rep, req) = common::connected_pair(Protocol::Rep0, Protocol::Req0)?;
  let asks = req.new_contexts(2)?;
  let answers = rep.new_contexts(2)?;
  assert_ne!(asks[0].id(), asks[1].id());

  asks[0].send(b"one")?;
  asks[1].send(b"two")?;
  for ctx in &answers {
    let request = ctx.recv()?;
    let mut reply = request.to_vec();
    reply.extend_from_slice(b"!");
    ctx.send(&reply)?;
  }
  assert_eq!(&asks[1].recv()?[..], b"two!");
  assert_eq!(&asks[0].recv()?[..], b"one!");
  Ok(())
}

#[test]
fn test_contexts_across_threads() -> NngResult<()> {
  let (rep, req) = common::connected_pair(Protocol::Rep0, Protocol::Req0)?;
  let workers = 4;

  let servers: Vec<_> = (0..workers)
    .map(|_| -> NngResult<_> {
      let ctx = rep.new_context()?;
      Ok(thread::spawn(move || -> NngResult<()> {
        let msg = ctx.recv_message()?;
        assert!(msg.pipe().is_some());
        ctx.send_message(&msg)
      }))
    })
    .collect::<NngResult<_>>()?;

  let clients: Vec<_> = (0..workers)
    .map(|i| -> NngResult<_> {
      let ctx = req.new_context()?;
      Ok(thread::spawn(move || -> NngResult<()> {
        let body = format!("request {}", i);
        ctx.send(body.as_bytes())?;
        assert_eq!(ctx.recv()?, body.into_bytes());
        Ok(())
      }))
    })
    .collect::<NngResult<_>>()?;

  for handle in clients.into_iter().chain(servers) {
    handle.join().expect("worker thread")?;
  }
  Ok(())
}

#[tokio::test]
async fn test_async_context_round_trip() -> NngResult<()> {
  let (surveyor, respondent) = common::connected_pair(Protocol::Surveyor0, Protocol::Respondent0)?;
  surveyor.set_option(rnng::options::SURVEYOR_SURVEY_TIME, std::time::Duration::from_secs(2))?;
  let asking = surveyor.new_context()?;
  let answering = respondent.new_context()?;

  asking.async_send(b"status?").await?;
  let question = answering.async_recv_message().await?;
  assert_eq!(question.to_vec()?, b"status?".to_vec());
  answering.async_send(b"green").await?;
  assert_eq!(&asking.async_recv().await?[..], b"green");
  Ok(())
}

#[test]
fn test_contexts_need_a_stateful_protocol() -> NngResult<()> {
  let pair = common::socket(Protocol::Pair1);
  assert!(matches!(pair.new_context(), Err(NngError::NotSupported(_))));
  let push = common::socket(Protocol::Push0);
  assert!(matches!(push.new_context(), Err(NngError::NotSupported(_))));
  Ok(())
}

#[test]
fn test_context_close_is_idempotent() -> NngResult<()> {
  let req = common::socket(Protocol::Req0);
  let ctx = req.new_context()?;
  assert!(ctx.id().is_some());
  ctx.close()?;
  ctx.close()?;
  assert_eq!(ctx.id(), None);
  assert!(matches!(ctx.send(b"late"), Err(NngError::Closed)));

  // Closing after the socket is gone is fine too.
  let other = req.new_context()?;
  req.close()?;
  other.close()?;
  assert!(matches!(req.new_context(), Err(NngError::Closed)));
  Ok(())
}
