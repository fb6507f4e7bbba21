// src/message/owned.rs

use std::fmt;

use bytes::Bytes;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::{NngError, NngResult};
use crate::message::Msg;
use crate::socket::Pipe;

const SENT_TWICE: &str = "Attempted to send the same message more than once.";
const DISPOSED: &str = "Message buffer has already been sent or freed.";

enum Buffer {
  Live(Msg),
  Sent,
  Freed,
}

struct MessageInner {
  buffer: Buffer,
  pipe: Option<Pipe>,
}

/// A message buffer that can be shared between threads and sent at most once.
///
/// The buffer belongs to exactly one side at a time: this `Message`, or the send operation it
/// was handed to. Sending moves the buffer out and leaves the `Message` disposed; a second send
/// fails with [`NngError::MessageState`]. Dropping or [`dispose`](Message::dispose)-ing a live
/// message frees the buffer. All transitions happen under a per-message lock that is never
/// shared with socket bookkeeping.
///
/// A `Message` may carry a [`Pipe`]: the pipe it arrived on after a receive, or the pipe to
/// send it through (honored by protocols that support directed sends, such as polyamorous
/// pair1).
pub struct Message {
  inner: Mutex<MessageInner>,
}

impl Message {
  /// Copies `data` into a new message buffer.
  pub fn new(data: &[u8]) -> Self {
    Self::adopt(Msg::from_slice(data))
  }

  /// Copies `data` into a new message addressed to `pipe`.
  pub fn with_pipe(data: &[u8], pipe: &Pipe) -> Self {
    let mut msg = Msg::from_slice(data);
    msg.set_pipe(Some(pipe.raw()));
    Self {
      inner: Mutex::new(MessageInner {
        buffer: Buffer::Live(msg),
        pipe: Some(pipe.clone()),
      }),
    }
  }

  /// Takes ownership of an engine buffer without copying.
  pub(crate) fn adopt(msg: Msg) -> Self {
    Self {
      inner: Mutex::new(MessageInner {
        buffer: Buffer::Live(msg),
        pipe: None,
      }),
    }
  }

  /// The pipe this message arrived on or is addressed to.
  pub fn pipe(&self) -> Option<Pipe> {
    self.inner.lock().pipe.clone()
  }

  /// Addresses the message to `pipe`.
  pub fn set_pipe(&self, pipe: &Pipe) -> NngResult<()> {
    let mut inner = self.inner.lock();
    match &mut inner.buffer {
      Buffer::Live(msg) => msg.set_pipe(Some(pipe.raw())),
      _ => return Err(NngError::MessageState(DISPOSED)),
    }
    inner.pipe = Some(pipe.clone());
    Ok(())
  }

  /// Records the pipe a received message came from. The engine buffer is already tagged.
  pub(crate) fn associate(&self, pipe: Pipe) {
    self.inner.lock().pipe = Some(pipe);
  }

  /// True once the buffer was handed to a send or freed.
  pub fn is_disposed(&self) -> bool {
    !matches!(self.inner.lock().buffer, Buffer::Live(_))
  }

  /// True if the buffer was handed to a send operation.
  pub fn was_sent(&self) -> bool {
    matches!(self.inner.lock().buffer, Buffer::Sent)
  }

  /// Body length in bytes; zero once disposed.
  pub fn len(&self) -> usize {
    match &self.inner.lock().buffer {
      Buffer::Live(msg) => msg.len(),
      _ => 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Borrow the message body in place. `None` once the message is disposed.
  ///
  /// The guard holds the message lock: a concurrent send or dispose waits until it is dropped.
  pub fn buffer(&self) -> Option<MappedMutexGuard<'_, [u8]>> {
    MutexGuard::try_map(self.inner.lock(), |inner| match &mut inner.buffer {
      Buffer::Live(msg) => Some(msg.body_mut()),
      _ => None,
    })
    .ok()
  }

  /// Copy of the message body.
  pub fn bytes(&self) -> NngResult<Bytes> {
    self.to_vec().map(Bytes::from)
  }

  pub fn to_vec(&self) -> NngResult<Vec<u8>> {
    match &self.inner.lock().buffer {
      Buffer::Live(msg) => Ok(msg.body().to_vec()),
      _ => Err(NngError::MessageState(DISPOSED)),
    }
  }

  /// Frees the buffer without sending it. Returns false if it was already disposed.
  pub fn dispose(&self) -> bool {
    let mut inner = self.inner.lock();
    if let Buffer::Live(_) = inner.buffer {
      inner.buffer = Buffer::Freed;
      true
    } else {
      false
    }
  }

  /// Moves the buffer into `send` while holding the message lock.
  ///
  /// The message is marked sent before `send` runs, so no other thread can send or free the
  /// same buffer in between. Fails with `MessageState` if the message was already disposed.
  pub(crate) fn with_sendable<R>(&self, send: impl FnOnce(Msg) -> R) -> NngResult<R> {
    let mut inner = self.inner.lock();
    let msg = match std::mem::replace(&mut inner.buffer, Buffer::Sent) {
      Buffer::Live(msg) => msg,
      other => {
        inner.buffer = other;
        return Err(NngError::MessageState(SENT_TWICE));
      }
    };
    tracing::trace!(len = msg.len(), "Message buffer handed to send");
    Ok(send(msg))
  }

  /// Runs a synchronous send of the buffer while holding the message lock.
  ///
  /// The message counts as sent only once `send` succeeds. If `send` hands the buffer back
  /// with its error, the message is live again and may be resent.
  pub(crate) fn send_with(&self, send: impl FnOnce(Msg) -> Result<(), (NngError, Option<Msg>)>) -> NngResult<()> {
    let mut inner = self.inner.lock();
    let msg = match std::mem::replace(&mut inner.buffer, Buffer::Sent) {
      Buffer::Live(msg) => msg,
      other => {
        inner.buffer = other;
        return Err(NngError::MessageState(SENT_TWICE));
      }
    };
    match send(msg) {
      Ok(()) => Ok(()),
      Err((e, returned)) => {
        if let Some(msg) = returned {
          tracing::trace!(error = %e, "Send failed, message buffer returned");
          inner.buffer = Buffer::Live(msg);
        }
        Err(e)
      }
    }
  }
}

impl From<&[u8]> for Message {
  fn from(data: &[u8]) -> Self {
    Message::new(data)
  }
}

impl From<Vec<u8>> for Message {
  fn from(data: Vec<u8>) -> Self {
    Message::new(&data)
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    let state = match &inner.buffer {
      Buffer::Live(msg) => format!("live({} bytes)", msg.len()),
      Buffer::Sent => "sent".to_string(),
      Buffer::Freed => "freed".to_string(),
    };
    f.debug_struct("Message")
      .field("state", &state)
      .field("pipe", &inner.pipe.as_ref().map(|p| p.id()))
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_send_is_rejected() {
    let msg = Message::new(b"hello");
    let sent = msg.with_sendable(|m| m.len()).expect("first send");
    assert_eq!(sent, 5);
    assert!(msg.was_sent());
    let again = msg.with_sendable(|m| m.len());
    assert_eq!(again, Err(NngError::MessageState(SENT_TWICE)));
  }

  #[test]
  fn failed_send_returns_the_buffer() {
    let msg = Message::new(b"retry");
    let first = msg.send_with(|m| Err((NngError::Timeout, Some(m))));
    assert_eq!(first, Err(NngError::Timeout));
    assert!(!msg.is_disposed());
    assert_eq!(msg.to_vec().expect("live"), b"retry".to_vec());

    let mut seen = 0;
    msg
      .send_with(|m| {
        seen = m.len();
        Ok(())
      })
      .expect("second attempt");
    assert_eq!(seen, 5);
    assert!(msg.was_sent());
    assert_eq!(msg.send_with(|_| Ok(())), Err(NngError::MessageState(SENT_TWICE)));
  }

  #[test]
  fn dispose_is_idempotent() {
    let msg = Message::new(b"bye");
    assert!(msg.dispose());
    assert!(!msg.dispose());
    assert!(msg.is_disposed());
    assert!(!msg.was_sent());
    assert!(msg.buffer().is_none());
    assert!(msg.with_sendable(|_| ()).is_err());
  }

  #[test]
  fn buffer_view_allows_in_place_edits() {
    let msg = Message::from(&b"abc"[..]);
    if let Some(mut view) = msg.buffer() {
      view[0] = b'x';
    }
    assert_eq!(msg.to_vec().expect("live"), b"xbc".to_vec());
    assert_eq!(msg.len(), 3);
  }
}
