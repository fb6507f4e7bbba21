// src/message/msg.rs

use bytes::{Bytes, BytesMut};

use crate::engine::RawPipe;

/// Engine message buffer.
///
/// Not `Clone`: whoever holds a `Msg` owns it, and handing it to a send moves it.
/// Protocol headers (request ids) live apart from the body.
#[derive(Debug, Default)]
pub(crate) struct Msg {
  header: BytesMut,
  body: BytesMut,
  pipe: Option<RawPipe>,
}

impl Msg {
  pub fn from_slice(data: &[u8]) -> Self {
    Self {
      header: BytesMut::new(),
      body: BytesMut::from(data),
      pipe: None,
    }
  }

  pub fn from_parts(header: BytesMut, body: BytesMut) -> Self {
    Self { header, body, pipe: None }
  }

  pub fn header(&self) -> &[u8] {
    &self.header
  }

  pub fn set_header(&mut self, header: &[u8]) {
    self.header.clear();
    self.header.extend_from_slice(header);
  }

  pub fn body(&self) -> &[u8] {
    &self.body
  }

  pub fn body_mut(&mut self) -> &mut [u8] {
    &mut self.body
  }

  pub fn len(&self) -> usize {
    self.body.len()
  }

  /// Header plus body, as framed on the wire.
  pub fn wire_len(&self) -> usize {
    self.header.len() + self.body.len()
  }

  pub fn pipe(&self) -> Option<RawPipe> {
    self.pipe
  }

  pub fn set_pipe(&mut self, pipe: Option<RawPipe>) {
    self.pipe = pipe;
  }

  /// Explicit copy for fan-out sends.
  pub fn duplicate(&self) -> Self {
    Self {
      header: self.header.clone(),
      body: self.body.clone(),
      pipe: self.pipe,
    }
  }

  pub fn into_bytes(self) -> Bytes {
    self.body.freeze()
  }
}
