// src/protocol/sp/codec.rs

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::NngError;
use crate::message::Msg;

const LENGTH_PREFIX: usize = 8;

/// Frames messages as `u64` big-endian length followed by header and body.
///
/// `header_len` is fixed per protocol (request-id carrying protocols use 4 bytes).
/// `max_size` of zero means unlimited; larger frames fail the decode and close the pipe.
#[derive(Debug)]
pub(crate) struct SpCodec {
  header_len: usize,
  max_size: usize,
  state: DecodingState,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadLength,
  ReadBody(usize),
}

impl SpCodec {
  pub fn new(header_len: usize, max_size: usize) -> Self {
    Self {
      header_len,
      max_size,
      state: DecodingState::default(),
    }
  }
}

impl Encoder<Msg> for SpCodec {
  type Error = NngError;

  fn encode(&mut self, item: Msg, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let size = item.wire_len();
    dst.reserve(LENGTH_PREFIX + size);
    dst.put_u64(size as u64);
    dst.extend_from_slice(item.header());
    dst.extend_from_slice(item.body());
    Ok(())
  }
}

impl Decoder for SpCodec {
  type Item = Msg;
  type Error = NngError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.state {
        DecodingState::ReadLength => {
          if src.len() < LENGTH_PREFIX {
            return Ok(None);
          }
          let size = src.get_u64() as usize;
          if self.max_size > 0 && size > self.max_size {
            return Err(NngError::MessageTooLarge {
              size,
              max: self.max_size,
            });
          }
          self.state = DecodingState::ReadBody(size);
        }
        DecodingState::ReadBody(size) => {
          if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
          }
          self.state = DecodingState::ReadLength;
          let mut body = src.split_to(size);
          if body.len() < self.header_len {
            return Err(NngError::Protocol(format!(
              "frame of {} bytes is shorter than the {}-byte header",
              body.len(),
              self.header_len
            )));
          }
          let header = body.split_to(self.header_len);
          tracing::trace!(size, "Decoded SP frame");
          return Ok(Some(Msg::from_parts(header, body)));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_split_frames_with_header() {
    let mut codec = SpCodec::new(4, 0);
    let mut msg = Msg::from_slice(b"payload");
    msg.set_header(&[0x80, 0, 0, 1]);
    let mut wire = BytesMut::new();
    codec.encode(msg, &mut wire).expect("encode");
    assert_eq!(wire.len(), 8 + 4 + 7);

    let mut partial = wire.split_to(10);
    assert!(codec.decode(&mut partial).expect("decode").is_none());
    partial.unsplit(wire);
    let out = codec.decode(&mut partial).expect("decode").expect("frame");
    assert_eq!(out.header(), &[0x80, 0, 0, 1]);
    assert_eq!(out.body(), b"payload");
    assert!(partial.is_empty());
  }

  #[test]
  fn oversized_frame_is_rejected() {
    let mut codec = SpCodec::new(0, 4);
    let mut wire = BytesMut::new();
    wire.put_u64(5);
    wire.extend_from_slice(b"12345");
    assert!(matches!(
      codec.decode(&mut wire),
      Err(NngError::MessageTooLarge { size: 5, max: 4 })
    ));
  }

  #[test]
  fn short_header_is_a_protocol_error() {
    let mut codec = SpCodec::new(4, 0);
    let mut wire = BytesMut::new();
    wire.put_u64(2);
    wire.extend_from_slice(b"ab");
    assert!(matches!(codec.decode(&mut wire), Err(NngError::Protocol(_))));
  }
}
