// src/protocol/sp/handshake.rs

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NngError, NngResult};
use crate::socket::Protocol;

pub(crate) const HEADER_LEN: usize = 8;

/// Upper bound for each half of the connection header exchange.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// `00 'S' 'P' 00 <protocol u16 BE> 00 00`
pub(crate) fn encode_header(protocol: Protocol) -> [u8; HEADER_LEN] {
  let id = protocol.id().to_be_bytes();
  [0x00, b'S', b'P', 0x00, id[0], id[1], 0x00, 0x00]
}

/// Validates a peer header and returns the peer's protocol number.
pub(crate) fn decode_header(buf: &[u8; HEADER_LEN]) -> NngResult<u16> {
  if buf[0] != 0x00 || buf[1] != b'S' || buf[2] != b'P' || buf[3] != 0x00 {
    return Err(NngError::Protocol("bad connection header".into()));
  }
  if buf[6] != 0 || buf[7] != 0 {
    return Err(NngError::Protocol("reserved header bytes set".into()));
  }
  Ok(u16::from_be_bytes([buf[4], buf[5]]))
}

pub(crate) async fn send_header<C>(conn: &mut C, protocol: Protocol) -> NngResult<()>
where
  C: AsyncWrite + Unpin + ?Sized,
{
  let header = encode_header(protocol);
  let write = async {
    conn.write_all(&header).await?;
    conn.flush().await
  };
  match tokio::time::timeout(HANDSHAKE_TIMEOUT, write).await {
    Ok(r) => r.map_err(|e| NngError::from_io_endpoint(e, "handshake")),
    Err(_) => Err(NngError::Timeout),
  }
}

/// Reads the peer header and checks that the peer speaks `ours.peer()`.
pub(crate) async fn recv_header<C>(conn: &mut C, ours: Protocol) -> NngResult<Protocol>
where
  C: AsyncRead + Unpin + ?Sized,
{
  let mut buf = [0u8; HEADER_LEN];
  match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut buf)).await {
    Ok(Ok(_)) => {}
    Ok(Err(e)) => return Err(NngError::from_io_endpoint(e, "handshake")),
    Err(_) => return Err(NngError::Timeout),
  }
  let id = decode_header(&buf)?;
  match Protocol::from_id(id) {
    Some(peer) if peer == ours.peer() => Ok(peer),
    _ => Err(NngError::Protocol(format!(
      "peer protocol 0x{:02x} is not compatible with {}",
      id, ours
    ))),
  }
}
