// src/protocol/sp/mod.rs

pub(crate) mod codec;
pub(crate) mod handshake;

pub(crate) use codec::SpCodec;
