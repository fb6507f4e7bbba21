// src/protocol/mod.rs

//! Scalability-protocol wire handling: connection header exchange and message framing.

pub(crate) mod sp;
