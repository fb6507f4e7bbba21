// src/socket/registry.rs

//! Process-wide lookup from notification tokens to live sockets.
//!
//! The engine hands back an opaque `u64` with every pipe notification. The token packs an
//! arena slot index (low 32 bits) with the slot's generation (high 32 bits), so a token that
//! outlives its socket never resolves to whatever socket reuses the slot. Slots hold weak
//! references only; the registry never keeps a socket alive.

use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::core::SocketInner;

pub(crate) static REGISTRY: Lazy<SocketRegistry> = Lazy::new(SocketRegistry::default);

struct Slot {
  generation: u32,
  socket: Option<Weak<SocketInner>>,
}

#[derive(Default)]
struct Arena {
  slots: Vec<Slot>,
  free: Vec<u32>,
}

#[derive(Default)]
pub(crate) struct SocketRegistry {
  arena: Mutex<Arena>,
}

fn pack(index: u32, generation: u32) -> u64 {
  (u64::from(generation) << 32) | u64::from(index)
}

fn unpack(token: u64) -> (u32, u32) {
  (token as u32, (token >> 32) as u32)
}

impl SocketRegistry {
  /// Stores `socket` and returns its token.
  pub fn register(&self, socket: Weak<SocketInner>) -> u64 {
    let mut arena = self.arena.lock();
    if let Some(index) = arena.free.pop() {
      let slot = &mut arena.slots[index as usize];
      slot.socket = Some(socket);
      return pack(index, slot.generation);
    }
    let index = arena.slots.len() as u32;
    arena.slots.push(Slot {
      generation: 0,
      socket: Some(socket),
    });
    pack(index, 0)
  }

  /// The socket behind `token`, if it is still registered and alive.
  pub fn lookup(&self, token: u64) -> Option<Arc<SocketInner>> {
    let (index, generation) = unpack(token);
    let arena = self.arena.lock();
    let slot = arena.slots.get(index as usize)?;
    if slot.generation != generation {
      return None;
    }
    slot.socket.as_ref()?.upgrade()
  }

  /// Frees the slot behind `token`. Stale tokens are ignored.
  pub fn unregister(&self, token: u64) {
    let (index, generation) = unpack(token);
    let mut arena = self.arena.lock();
    let Some(slot) = arena.slots.get_mut(index as usize) else {
      return;
    };
    if slot.generation != generation || slot.socket.is_none() {
      return;
    }
    slot.socket = None;
    slot.generation = slot.generation.wrapping_add(1);
    arena.free.push(index);
  }

  #[cfg(test)]
  fn live(&self) -> usize {
    self.arena.lock().slots.iter().filter(|s| s.socket.is_some()).count()
  }
}
