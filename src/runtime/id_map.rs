// src/runtime/id_map.rs

use std::collections::BTreeMap;

/// Table of engine objects keyed by small positive ids.
///
/// New entries take the lowest id not currently in use, so ids of removed entries come back.
#[derive(Debug)]
pub(crate) struct IdMap<T> {
  entries: BTreeMap<u32, T>,
}

impl<T> Default for IdMap<T> {
  fn default() -> Self {
    Self {
      entries: BTreeMap::new(),
    }
  }
}

impl<T> IdMap<T> {
  pub fn next_id(&self) -> u32 {
    let mut candidate = 1;
    for &id in self.entries.keys() {
      if id != candidate {
        break;
      }
      candidate += 1;
    }
    candidate
  }

  /// Inserts the value built for the next free id and returns that id.
  pub fn alloc(&mut self, make: impl FnOnce(u32) -> T) -> u32 {
    let id = self.next_id();
    self.entries.insert(id, make(id));
    id
  }

  pub fn insert(&mut self, id: u32, value: T) {
    self.entries.insert(id, value);
  }

  pub fn get(&self, id: u32) -> Option<&T> {
    self.entries.get(&id)
  }

  pub fn remove(&mut self, id: u32) -> Option<T> {
    self.entries.remove(&id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }
}
