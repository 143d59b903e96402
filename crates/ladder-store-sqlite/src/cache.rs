//! Per-scope cache of built forests.
//!
//! Each scope has a generation counter that every committed write bumps. A
//! reader notes the generation before loading rows and may only publish its
//! forest if the generation is unchanged, so a build that raced a write is
//! never cached.
//!
//! The lock is synchronous so the connection thread can bump a generation
//! right after its commit, whether or not the caller is still waiting.
//! Critical sections never await.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use ladder_core::{ids::RoleScope, tree::Forest};

#[derive(Default)]
struct Slot {
  generation: u64,
  forest:     Option<Arc<Forest>>,
}

#[derive(Default)]
pub struct TreeCache {
  slots: RwLock<HashMap<RoleScope, Slot>>,
}

impl TreeCache {
  /// The scope's current generation and cached forest, if any.
  pub fn get(&self, scope: RoleScope) -> (u64, Option<Arc<Forest>>) {
    let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
    match slots.get(&scope) {
      Some(slot) => (slot.generation, slot.forest.clone()),
      None => (0, None),
    }
  }

  /// Publish `forest` unless the scope was written since `generation` was
  /// read. Returns whether it was stored.
  pub fn put(
    &self,
    scope: RoleScope,
    generation: u64,
    forest: Arc<Forest>,
  ) -> bool {
    let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
    let slot = slots.entry(scope).or_default();
    if slot.generation != generation {
      return false;
    }
    slot.forest = Some(forest);
    true
  }

  pub fn invalidate(&self, scope: RoleScope) {
    let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
    let slot = slots.entry(scope).or_default();
    slot.generation += 1;
    slot.forest = None;
  }
}
