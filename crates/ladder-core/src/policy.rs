//! Tunables for hierarchy writes.

use serde::Deserialize;

/// Policy applied by the store on every assignment write.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HierarchyPolicy {
  /// Deepest permitted reporting chain, counted in edges from a root.
  pub max_depth:            usize,
  /// Require the candidate manager to hold a role flagged `is_manager`.
  pub require_manager_role: bool,
  /// Attempts per write when the storage layer reports contention.
  pub max_write_attempts:   u32,
  pub busy_timeout_ms:      u64,
}

impl Default for HierarchyPolicy {
  fn default() -> Self {
    Self {
      max_depth:            10,
      require_manager_role: true,
      max_write_attempts:   3,
      busy_timeout_ms:      5_000,
    }
  }
}
