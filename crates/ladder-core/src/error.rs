//! Error types for `ladder-core`.

use serde::Serialize;
use thiserror::Error;

use crate::{
  access::DashboardCapability,
  ids::{PersonId, RoleId, RoleScope},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("person {0} cannot be their own manager")]
  SelfReference(PersonId),

  #[error("assigning {manager} as manager of {person} would create a cycle")]
  CircularReference { person: PersonId, manager: PersonId },

  #[error("manager {manager} holds no active assignment in scope {scope}")]
  CrossScopeMismatch { manager: PersonId, scope: RoleScope },

  #[error("person {0} does not hold a manager role in this scope")]
  ManagerRoleRequired(PersonId),

  #[error("reporting chain would exceed the maximum depth of {max}")]
  DepthExceeded { max: usize },

  #[error("role {role} cannot be held in scope {scope}")]
  RoleScopeMismatch { role: RoleId, scope: RoleScope },

  #[error("role {0} is inactive or retired")]
  RoleInactive(RoleId),

  #[error("role not found: {0}")]
  RoleNotFound(RoleId),

  #[error("role code {0:?} is already in use")]
  DuplicateRoleCode(String),

  #[error("no assignment for {person} in scope {scope}")]
  AssignmentNotFound { person: PersonId, scope: RoleScope },

  #[error("{person} has no active manager in scope {scope}")]
  NoActiveManager { person: PersonId, scope: RoleScope },

  #[error("assignment for {person} in scope {scope} changed concurrently")]
  PreconditionFailed { person: PersonId, scope: RoleScope },

  #[error("manager {manager} may not {capability}")]
  PermissionDenied {
    manager:    PersonId,
    capability: DashboardCapability,
  },

  #[error("unknown capability tag: {0:?}")]
  UnknownCapability(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse error classes shared by every backend.
///
/// Transport layers map these to status codes; the store uses
/// [`ErrorKind::ConcurrentConflict`] to decide what may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  SelfReference,
  CircularReference,
  CrossScopeMismatch,
  NotFound,
  ConcurrentConflict,
  PermissionDenied,
  Invalid,
  Internal,
}

impl ErrorKind {
  /// Structural violations are caller mistakes and are never retried.
  pub fn is_structural(self) -> bool {
    matches!(
      self,
      Self::SelfReference | Self::CircularReference | Self::CrossScopeMismatch
    )
  }
}

/// Implemented by every error type a [`HierarchyStore`] may return.
///
/// [`HierarchyStore`]: crate::store::HierarchyStore
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::SelfReference(_) => ErrorKind::SelfReference,
      Self::CircularReference { .. } => ErrorKind::CircularReference,
      Self::CrossScopeMismatch { .. } => ErrorKind::CrossScopeMismatch,
      Self::RoleNotFound(_)
      | Self::AssignmentNotFound { .. }
      | Self::NoActiveManager { .. } => ErrorKind::NotFound,
      Self::PreconditionFailed { .. } => ErrorKind::ConcurrentConflict,
      Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
      Self::ManagerRoleRequired(_)
      | Self::DepthExceeded { .. }
      | Self::RoleScopeMismatch { .. }
      | Self::RoleInactive(_)
      | Self::DuplicateRoleCode(_)
      | Self::UnknownCapability(_) => ErrorKind::Invalid,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}
