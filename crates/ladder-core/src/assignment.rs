//! Assignments: the reporting edge `person → manager` within one scope.
//!
//! Rows are never updated in place. A change of manager tombstones the
//! current row and inserts a successor, so the full chain of a person's
//! assignments in a scope is recoverable from storage alongside the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssignmentId, PersonId, RoleId, RoleScope};

/// A person's role and manager within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub id:            AssignmentId,
  pub person_id:     PersonId,
  pub scope:         RoleScope,
  pub role_id:       RoleId,
  /// `None` means the person is a root of the scope's forest.
  pub manager_id:    Option<PersonId>,
  pub assigned_at:   DateTime<Utc>,
  pub assigned_by:   PersonId,
  /// Tombstone. Set when the row is superseded or the person is released.
  pub removed_at:    Option<DateTime<Utc>>,
  pub superseded_by: Option<AssignmentId>,
}

impl Assignment {
  pub fn is_active(&self) -> bool { self.removed_at.is_none() }
}

// ─── Optimistic concurrency ──────────────────────────────────────────────────

/// What the caller believes the current assignment to be.
///
/// Checked inside the write transaction; a mismatch fails the write with a
/// conflict instead of silently overwriting a change the caller never saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expect", content = "id", rename_all = "snake_case")]
pub enum Precondition {
  /// Last writer wins.
  #[default]
  Any,
  /// The person must have no active assignment in the scope.
  Absent,
  /// The active assignment must be exactly this row.
  Current(AssignmentId),
}

impl Precondition {
  pub fn holds(&self, current: Option<&Assignment>) -> bool {
    match self {
      Self::Any => true,
      Self::Absent => current.is_none(),
      Self::Current(id) => current.is_some_and(|a| a.id == *id),
    }
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Input to [`crate::store::HierarchyStore::assign_manager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignManager {
  pub person_id:    PersonId,
  pub scope:        RoleScope,
  pub role_id:      RoleId,
  pub manager_id:   Option<PersonId>,
  /// Who is making the change; recorded in the audit log.
  pub actor:        PersonId,
  pub reason:       Option<String>,
  #[serde(default)]
  pub precondition: Precondition,
}

impl AssignManager {
  /// Convenience constructor with no reason and no precondition.
  pub fn new(
    person_id: PersonId,
    scope: RoleScope,
    role_id: RoleId,
    manager_id: Option<PersonId>,
    actor: PersonId,
  ) -> Self {
    Self {
      person_id,
      scope,
      role_id,
      manager_id,
      actor,
      reason: None,
      precondition: Precondition::Any,
    }
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }

  pub fn expecting(mut self, precondition: Precondition) -> Self {
    self.precondition = precondition;
    self
  }
}

/// Input to `remove_manager` and `release_person`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Removal {
  pub person_id: PersonId,
  pub scope:     RoleScope,
  pub actor:     PersonId,
  pub reason:    Option<String>,
}

impl Removal {
  pub fn new(person_id: PersonId, scope: RoleScope, actor: PersonId) -> Self {
    Self { person_id, scope, actor, reason: None }
  }
}

/// The result of a dry-run validation.
#[derive(Debug)]
pub enum Verdict {
  Accepted,
  Rejected(crate::Error),
}

impl Verdict {
  pub fn is_accepted(&self) -> bool { matches!(self, Self::Accepted) }
}

impl From<crate::Result<()>> for Verdict {
  fn from(r: crate::Result<()>) -> Self {
    match r {
      Ok(()) => Self::Accepted,
      Err(e) => Self::Rejected(e),
    }
  }
}
