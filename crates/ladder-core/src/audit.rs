//! The hierarchy audit log.
//!
//! One [`HierarchyChangeEvent`] is written in the same transaction as every
//! successful assignment change. Events are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  assignment::Assignment,
  ids::{EventId, PersonId, RoleScope},
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeType {
  Assigned,
  Reassigned,
  Removed,
}

impl ChangeType {
  /// `Assigned` for a person's first assignment in a scope, `Reassigned` when
  /// an active assignment is being replaced.
  pub fn for_write(previous: Option<&Assignment>) -> Self {
    if previous.is_some() { Self::Reassigned } else { Self::Assigned }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyChangeEvent {
  pub id:             EventId,
  pub person_id:      PersonId,
  pub scope:          RoleScope,
  pub old_manager_id: Option<PersonId>,
  pub new_manager_id: Option<PersonId>,
  pub changed_by:     PersonId,
  pub change_type:    ChangeType,
  pub reason:         Option<String>,
  pub created_at:     DateTime<Utc>,
}

/// Parameters for [`crate::store::HierarchyStore::history`]. Results are
/// newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
  pub person_id:   Option<PersonId>,
  pub scope:       Option<RoleScope>,
  pub change_type: Option<ChangeType>,
  /// Inclusive. Event times are kept to the microsecond.
  pub since:       Option<DateTime<Utc>>,
  /// Inclusive.
  pub until:       Option<DateTime<Utc>>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

impl HistoryQuery {
  pub const DEFAULT_LIMIT: usize = 50;

  pub fn for_person(person_id: PersonId) -> Self {
    Self { person_id: Some(person_id), ..Default::default() }
  }

  pub fn for_scope(scope: RoleScope) -> Self {
    Self { scope: Some(scope), ..Default::default() }
  }
}
