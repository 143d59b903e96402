//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order matches chronological order. Ids are hyphenated
//! lowercase UUIDs.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound as _, Utc};
use ladder_core::{
  access::{DashboardAccess, DashboardFlags},
  assignment::Assignment,
  audit::{ChangeType, HierarchyChangeEvent},
  ids::{EventId, RoleScope},
  role::{CapabilitySet, HierarchicalRole, RoleStatus, RoleTypeKind},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_id(id: impl Into<Uuid>) -> String {
  id.into().hyphenated().to_string()
}

pub fn decode_id<T: From<Uuid>>(s: &str) -> Result<T> {
  Ok(T::from(Uuid::parse_str(s)?))
}

pub fn decode_opt_id<T: From<Uuid>>(s: Option<&str>) -> Result<Option<T>> {
  s.map(decode_id).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode `dt` rounded up to the next stored microsecond, for inclusive lower
/// bounds. Plain [`encode_dt`] truncates, which would admit rows written up
/// to a microsecond before `dt`.
pub fn encode_dt_ceil(dt: DateTime<Utc>) -> String {
  let truncated = dt.trunc_subsecs(6);
  if truncated < dt {
    encode_dt(truncated + Duration::microseconds(1))
  } else {
    encode_dt(truncated)
  }
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

pub fn encode_scope(scope: RoleScope) -> String { scope.to_string() }

pub fn decode_scope(s: &str) -> Result<RoleScope> {
  s.parse().map_err(|_| Error::Decode(format!("bad scope {s:?}")))
}

fn decode_enum<T: std::str::FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `hierarchical_roles` row joined with `role_types`.
pub struct RawRole {
  pub role_id:          String,
  pub role_type:        String,
  pub name:             String,
  pub code:             String,
  pub hierarchy_level:  i32,
  pub is_manager:       bool,
  pub can_view_reports: bool,
  pub description:      Option<String>,
  pub permissions:      String,
  pub status:           String,
  pub created_at:       String,
  pub retired_at:       Option<String>,
}

/// Column list matching [`RawRole::from_row`]. Expects the roles table
/// aliased `r` and role types aliased `t`.
pub const ROLE_COLUMNS: &str = "r.role_id, t.name, r.name, r.code, \
  r.hierarchy_level, r.is_manager, r.can_view_reports, r.description, \
  r.permissions, r.status, r.created_at, r.retired_at";

impl RawRole {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      role_id:          row.get(0)?,
      role_type:        row.get(1)?,
      name:             row.get(2)?,
      code:             row.get(3)?,
      hierarchy_level:  row.get(4)?,
      is_manager:       row.get(5)?,
      can_view_reports: row.get(6)?,
      description:      row.get(7)?,
      permissions:      row.get(8)?,
      status:           row.get(9)?,
      created_at:       row.get(10)?,
      retired_at:       row.get(11)?,
    })
  }

  pub fn into_role(self) -> Result<HierarchicalRole> {
    let permissions: serde_json::Value = serde_json::from_str(&self.permissions)?;
    Ok(HierarchicalRole {
      id:               decode_id(&self.role_id)?,
      role_type:        decode_enum::<RoleTypeKind>("role type", &self.role_type)?,
      name:             self.name,
      code:             self.code,
      hierarchy_level:  self.hierarchy_level,
      is_manager:       self.is_manager,
      can_view_reports: self.can_view_reports,
      description:      self.description,
      permissions:      CapabilitySet::from_json(&permissions)?,
      status:           decode_enum::<RoleStatus>("role status", &self.status)?,
      created_at:       decode_dt(&self.created_at)?,
      retired_at:       decode_opt_dt(self.retired_at.as_deref())?,
    })
  }
}

/// Raw values read from an `assignments` row.
pub struct RawAssignment {
  pub assignment_id: String,
  pub person_id:     String,
  pub scope:         String,
  pub role_id:       String,
  pub manager_id:    Option<String>,
  pub assigned_at:   String,
  pub assigned_by:   String,
  pub removed_at:    Option<String>,
  pub superseded_by: Option<String>,
}

/// Column list matching [`RawAssignment::from_row`].
pub const ASSIGNMENT_COLUMNS: &str = "assignment_id, person_id, scope, \
  role_id, manager_id, assigned_at, assigned_by, removed_at, superseded_by";

impl RawAssignment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      assignment_id: row.get(0)?,
      person_id:     row.get(1)?,
      scope:         row.get(2)?,
      role_id:       row.get(3)?,
      manager_id:    row.get(4)?,
      assigned_at:   row.get(5)?,
      assigned_by:   row.get(6)?,
      removed_at:    row.get(7)?,
      superseded_by: row.get(8)?,
    })
  }

  pub fn into_assignment(self) -> Result<Assignment> {
    Ok(Assignment {
      id:            decode_id(&self.assignment_id)?,
      person_id:     decode_id(&self.person_id)?,
      scope:         decode_scope(&self.scope)?,
      role_id:       decode_id(&self.role_id)?,
      manager_id:    decode_opt_id(self.manager_id.as_deref())?,
      assigned_at:   decode_dt(&self.assigned_at)?,
      assigned_by:   decode_id(&self.assigned_by)?,
      removed_at:    decode_opt_dt(self.removed_at.as_deref())?,
      superseded_by: decode_opt_id(self.superseded_by.as_deref())?,
    })
  }
}

/// Raw values read from a `hierarchy_change_events` row.
pub struct RawEvent {
  pub event_id:       String,
  pub person_id:      String,
  pub scope:          String,
  pub old_manager_id: Option<String>,
  pub new_manager_id: Option<String>,
  pub changed_by:     String,
  pub change_type:    String,
  pub reason:         Option<String>,
  pub created_at:     String,
}

pub const EVENT_COLUMNS: &str = "event_id, person_id, scope, old_manager_id, \
  new_manager_id, changed_by, change_type, reason, created_at";

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:       row.get(0)?,
      person_id:      row.get(1)?,
      scope:          row.get(2)?,
      old_manager_id: row.get(3)?,
      new_manager_id: row.get(4)?,
      changed_by:     row.get(5)?,
      change_type:    row.get(6)?,
      reason:         row.get(7)?,
      created_at:     row.get(8)?,
    })
  }

  pub fn into_event(self) -> Result<HierarchyChangeEvent> {
    Ok(HierarchyChangeEvent {
      id:             decode_id::<EventId>(&self.event_id)?,
      person_id:      decode_id(&self.person_id)?,
      scope:          decode_scope(&self.scope)?,
      old_manager_id: decode_opt_id(self.old_manager_id.as_deref())?,
      new_manager_id: decode_opt_id(self.new_manager_id.as_deref())?,
      changed_by:     decode_id(&self.changed_by)?,
      change_type:    decode_enum::<ChangeType>("change type", &self.change_type)?,
      reason:         self.reason,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `dashboard_access` row.
pub struct RawAccess {
  pub manager_id: String,
  pub scope:      String,
  pub flags:      DashboardFlags,
  pub updated_at: String,
}

pub const ACCESS_COLUMNS: &str = "manager_id, scope, can_view_activities, \
  can_view_events, can_view_questionnaires, can_view_notifications, \
  can_export_reports, updated_at";

impl RawAccess {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      manager_id: row.get(0)?,
      scope:      row.get(1)?,
      flags:      DashboardFlags {
        can_view_activities:     row.get(2)?,
        can_view_events:         row.get(3)?,
        can_view_questionnaires: row.get(4)?,
        can_view_notifications:  row.get(5)?,
        can_export_reports:      row.get(6)?,
      },
      updated_at: row.get(7)?,
    })
  }

  pub fn into_access(self) -> Result<DashboardAccess> {
    Ok(DashboardAccess {
      manager_id: decode_id(&self.manager_id)?,
      scope:      decode_scope(&self.scope)?,
      flags:      self.flags,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
