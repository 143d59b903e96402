//! Synchronous query and write bodies.
//!
//! Everything here runs on the `tokio_rusqlite` connection thread, usually
//! inside a transaction opened by the store. A `Transaction` derefs to a
//! `Connection`, so these take `&Connection` and leave commit to the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ladder_core::{
  access::{DashboardAccess, DashboardFlags},
  assignment::{AssignManager, Assignment, Removal},
  audit::{ChangeType, HierarchyChangeEvent, HistoryQuery},
  graph::{Member, ReportingGraph},
  ids::{AssignmentId, EventId, PersonId, RoleId, RoleScope},
  policy::HierarchyPolicy,
  role::{HierarchicalRole, NewRole, RoleStatus, RoleType, RoleTypeKind},
  store::ManagerCandidate,
  tree::RoleInfo,
};
use rusqlite::{Connection, OptionalExtension as _, params, types::Value};

use crate::{
  Result,
  encode::{
    ACCESS_COLUMNS, ASSIGNMENT_COLUMNS, EVENT_COLUMNS, ROLE_COLUMNS, RawAccess,
    RawAssignment, RawEvent, RawRole, decode_id, encode_dt, encode_dt_ceil,
    encode_id, encode_scope,
  },
};

// ─── Role catalog ────────────────────────────────────────────────────────────

/// Insert the two role types and the seed roles into an empty catalog.
pub fn seed_catalog(conn: &Connection) -> Result<()> {
  let seeded: bool = conn
    .query_row("SELECT EXISTS (SELECT 1 FROM role_types)", [], |r| r.get(0))?;
  if seeded {
    return Ok(());
  }

  for (kind, description) in [
    (RoleTypeKind::System, "System-wide roles"),
    (RoleTypeKind::Scope, "Roles held within a single program"),
  ] {
    conn.execute(
      "INSERT INTO role_types (role_type_id, name, description) VALUES (?1, ?2, ?3)",
      params![encode_id(uuid::Uuid::new_v4()), kind.to_string(), description],
    )?;
  }

  for role in ladder_core::role::seed_roles() {
    insert_role(conn, &role, Utc::now())?;
  }
  Ok(())
}

pub fn role_types(conn: &Connection) -> Result<Vec<RoleType>> {
  let mut stmt = conn.prepare(
    "SELECT role_type_id, name, description FROM role_types ORDER BY name DESC",
  )?;
  let raws = stmt
    .query_map([], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws
    .into_iter()
    .map(|(id, name, description)| {
      Ok(RoleType {
        id: decode_id(&id)?,
        kind: name
          .parse()
          .map_err(|_| crate::Error::Decode(format!("unknown role type: {name:?}")))?,
        description,
      })
    })
    .collect()
}

fn role_type_id(conn: &Connection, kind: RoleTypeKind) -> Result<String> {
  Ok(conn.query_row(
    "SELECT role_type_id FROM role_types WHERE name = ?1",
    params![kind.to_string()],
    |r| r.get(0),
  )?)
}

pub fn load_role(conn: &Connection, id: RoleId) -> Result<Option<HierarchicalRole>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {ROLE_COLUMNS} FROM hierarchical_roles r
         JOIN role_types t ON t.role_type_id = r.role_type_id
         WHERE r.role_id = ?1"
      ),
      params![encode_id(id)],
      RawRole::from_row,
    )
    .optional()?;
  raw.map(RawRole::into_role).transpose()
}

/// Non-retired roles, optionally of one kind.
pub fn list_roles(
  conn: &Connection,
  kind: Option<RoleTypeKind>,
) -> Result<Vec<HierarchicalRole>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ROLE_COLUMNS} FROM hierarchical_roles r
     JOIN role_types t ON t.role_type_id = r.role_type_id
     WHERE r.retired_at IS NULL AND (?1 IS NULL OR t.name = ?1)
     ORDER BY r.hierarchy_level, r.code"
  ))?;
  let raws = stmt
    .query_map(params![kind.map(|k| k.to_string())], RawRole::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRole::into_role).collect()
}

/// Every role ever created, keyed by id. Assignments may still point at
/// retired roles, so the tree builder needs all of them.
pub fn role_map(conn: &Connection) -> Result<HashMap<RoleId, HierarchicalRole>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ROLE_COLUMNS} FROM hierarchical_roles r
     JOIN role_types t ON t.role_type_id = r.role_type_id"
  ))?;
  let raws = stmt
    .query_map([], RawRole::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws
    .into_iter()
    .map(|raw| raw.into_role().map(|role| (role.id, role)))
    .collect()
}

pub fn insert_role(
  conn: &Connection,
  input: &NewRole,
  now: DateTime<Utc>,
) -> Result<HierarchicalRole> {
  let type_id = role_type_id(conn, input.role_type)?;

  let taken: bool = conn.query_row(
    "SELECT EXISTS (
       SELECT 1 FROM hierarchical_roles
       WHERE role_type_id = ?1 AND code = ?2 AND retired_at IS NULL
     )",
    params![type_id, input.code],
    |r| r.get(0),
  )?;
  if taken {
    return Err(ladder_core::Error::DuplicateRoleCode(input.code.clone()).into());
  }

  let role = HierarchicalRole {
    id:               RoleId::random(),
    role_type:        input.role_type,
    name:             input.name.clone(),
    code:             input.code.clone(),
    hierarchy_level:  input.hierarchy_level,
    is_manager:       input.is_manager,
    can_view_reports: input.can_view_reports,
    description:      input.description.clone(),
    permissions:      input.permissions.clone(),
    status:           RoleStatus::Active,
    created_at:       now,
    retired_at:       None,
  };

  conn.execute(
    "INSERT INTO hierarchical_roles (
       role_id, role_type_id, name, code, hierarchy_level, is_manager,
       can_view_reports, description, permissions, status, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    params![
      encode_id(role.id),
      type_id,
      role.name,
      role.code,
      role.hierarchy_level,
      role.is_manager,
      role.can_view_reports,
      role.description,
      role.permissions.to_json().to_string(),
      role.status.to_string(),
      encode_dt(role.created_at),
    ],
  )?;
  Ok(role)
}

pub fn retire_role(
  conn: &Connection,
  id: RoleId,
  now: DateTime<Utc>,
) -> Result<HierarchicalRole> {
  conn.execute(
    "UPDATE hierarchical_roles SET status = 'inactive', retired_at = ?2
     WHERE role_id = ?1 AND retired_at IS NULL",
    params![encode_id(id), encode_dt(now)],
  )?;
  load_role(conn, id)?.ok_or_else(|| ladder_core::Error::RoleNotFound(id).into())
}

// ─── Assignments ─────────────────────────────────────────────────────────────

pub fn active_assignment(
  conn: &Connection,
  person: PersonId,
  scope: RoleScope,
) -> Result<Option<Assignment>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
         WHERE person_id = ?1 AND scope = ?2 AND removed_at IS NULL"
      ),
      params![encode_id(person), encode_scope(scope)],
      RawAssignment::from_row,
    )
    .optional()?;
  raw.map(RawAssignment::into_assignment).transpose()
}

pub fn scope_assignments(conn: &Connection, scope: RoleScope) -> Result<Vec<Assignment>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
     WHERE scope = ?1 AND removed_at IS NULL
     ORDER BY assigned_at"
  ))?;
  let raws = stmt
    .query_map(params![encode_scope(scope)], RawAssignment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAssignment::into_assignment).collect()
}

/// Every assignment row a person has ever held in a scope, oldest first.
#[cfg(test)]
pub fn assignment_chain(
  conn: &Connection,
  person: PersonId,
  scope: RoleScope,
) -> Result<Vec<Assignment>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
     WHERE person_id = ?1 AND scope = ?2
     ORDER BY assigned_at, rowid"
  ))?;
  let raws = stmt
    .query_map(params![encode_id(person), encode_scope(scope)], RawAssignment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAssignment::into_assignment).collect()
}

/// Snapshot of the scope's active edges for the cycle guard.
pub fn load_graph(conn: &Connection, scope: RoleScope) -> Result<ReportingGraph> {
  let mut stmt = conn.prepare(
    "SELECT a.person_id, a.manager_id, r.is_manager
     FROM assignments a
     JOIN hierarchical_roles r ON r.role_id = a.role_id
     WHERE a.scope = ?1 AND a.removed_at IS NULL",
  )?;
  let rows = stmt
    .query_map(params![encode_scope(scope)], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, Option<String>>(1)?,
        row.get::<_, bool>(2)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut graph = ReportingGraph::new(scope);
  for (person, manager, is_manager) in rows {
    graph.insert(decode_id(&person)?, Member {
      manager_id: crate::encode::decode_opt_id(manager.as_deref())?,
      is_manager,
    });
  }
  Ok(graph)
}

pub fn available_managers(
  conn: &Connection,
  scope: RoleScope,
) -> Result<Vec<ManagerCandidate>> {
  let roles = role_map(conn)?;
  let mut candidates: Vec<ManagerCandidate> = scope_assignments(conn, scope)?
    .into_iter()
    .filter_map(|a| {
      let role = roles.get(&a.role_id).filter(|r| r.is_manager)?;
      Some(ManagerCandidate { person_id: a.person_id, role: RoleInfo::from(role) })
    })
    .collect();
  candidates.sort_by_key(|c| (c.role.hierarchy_level, c.person_id));
  Ok(candidates)
}

/// Everything `assign_manager` checks before writing, in order: the
/// caller's precondition, the role, then the cycle guard and policy.
///
/// Returns the active row being replaced, if any.
pub fn check_assignment(
  conn: &Connection,
  input: &AssignManager,
  policy: &HierarchyPolicy,
) -> Result<Option<Assignment>> {
  let current = active_assignment(conn, input.person_id, input.scope)?;
  if !input.precondition.holds(current.as_ref()) {
    return Err(
      ladder_core::Error::PreconditionFailed {
        person: input.person_id,
        scope:  input.scope,
      }
      .into(),
    );
  }

  let role = load_role(conn, input.role_id)?
    .ok_or(ladder_core::Error::RoleNotFound(input.role_id))?;
  role.check_assignable_in(&input.scope)?;

  let graph = load_graph(conn, input.scope)?;
  graph.check_edge(input.person_id, input.manager_id, policy)?;

  Ok(current)
}

/// Tombstone `previous` and insert its successor. `superseded_by` is `None`
/// when the person is leaving the scope.
fn tombstone(
  conn: &Connection,
  previous: &Assignment,
  superseded_by: Option<AssignmentId>,
  now: DateTime<Utc>,
) -> Result<()> {
  let changed = conn.execute(
    "UPDATE assignments SET removed_at = ?2, superseded_by = ?3
     WHERE assignment_id = ?1 AND removed_at IS NULL",
    params![encode_id(previous.id), encode_dt(now), superseded_by.map(encode_id)],
  )?;
  if changed != 1 {
    return Err(
      ladder_core::Error::PreconditionFailed {
        person: previous.person_id,
        scope:  previous.scope,
      }
      .into(),
    );
  }
  Ok(())
}

fn insert_assignment(conn: &Connection, a: &Assignment) -> Result<()> {
  conn.execute(
    "INSERT INTO assignments (
       assignment_id, person_id, scope, role_id, manager_id, assigned_at, assigned_by
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      encode_id(a.id),
      encode_id(a.person_id),
      encode_scope(a.scope),
      encode_id(a.role_id),
      a.manager_id.map(encode_id),
      encode_dt(a.assigned_at),
      encode_id(a.assigned_by),
    ],
  )?;
  Ok(())
}

/// Write a checked assignment and its audit event.
pub fn apply_assignment(
  conn: &Connection,
  input: &AssignManager,
  previous: Option<&Assignment>,
  now: DateTime<Utc>,
) -> Result<(Assignment, HierarchyChangeEvent)> {
  let next = Assignment {
    id:            AssignmentId::random(),
    person_id:     input.person_id,
    scope:         input.scope,
    role_id:       input.role_id,
    manager_id:    input.manager_id,
    assigned_at:   now,
    assigned_by:   input.actor,
    removed_at:    None,
    superseded_by: None,
  };

  if let Some(previous) = previous {
    tombstone(conn, previous, Some(next.id), now)?;
  }
  insert_assignment(conn, &next)?;

  let event = HierarchyChangeEvent {
    id:             EventId::random(),
    person_id:      input.person_id,
    scope:          input.scope,
    old_manager_id: previous.and_then(|p| p.manager_id),
    new_manager_id: input.manager_id,
    changed_by:     input.actor,
    change_type:    ChangeType::for_write(previous),
    reason:         input.reason.clone(),
    created_at:     now,
  };
  insert_event(conn, &event)?;

  Ok((next, event))
}

/// Clear the manager, keeping the person in the scope as a root.
pub fn remove_manager(
  conn: &Connection,
  input: &Removal,
  now: DateTime<Utc>,
) -> Result<(Assignment, HierarchyChangeEvent)> {
  let current = active_assignment(conn, input.person_id, input.scope)?.ok_or(
    ladder_core::Error::AssignmentNotFound {
      person: input.person_id,
      scope:  input.scope,
    },
  )?;
  let Some(old_manager) = current.manager_id else {
    return Err(
      ladder_core::Error::NoActiveManager {
        person: input.person_id,
        scope:  input.scope,
      }
      .into(),
    );
  };

  let next = Assignment {
    id: AssignmentId::random(),
    manager_id: None,
    assigned_at: now,
    assigned_by: input.actor,
    removed_at: None,
    superseded_by: None,
    ..current.clone()
  };
  tombstone(conn, &current, Some(next.id), now)?;
  insert_assignment(conn, &next)?;

  let event = removal_event(input, Some(old_manager), now);
  insert_event(conn, &event)?;
  Ok((next, event))
}

/// Remove the person from the scope without a successor row.
pub fn release_person(
  conn: &Connection,
  input: &Removal,
  now: DateTime<Utc>,
) -> Result<HierarchyChangeEvent> {
  let current = active_assignment(conn, input.person_id, input.scope)?.ok_or(
    ladder_core::Error::AssignmentNotFound {
      person: input.person_id,
      scope:  input.scope,
    },
  )?;
  tombstone(conn, &current, None, now)?;

  let event = removal_event(input, current.manager_id, now);
  insert_event(conn, &event)?;
  Ok(event)
}

fn removal_event(
  input: &Removal,
  old_manager_id: Option<PersonId>,
  now: DateTime<Utc>,
) -> HierarchyChangeEvent {
  HierarchyChangeEvent {
    id: EventId::random(),
    person_id: input.person_id,
    scope: input.scope,
    old_manager_id,
    new_manager_id: None,
    changed_by: input.actor,
    change_type: ChangeType::Removed,
    reason: input.reason.clone(),
    created_at: now,
  }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

fn insert_event(conn: &Connection, e: &HierarchyChangeEvent) -> Result<()> {
  conn.execute(
    "INSERT INTO hierarchy_change_events (
       event_id, person_id, scope, old_manager_id, new_manager_id,
       changed_by, change_type, reason, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    params![
      encode_id(e.id),
      encode_id(e.person_id),
      encode_scope(e.scope),
      e.old_manager_id.map(encode_id),
      e.new_manager_id.map(encode_id),
      encode_id(e.changed_by),
      e.change_type.to_string(),
      e.reason,
      encode_dt(e.created_at),
    ],
  )?;
  Ok(())
}

pub fn history(conn: &Connection, query: &HistoryQuery) -> Result<Vec<HierarchyChangeEvent>> {
  let mut conds: Vec<&'static str> = Vec::new();
  let mut args: Vec<Value> = Vec::new();

  if let Some(person) = query.person_id {
    conds.push("person_id = ?");
    args.push(Value::Text(encode_id(person)));
  }
  if let Some(scope) = query.scope {
    conds.push("scope = ?");
    args.push(Value::Text(encode_scope(scope)));
  }
  if let Some(change_type) = query.change_type {
    conds.push("change_type = ?");
    args.push(Value::Text(change_type.to_string()));
  }
  if let Some(since) = query.since {
    conds.push("created_at >= ?");
    args.push(Value::Text(encode_dt_ceil(since)));
  }
  if let Some(until) = query.until {
    conds.push("created_at <= ?");
    args.push(Value::Text(encode_dt(until)));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };

  let limit = query.limit.unwrap_or(HistoryQuery::DEFAULT_LIMIT);
  args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
  args.push(Value::Integer(
    i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX),
  ));

  let mut stmt = conn.prepare(&format!(
    "SELECT {EVENT_COLUMNS} FROM hierarchy_change_events
     {where_clause}
     ORDER BY created_at DESC, rowid DESC
     LIMIT ? OFFSET ?"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params_from_iter(args), RawEvent::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEvent::into_event).collect()
}

// ─── Dashboard access ────────────────────────────────────────────────────────

pub fn get_access(
  conn: &Connection,
  manager: PersonId,
  scope: RoleScope,
) -> Result<Option<DashboardAccess>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {ACCESS_COLUMNS} FROM dashboard_access
         WHERE manager_id = ?1 AND scope = ?2"
      ),
      params![encode_id(manager), encode_scope(scope)],
      RawAccess::from_row,
    )
    .optional()?;
  raw.map(RawAccess::into_access).transpose()
}

pub fn upsert_access(
  conn: &Connection,
  manager: PersonId,
  scope: RoleScope,
  flags: DashboardFlags,
  now: DateTime<Utc>,
) -> Result<DashboardAccess> {
  conn.execute(
    "INSERT INTO dashboard_access (
       manager_id, scope, can_view_activities, can_view_events,
       can_view_questionnaires, can_view_notifications, can_export_reports,
       updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT (manager_id, scope) DO UPDATE SET
       can_view_activities     = excluded.can_view_activities,
       can_view_events         = excluded.can_view_events,
       can_view_questionnaires = excluded.can_view_questionnaires,
       can_view_notifications  = excluded.can_view_notifications,
       can_export_reports      = excluded.can_export_reports,
       updated_at              = excluded.updated_at",
    params![
      encode_id(manager),
      encode_scope(scope),
      flags.can_view_activities,
      flags.can_view_events,
      flags.can_view_questionnaires,
      flags.can_view_notifications,
      flags.can_export_reports,
      encode_dt(now),
    ],
  )?;
  Ok(DashboardAccess { manager_id: manager, scope, flags, updated_at: now })
}
