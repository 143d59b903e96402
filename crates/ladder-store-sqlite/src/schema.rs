//! SQL schema for the ladder SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.
//!
//! Scopes are stored as text: the literal `system` or the scope's UUID.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS role_types (
    role_type_id TEXT PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE CHECK (name IN ('system', 'scope')),
    description  TEXT
);

CREATE TABLE IF NOT EXISTS hierarchical_roles (
    role_id          TEXT PRIMARY KEY,
    role_type_id     TEXT NOT NULL REFERENCES role_types(role_type_id),
    name             TEXT NOT NULL,
    code             TEXT NOT NULL,
    hierarchy_level  INTEGER NOT NULL,
    is_manager       INTEGER NOT NULL DEFAULT 0,
    can_view_reports INTEGER NOT NULL DEFAULT 0,
    description      TEXT,
    permissions      TEXT NOT NULL DEFAULT '[]',   -- JSON array of capability tags
    status           TEXT NOT NULL DEFAULT 'active',
    created_at       TEXT NOT NULL,
    retired_at       TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS roles_live_code_idx
    ON hierarchical_roles(role_type_id, code) WHERE retired_at IS NULL;

-- Rows are never updated except to set the tombstone columns.
CREATE TABLE IF NOT EXISTS assignments (
    assignment_id TEXT PRIMARY KEY,
    person_id     TEXT NOT NULL,
    scope         TEXT NOT NULL,
    role_id       TEXT NOT NULL REFERENCES hierarchical_roles(role_id),
    manager_id    TEXT,
    assigned_at   TEXT NOT NULL,
    assigned_by   TEXT NOT NULL,
    removed_at    TEXT,
    superseded_by TEXT REFERENCES assignments(assignment_id)
                       DEFERRABLE INITIALLY DEFERRED,
    CHECK (manager_id IS NULL OR manager_id != person_id)
);

-- One active assignment per person per scope.
CREATE UNIQUE INDEX IF NOT EXISTS assignments_active_idx
    ON assignments(person_id, scope) WHERE removed_at IS NULL;

CREATE INDEX IF NOT EXISTS assignments_scope_idx
    ON assignments(scope) WHERE removed_at IS NULL;

CREATE TABLE IF NOT EXISTS dashboard_access (
    manager_id              TEXT NOT NULL,
    scope                   TEXT NOT NULL,
    can_view_activities     INTEGER NOT NULL DEFAULT 0,
    can_view_events         INTEGER NOT NULL DEFAULT 0,
    can_view_questionnaires INTEGER NOT NULL DEFAULT 0,
    can_view_notifications  INTEGER NOT NULL DEFAULT 0,
    can_export_reports      INTEGER NOT NULL DEFAULT 0,
    updated_at              TEXT NOT NULL,
    PRIMARY KEY (manager_id, scope)
);

-- Strictly append-only.
CREATE TABLE IF NOT EXISTS hierarchy_change_events (
    event_id       TEXT PRIMARY KEY,
    person_id      TEXT NOT NULL,
    scope          TEXT NOT NULL,
    old_manager_id TEXT,
    new_manager_id TEXT,
    changed_by     TEXT NOT NULL,
    change_type    TEXT NOT NULL
                   CHECK (change_type IN ('assigned', 'reassigned', 'removed')),
    reason         TEXT,
    created_at     TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS hierarchy_change_events_no_update
    BEFORE UPDATE ON hierarchy_change_events
BEGIN
    SELECT RAISE(ABORT, 'hierarchy_change_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS hierarchy_change_events_no_delete
    BEFORE DELETE ON hierarchy_change_events
BEGIN
    SELECT RAISE(ABORT, 'hierarchy_change_events is append-only');
END;

CREATE INDEX IF NOT EXISTS events_person_idx  ON hierarchy_change_events(person_id);
CREATE INDEX IF NOT EXISTS events_scope_idx   ON hierarchy_change_events(scope);
CREATE INDEX IF NOT EXISTS events_created_idx ON hierarchy_change_events(created_at);

PRAGMA user_version = 1;
";
