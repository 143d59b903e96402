//! [`SqliteStore`], the SQLite implementation of [`HierarchyStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, SubsecRound as _, Utc};
use ladder_core::{
  access::{DashboardAccess, DashboardFlags},
  assignment::{AssignManager, Assignment, Removal, Verdict},
  audit::{HierarchyChangeEvent, HistoryQuery},
  ids::{PersonId, RoleId, RoleScope},
  policy::HierarchyPolicy,
  role::{HierarchicalRole, NewRole, RoleType, RoleTypeKind},
  store::{HierarchyStore, ManagerCandidate},
  tree::{Forest, build_forest},
};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::{Error, Result, cache::TreeCache, queries, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A reporting hierarchy backed by a single SQLite file.
///
/// Cloning is cheap. The connection, policy and tree cache are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  policy: Arc<HierarchyPolicy>,
  trees:  Arc<TreeCache>,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, run schema initialisation and seed
  /// the role catalog if it is empty.
  pub async fn open(path: impl AsRef<Path>, policy: HierarchyPolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, policy).await
  }

  /// Open an in-memory store with the default policy, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(HierarchyPolicy::default()).await
  }

  pub async fn open_in_memory_with(policy: HierarchyPolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, policy).await
  }

  pub fn policy(&self) -> &HierarchyPolicy { &self.policy }

  async fn init(conn: tokio_rusqlite::Connection, policy: HierarchyPolicy) -> Result<Self> {
    let busy_timeout = Duration::from_millis(policy.busy_timeout_ms);
    conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(in_transaction(
          conn,
          TransactionBehavior::Immediate,
          queries::seed_catalog,
        ))
      })
      .await??;

    Ok(Self {
      conn,
      policy: Arc::new(policy),
      trees: Arc::new(TreeCache::default()),
    })
  }

  /// Run `body` in a deferred transaction so multi-query reads see one
  /// snapshot.
  async fn read<T, F>(&self, body: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| Ok(in_transaction(conn, TransactionBehavior::Deferred, body)))
      .await?
  }

  /// Run `body` in an immediate transaction, retrying on contention.
  ///
  /// `BEGIN IMMEDIATE` takes SQLite's write lock before anything is read, so
  /// the body always checks and writes against the latest committed state.
  /// Contention (a busy database, or a unique-index violation from a writer
  /// on another connection) re-runs the whole body, checks included.
  ///
  /// `body` is handed the commit timestamp at the precision it is stored
  /// with, so returned values compare equal to what a later read decodes.
  ///
  /// When `touches` names a scope, its cached tree is invalidated on the
  /// connection thread straight after the commit. Dropping the returned
  /// future after the body was queued cannot leave a stale tree behind.
  async fn write<T, F>(
    &self,
    op: &'static str,
    touches: Option<RoleScope>,
    body: F,
  ) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(&Connection, DateTime<Utc>) -> Result<T> + Send + Sync + 'static,
  {
    let body = Arc::new(body);
    let attempts = self.policy.max_write_attempts.max(1);
    let mut attempt = 1;

    loop {
      let body = Arc::clone(&body);
      let trees = Arc::clone(&self.trees);
      let result = self
        .conn
        .call(move |conn| {
          let result = in_transaction(conn, TransactionBehavior::Immediate, |tx| {
            (*body)(tx, Utc::now().trunc_subsecs(6))
          });
          if let (Ok(_), Some(scope)) = (&result, touches) {
            trees.invalidate(scope);
            debug!(%scope, "tree cache invalidated");
          }
          Ok(result)
        })
        .await?;

      match result {
        Err(e) if e.is_contention() && attempt < attempts => {
          warn!(op, attempt, error = %e, "write contention, retrying");
          tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
          attempt += 1;
        }
        other => return other,
      }
    }
  }

  /// Run raw SQL outside any transaction.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
    self.conn.call(move |conn| Ok(conn.execute_batch(sql)?)).await?;
    Ok(())
  }

  /// Every row a person has held in a scope, oldest first.
  #[cfg(test)]
  pub(crate) async fn assignment_chain(
    &self,
    person: PersonId,
    scope: RoleScope,
  ) -> Result<Vec<Assignment>> {
    self
      .read(move |conn| queries::assignment_chain(conn, person, scope))
      .await
  }
}

fn in_transaction<T>(
  conn: &mut Connection,
  behavior: TransactionBehavior,
  body: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(behavior)?;
  // Dropping `tx` on the error path rolls back.
  let value = body(&*tx)?;
  tx.commit()?;
  Ok(value)
}

// ─── HierarchyStore impl ─────────────────────────────────────────────────────

impl HierarchyStore for SqliteStore {
  type Error = Error;

  // ── Role catalog ──────────────────────────────────────────────────────────

  async fn role_types(&self) -> Result<Vec<RoleType>> {
    self.read(queries::role_types).await
  }

  async fn list_roles(&self, kind: Option<RoleTypeKind>) -> Result<Vec<HierarchicalRole>> {
    self.read(move |conn| queries::list_roles(conn, kind)).await
  }

  async fn get_role(&self, id: RoleId) -> Result<Option<HierarchicalRole>> {
    self.read(move |conn| queries::load_role(conn, id)).await
  }

  async fn create_role(&self, input: NewRole) -> Result<HierarchicalRole> {
    let role = self
      .write("create_role", None, move |conn, now| {
        queries::insert_role(conn, &input, now)
      })
      .await?;
    info!(role = %role.id, code = %role.code, kind = %role.role_type, "role created");
    Ok(role)
  }

  async fn retire_role(&self, id: RoleId) -> Result<HierarchicalRole> {
    let role = self
      .write("retire_role", None, move |conn, now| {
        queries::retire_role(conn, id, now)
      })
      .await?;
    info!(role = %role.id, code = %role.code, "role retired");
    Ok(role)
  }

  // ── Assignment writes ──────────────────────────────────────────────────

  async fn assign_manager(&self, input: AssignManager) -> Result<Assignment> {
    let scope = input.scope;
    let policy = Arc::clone(&self.policy);

    let (assignment, event) = self
      .write("assign_manager", Some(scope), move |conn, now| {
        let previous = queries::check_assignment(conn, &input, &policy)?;
        queries::apply_assignment(conn, &input, previous.as_ref(), now)
      })
      .await?;

    info!(
      person = %assignment.person_id,
      %scope,
      manager = ?assignment.manager_id,
      change = %event.change_type,
      "assignment committed"
    );
    Ok(assignment)
  }

  async fn remove_manager(&self, input: Removal) -> Result<Assignment> {
    let scope = input.scope;

    let (assignment, event) = self
      .write("remove_manager", Some(scope), move |conn, now| {
        queries::remove_manager(conn, &input, now)
      })
      .await?;

    info!(
      person = %assignment.person_id,
      %scope,
      old_manager = ?event.old_manager_id,
      "manager removed"
    );
    Ok(assignment)
  }

  async fn release_person(&self, input: Removal) -> Result<HierarchyChangeEvent> {
    let scope = input.scope;

    let event = self
      .write("release_person", Some(scope), move |conn, now| {
        queries::release_person(conn, &input, now)
      })
      .await?;

    info!(person = %event.person_id, %scope, "person released from scope");
    Ok(event)
  }

  async fn validate_assignment(&self, input: AssignManager) -> Result<Verdict> {
    let policy = Arc::clone(&self.policy);
    let checked = self
      .read(move |conn| queries::check_assignment(conn, &input, &policy).map(|_| ()))
      .await;

    match checked {
      Ok(()) => Ok(Verdict::Accepted),
      Err(Error::Core(rejection)) => Ok(Verdict::Rejected(rejection)),
      Err(e) => Err(e),
    }
  }

  // ── Assignment reads ───────────────────────────────────────────────────

  async fn get_assignment(
    &self,
    person: PersonId,
    scope: RoleScope,
  ) -> Result<Option<Assignment>> {
    self
      .read(move |conn| queries::active_assignment(conn, person, scope))
      .await
  }

  async fn list_assignments(&self, scope: RoleScope) -> Result<Vec<Assignment>> {
    self
      .read(move |conn| queries::scope_assignments(conn, scope))
      .await
  }

  async fn available_managers(&self, scope: RoleScope) -> Result<Vec<ManagerCandidate>> {
    self
      .read(move |conn| queries::available_managers(conn, scope))
      .await
  }

  // ── Tree ──────────────────────────────────────────────────────────────────

  async fn build_tree(&self, scope: RoleScope) -> Result<Arc<Forest>> {
    let (generation, cached) = self.trees.get(scope);
    if let Some(forest) = cached {
      debug!(%scope, "tree cache hit");
      return Ok(forest);
    }

    let (rows, roles) = self
      .read(move |conn| {
        Ok((queries::scope_assignments(conn, scope)?, queries::role_map(conn)?))
      })
      .await?;

    let forest = Arc::new(build_forest(scope, &rows, &roles));
    if self.trees.put(scope, generation, Arc::clone(&forest)) {
      debug!(%scope, nodes = rows.len(), "tree cached");
    }
    Ok(forest)
  }

  // ── Dashboard access ──────────────────────────────────────────────────────

  async fn set_dashboard_access(
    &self,
    manager: PersonId,
    scope: RoleScope,
    flags: DashboardFlags,
  ) -> Result<DashboardAccess> {
    let access = self
      .write("set_dashboard_access", None, move |conn, now| {
        queries::upsert_access(conn, manager, scope, flags, now)
      })
      .await?;
    info!(%manager, %scope, "dashboard access updated");
    Ok(access)
  }

  async fn get_dashboard_access(
    &self,
    manager: PersonId,
    scope: RoleScope,
  ) -> Result<Option<DashboardAccess>> {
    self
      .read(move |conn| queries::get_access(conn, manager, scope))
      .await
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn history(&self, query: HistoryQuery) -> Result<Vec<HierarchyChangeEvent>> {
    self.read(move |conn| queries::history(conn, &query)).await
  }
}
