//! The `HierarchyStore` trait.
//!
//! Implemented by storage backends (e.g. `ladder-store-sqlite`). The API
//! layer depends on this abstraction, not on any concrete backend.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
  Classify,
  access::{DashboardAccess, DashboardCapability, DashboardFlags},
  assignment::{AssignManager, Assignment, Removal, Verdict},
  audit::{HierarchyChangeEvent, HistoryQuery},
  ids::{PersonId, RoleId, RoleScope},
  role::{HierarchicalRole, NewRole, RoleType, RoleTypeKind},
  tree::{Forest, RoleInfo, TeamStatistics},
};

/// A scope member eligible to be chosen as someone's manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerCandidate {
  pub person_id: PersonId,
  pub role:      RoleInfo,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a reporting hierarchy backend.
///
/// Every mutating assignment operation runs the cycle guard against committed
/// state and appends exactly one [`HierarchyChangeEvent`] in the same
/// transaction as the assignment change.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait HierarchyStore: Send + Sync {
  type Error: std::error::Error
    + Classify
    + From<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Role catalog ──────────────────────────────────────────────────────

  fn role_types(
    &self,
  ) -> impl Future<Output = Result<Vec<RoleType>, Self::Error>> + Send + '_;

  /// Non-retired roles, ordered by hierarchy level then code.
  fn list_roles(
    &self,
    kind: Option<RoleTypeKind>,
  ) -> impl Future<Output = Result<Vec<HierarchicalRole>, Self::Error>> + Send + '_;

  /// Retrieve a role by id, retired or not.
  fn get_role(
    &self,
    id: RoleId,
  ) -> impl Future<Output = Result<Option<HierarchicalRole>, Self::Error>>
  + Send
  + '_;

  /// Fails with `DuplicateRoleCode` if a non-retired role of the same type
  /// already uses the code.
  fn create_role(
    &self,
    input: NewRole,
  ) -> impl Future<Output = Result<HierarchicalRole, Self::Error>> + Send + '_;

  /// Soft-delete a role. Existing assignments keep pointing at it; new ones
  /// are rejected.
  fn retire_role(
    &self,
    id: RoleId,
  ) -> impl Future<Output = Result<HierarchicalRole, Self::Error>> + Send + '_;

  // ── Assignment writes ──────────────────────────────────────────────

  /// Grant or change a person's manager in a scope. Returns the new active
  /// row.
  fn assign_manager(
    &self,
    input: AssignManager,
  ) -> impl Future<Output = Result<Assignment, Self::Error>> + Send + '_;

  /// Clear a person's manager, keeping them in the scope as a root. Returns
  /// the successor row.
  ///
  /// Fails with a not-found error, and writes nothing, when the person has
  /// no active assignment or already has no manager.
  fn remove_manager(
    &self,
    input: Removal,
  ) -> impl Future<Output = Result<Assignment, Self::Error>> + Send + '_;

  /// Remove a person from a scope altogether. Anyone still reporting to them
  /// becomes an orphaned root.
  fn release_person(
    &self,
    input: Removal,
  ) -> impl Future<Output = Result<HierarchyChangeEvent, Self::Error>> + Send + '_;

  /// Run every check `assign_manager` would run, without writing.
  ///
  /// Rule violations come back as [`Verdict::Rejected`]; the outer error is
  /// reserved for storage failures.
  fn validate_assignment(
    &self,
    input: AssignManager,
  ) -> impl Future<Output = Result<Verdict, Self::Error>> + Send + '_;

  // ── Assignment reads ───────────────────────────────────────────────

  /// The person's active assignment in the scope, if any.
  fn get_assignment(
    &self,
    person: PersonId,
    scope: RoleScope,
  ) -> impl Future<Output = Result<Option<Assignment>, Self::Error>> + Send + '_;

  /// All active assignments in the scope.
  fn list_assignments(
    &self,
    scope: RoleScope,
  ) -> impl Future<Output = Result<Vec<Assignment>, Self::Error>> + Send + '_;

  /// Members whose role is a manager role, ordered by hierarchy level.
  fn available_managers(
    &self,
    scope: RoleScope,
  ) -> impl Future<Output = Result<Vec<ManagerCandidate>, Self::Error>> + Send + '_;

  // ── Tree ──────────────────────────────────────────────────────────────

  /// The scope's reporting forest. Backends may serve this from a cache that
  /// is invalidated on every committed write to the scope.
  fn build_tree(
    &self,
    scope: RoleScope,
  ) -> impl Future<Output = Result<Arc<Forest>, Self::Error>> + Send + '_;

  /// Everyone transitively below `manager` in the scope. Empty when the
  /// person holds no manager role there.
  fn compute_visible_set(
    &self,
    manager: PersonId,
    scope: RoleScope,
  ) -> impl Future<Output = Result<BTreeSet<PersonId>, Self::Error>> + Send + '_
  {
    async move { Ok(self.build_tree(scope).await?.visible_set(manager)) }
  }

  /// `None` when the person is not a member of the scope.
  fn team_statistics(
    &self,
    manager: PersonId,
    scope: RoleScope,
  ) -> impl Future<Output = Result<Option<TeamStatistics>, Self::Error>> + Send + '_
  {
    async move { Ok(self.build_tree(scope).await?.team_statistics(manager)) }
  }

  // ── Dashboard access ──────────────────────────────────────────────────

  /// Insert or replace the access row for `(manager, scope)`.
  fn set_dashboard_access(
    &self,
    manager: PersonId,
    scope: RoleScope,
    flags: DashboardFlags,
  ) -> impl Future<Output = Result<DashboardAccess, Self::Error>> + Send + '_;

  fn get_dashboard_access(
    &self,
    manager: PersonId,
    scope: RoleScope,
  ) -> impl Future<Output = Result<Option<DashboardAccess>, Self::Error>> + Send + '_;

  /// Default-deny: `false` when no access row exists.
  fn can_view(
    &self,
    manager: PersonId,
    scope: RoleScope,
    capability: DashboardCapability,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_ {
    async move {
      let access = self.get_dashboard_access(manager, scope).await?;
      Ok(crate::access::can_view(access.as_ref(), capability))
    }
  }

  /// Like [`can_view`](Self::can_view), but a deny is an error.
  fn authorize(
    &self,
    manager: PersonId,
    scope: RoleScope,
    capability: DashboardCapability,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    async move {
      if self.can_view(manager, scope, capability).await? {
        Ok(())
      } else {
        Err(crate::Error::PermissionDenied { manager, capability }.into())
      }
    }
  }

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Change events matching `query`, newest first.
  fn history(
    &self,
    query: HistoryQuery,
  ) -> impl Future<Output = Result<Vec<HierarchyChangeEvent>, Self::Error>> + Send + '_;
}
