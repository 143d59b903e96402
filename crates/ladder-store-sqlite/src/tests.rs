//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;

use ladder_core::{
  Classify, ErrorKind,
  access::{DashboardCapability, DashboardFlags},
  assignment::{AssignManager, Assignment, Precondition, Removal},
  audit::{ChangeType, HistoryQuery},
  graph::{Member, ReportingGraph},
  ids::{PersonId, RoleId, RoleScope, ScopeId},
  policy::HierarchyPolicy,
  role::{NewRole, RoleTypeKind},
  store::HierarchyStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

fn person(n: u128) -> PersonId { PersonId(Uuid::from_u128(n)) }

const ADMIN: u128 = 1000;

/// A store with one program scope and the seeded role ids looked up.
struct Org {
  store:   SqliteStore,
  scope:   RoleScope,
  manager: RoleId,
  staff:   RoleId,
}

async fn org() -> Org { org_with(HierarchyPolicy::default()).await }

async fn org_with(policy: HierarchyPolicy) -> Org {
  let store = SqliteStore::open_in_memory_with(policy)
    .await
    .expect("in-memory store");
  let roles = store.list_roles(Some(RoleTypeKind::Scope)).await.unwrap();
  let code = |c: &str| roles.iter().find(|r| r.code == c).unwrap().id;
  Org {
    manager: code("manager_l1"),
    staff: code("staff"),
    scope: RoleScope::Scoped(ScopeId::random()),
    store,
  }
}

impl Org {
  fn request(&self, p: u128, m: Option<u128>, role: RoleId) -> AssignManager {
    AssignManager::new(person(p), self.scope, role, m.map(person), person(ADMIN))
  }

  async fn manager(&self, p: u128, m: Option<u128>) -> Result<Assignment, Error> {
    self.store.assign_manager(self.request(p, m, self.manager)).await
  }

  async fn staff(&self, p: u128, m: Option<u128>) -> Result<Assignment, Error> {
    self.store.assign_manager(self.request(p, m, self.staff)).await
  }

  async fn remove(&self, p: u128) -> Result<Assignment, Error> {
    self
      .store
      .remove_manager(Removal::new(person(p), self.scope, person(ADMIN)))
      .await
  }

  async fn release(&self, p: u128) -> Result<(), Error> {
    self
      .store
      .release_person(Removal::new(person(p), self.scope, person(ADMIN)))
      .await
      .map(|_| ())
  }

  async fn events_for(&self, p: u128) -> usize {
    let query = HistoryQuery {
      limit: Some(10_000),
      ..HistoryQuery::for_person(person(p))
    };
    self.store.history(query).await.unwrap().len()
  }

  async fn active_count(&self, p: u128) -> usize {
    self
      .store
      .list_assignments(self.scope)
      .await
      .unwrap()
      .iter()
      .filter(|a| a.person_id == person(p))
      .count()
  }
}

const A: u128 = 1;
const B: u128 = 2;
const C: u128 = 3;
const D: u128 = 4;

// ─── Role catalog ────────────────────────────────────────────────────────────

#[tokio::test]
async fn catalog_is_seeded() {
  let s = SqliteStore::open_in_memory().await.unwrap();

  let types = s.role_types().await.unwrap();
  assert_eq!(types.len(), 2);

  assert_eq!(s.list_roles(None).await.unwrap().len(), 7);
  let system = s.list_roles(Some(RoleTypeKind::System)).await.unwrap();
  let codes: BTreeSet<_> = system.iter().map(|r| r.code.as_str()).collect();
  assert_eq!(codes, BTreeSet::from(["admin", "super_admin"]));
}

fn custom_role(code: &str) -> NewRole {
  NewRole {
    role_type:        RoleTypeKind::Scope,
    name:             "Coordinator".into(),
    code:             code.into(),
    hierarchy_level:  4,
    is_manager:       true,
    can_view_reports: false,
    description:      None,
    permissions:      Default::default(),
  }
}

#[tokio::test]
async fn duplicate_role_code_rejected_until_retired() {
  let o = org().await;

  let role = o.store.create_role(custom_role("coordinator")).await.unwrap();
  let err = o.store.create_role(custom_role("coordinator")).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(ladder_core::Error::DuplicateRoleCode(ref c)) if c == "coordinator"
  ));

  o.store.retire_role(role.id).await.unwrap();
  o.store.create_role(custom_role("coordinator")).await.unwrap();
}

#[tokio::test]
async fn retired_role_cannot_be_assigned() {
  let o = org().await;
  let role = o.store.create_role(custom_role("coordinator")).await.unwrap();
  let retired = o.store.retire_role(role.id).await.unwrap();
  assert!(retired.retired_at.is_some());
  assert!(o.store.get_role(role.id).await.unwrap().is_some());

  let err = o
    .store
    .assign_manager(o.request(A, None, role.id))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(ladder_core::Error::RoleInactive(_))));
}

#[tokio::test]
async fn retiring_unknown_role_is_not_found() {
  let o = org().await;
  let err = o.store.retire_role(RoleId::random()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn scope_role_rejected_at_system_level() {
  let o = org().await;
  let input = AssignManager::new(person(A), RoleScope::System, o.staff, None, person(ADMIN));
  let err = o.store.assign_manager(input).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(ladder_core::Error::RoleScopeMismatch { .. })
  ));
}

// ─── Assign / get round trip ─────────────────────────────────────────────────

#[tokio::test]
async fn assign_then_get_returns_manager() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  let written = o.staff(B, Some(A)).await.unwrap();

  let fetched = o.store.get_assignment(person(B), o.scope).await.unwrap().unwrap();
  assert_eq!(fetched, written);
  assert_eq!(fetched.manager_id, Some(person(A)));
  assert_eq!(fetched.assigned_by, person(ADMIN));
}

#[tokio::test]
async fn get_assignment_missing_returns_none() {
  let o = org().await;
  assert!(o.store.get_assignment(person(A), o.scope).await.unwrap().is_none());
}

#[tokio::test]
async fn scopes_are_independent() {
  let o = org().await;
  let other = RoleScope::Scoped(ScopeId::random());
  o.manager(A, None).await.unwrap();
  o.staff(B, Some(A)).await.unwrap();

  assert!(o.store.get_assignment(person(B), other).await.unwrap().is_none());
  assert!(o.store.list_assignments(other).await.unwrap().is_empty());
}

// ─── Cycle guard ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn self_reference_fails_without_writing() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  let before = o.store.get_assignment(person(A), o.scope).await.unwrap();

  let err = o.manager(A, Some(A)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::SelfReference);

  assert_eq!(o.store.get_assignment(person(A), o.scope).await.unwrap(), before);
  assert_eq!(o.events_for(A).await, 1);
}

#[tokio::test]
async fn two_cycle_rejected() {
  let o = org().await;
  o.manager(B, None).await.unwrap();
  o.manager(A, Some(B)).await.unwrap();

  let err = o.manager(B, Some(A)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CircularReference);
  assert!(o.store.get_assignment(person(B), o.scope).await.unwrap().unwrap().manager_id.is_none());
}

#[tokio::test]
async fn longer_cycle_rejected() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, Some(A)).await.unwrap();
  o.manager(C, Some(B)).await.unwrap();

  let err = o.manager(A, Some(C)).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(ladder_core::Error::CircularReference { person: p, manager: m })
      if p == person(A) && m == person(C)
  ));
}

#[tokio::test]
async fn manager_from_another_scope_rejected() {
  let o = org().await;
  let other = RoleScope::Scoped(ScopeId::random());
  o.store
    .assign_manager(AssignManager::new(person(A), other, o.manager, None, person(ADMIN)))
    .await
    .unwrap();

  let err = o.staff(B, Some(A)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CrossScopeMismatch);
  assert!(o.store.get_assignment(person(B), o.scope).await.unwrap().is_none());
}

#[tokio::test]
async fn manager_role_required_by_default() {
  let o = org().await;
  o.staff(A, None).await.unwrap();
  let err = o.staff(B, Some(A)).await.unwrap_err();
  assert!(matches!(err, Error::Core(ladder_core::Error::ManagerRoleRequired(_))));
  assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn manager_role_check_can_be_disabled() {
  let o = org_with(HierarchyPolicy {
    require_manager_role: false,
    ..Default::default()
  })
  .await;
  o.staff(A, None).await.unwrap();
  o.staff(B, Some(A)).await.unwrap();
}

#[tokio::test]
async fn depth_limit_enforced() {
  let o = org_with(HierarchyPolicy { max_depth: 2, ..Default::default() }).await;
  o.manager(A, None).await.unwrap();
  o.manager(B, Some(A)).await.unwrap();
  o.manager(C, Some(B)).await.unwrap();

  let err = o.staff(D, Some(C)).await.unwrap_err();
  assert!(matches!(err, Error::Core(ladder_core::Error::DepthExceeded { max: 2 })));
}

// ─── Reassignment and removal ────────────────────────────────────────────────

#[tokio::test]
async fn reassignment_supersedes_the_old_row() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, None).await.unwrap();
  let first = o.staff(C, Some(A)).await.unwrap();
  let second = o.staff(C, Some(B)).await.unwrap();

  assert_eq!(o.active_count(C).await, 1);

  let chain = o.store.assignment_chain(person(C), o.scope).await.unwrap();
  assert_eq!(chain.len(), 2);
  assert_eq!(chain[0].id, first.id);
  assert!(chain[0].removed_at.is_some());
  assert_eq!(chain[0].superseded_by, Some(second.id));
  assert!(chain[1].is_active());

  let events = o.store.history(HistoryQuery::for_person(person(C))).await.unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].change_type, ChangeType::Reassigned);
  assert_eq!(events[0].old_manager_id, Some(person(A)));
  assert_eq!(events[0].new_manager_id, Some(person(B)));
  assert_eq!(events[1].change_type, ChangeType::Assigned);
  assert_eq!(events[1].old_manager_id, None);
}

#[tokio::test]
async fn remove_manager_keeps_person_as_root() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  let before = o.staff(B, Some(A)).await.unwrap();

  let after = o.remove(B).await.unwrap();
  assert_eq!(after.manager_id, None);
  assert_eq!(after.role_id, before.role_id);

  let fetched = o.store.get_assignment(person(B), o.scope).await.unwrap().unwrap();
  assert_eq!(fetched.manager_id, None);

  let events = o.store.history(HistoryQuery::for_person(person(B))).await.unwrap();
  assert_eq!(events[0].change_type, ChangeType::Removed);
  assert_eq!(events[0].old_manager_id, Some(person(A)));
  assert_eq!(events[0].new_manager_id, None);
}

#[tokio::test]
async fn removing_absent_manager_is_not_found_and_writes_nothing() {
  let o = org().await;
  o.manager(A, None).await.unwrap();

  let err = o.remove(A).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert_eq!(o.events_for(A).await, 1);
  assert_eq!(o.store.assignment_chain(person(A), o.scope).await.unwrap().len(), 1);

  let err = o.remove(B).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(ladder_core::Error::AssignmentNotFound { .. })
  ));
}

#[tokio::test]
async fn released_person_orphans_their_reports() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, Some(A)).await.unwrap();
  o.staff(D, Some(B)).await.unwrap();

  o.release(B).await.unwrap();
  assert!(o.store.get_assignment(person(B), o.scope).await.unwrap().is_none());

  let forest = o.store.build_tree(o.scope).await.unwrap();
  let d = forest.find(person(D)).unwrap();
  assert!(d.orphaned);
  assert_eq!(d.depth, 0);
  assert!(o.store.compute_visible_set(person(A), o.scope).await.unwrap().is_empty());

  let events = o.store.history(HistoryQuery::for_person(person(B))).await.unwrap();
  assert_eq!(events[0].change_type, ChangeType::Removed);
}

#[tokio::test]
async fn rejoining_under_a_former_report_is_circular() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, Some(A)).await.unwrap();
  o.release(A).await.unwrap();

  // B still points at A; A coming back under B would close A → B → A.
  let err = o.manager(A, Some(B)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CircularReference);
}

#[tokio::test]
async fn audit_rows_match_successful_writes() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, None).await.unwrap();

  let mut successes = 0;
  for result in [
    o.staff(C, Some(A)).await.map(|_| ()),
    o.staff(C, Some(C)).await.map(|_| ()),
    o.staff(C, Some(B)).await.map(|_| ()),
    o.remove(C).await.map(|_| ()),
    o.remove(C).await.map(|_| ()),
    o.staff(C, Some(A)).await.map(|_| ()),
    o.release(C).await,
    o.release(C).await,
  ] {
    if result.is_ok() {
      successes += 1;
    }
  }

  assert_eq!(successes, 5);
  assert_eq!(o.events_for(C).await, successes);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn racing_first_assignments_one_wins() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, None).await.unwrap();

  let first = o.request(C, Some(A), o.staff).expecting(Precondition::Absent);
  let second = o.request(C, Some(B), o.staff).expecting(Precondition::Absent);
  let (r1, r2) = tokio::join!(
    o.store.assign_manager(first),
    o.store.assign_manager(second)
  );

  let outcomes = [r1, r2];
  assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
  let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
  assert_eq!(loser.kind(), ErrorKind::ConcurrentConflict);

  assert_eq!(o.active_count(C).await, 1);
  assert_eq!(o.events_for(C).await, 1);
}

#[tokio::test]
async fn stale_current_precondition_conflicts() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, None).await.unwrap();
  let seen = o.staff(C, Some(A)).await.unwrap();

  o.store
    .assign_manager(o.request(C, Some(B), o.staff).expecting(Precondition::Current(seen.id)))
    .await
    .unwrap();

  let err = o
    .store
    .assign_manager(o.request(C, Some(A), o.staff).expecting(Precondition::Current(seen.id)))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ConcurrentConflict);
  assert_eq!(
    o.store.get_assignment(person(C), o.scope).await.unwrap().unwrap().manager_id,
    Some(person(B))
  );
}

#[tokio::test]
async fn racing_opposite_edges_never_form_a_cycle() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, None).await.unwrap();

  let (r1, r2) = tokio::join!(o.manager(A, Some(B)), o.manager(B, Some(A)));
  assert!(r1.is_ok() ^ r2.is_ok());

  let rows = o.store.list_assignments(o.scope).await.unwrap();
  assert!(graph_of(o.scope, &rows).is_forest());
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn validation_is_a_dry_run() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, Some(A)).await.unwrap();

  let ok = o.store.validate_assignment(o.request(C, Some(B), o.staff)).await.unwrap();
  assert!(ok.is_accepted());
  assert!(o.store.get_assignment(person(C), o.scope).await.unwrap().is_none());
  assert_eq!(o.events_for(C).await, 0);

  let rejected = o.store.validate_assignment(o.request(A, Some(B), o.manager)).await.unwrap();
  assert!(matches!(
    rejected,
    ladder_core::assignment::Verdict::Rejected(ladder_core::Error::CircularReference { .. })
  ));
}

// ─── Tree ────────────────────────────────────────────────────────────────────

async fn abcd() -> Org {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  o.manager(B, Some(A)).await.unwrap();
  o.staff(C, Some(A)).await.unwrap();
  o.staff(D, Some(B)).await.unwrap();
  o
}

#[tokio::test]
async fn tree_and_visible_sets() {
  let o = abcd().await;

  let forest = o.store.build_tree(o.scope).await.unwrap();
  assert_eq!(forest.roots.len(), 1);
  let root = &forest.roots[0];
  assert_eq!(root.person_id, person(A));
  let reports: BTreeSet<_> = root.children.iter().map(|c| c.person_id).collect();
  assert_eq!(reports, BTreeSet::from([person(B), person(C)]));
  assert_eq!(forest.find(person(B)).unwrap().children[0].person_id, person(D));

  assert_eq!(
    o.store.compute_visible_set(person(A), o.scope).await.unwrap(),
    BTreeSet::from([person(B), person(C), person(D)])
  );
  assert_eq!(
    o.store.compute_visible_set(person(B), o.scope).await.unwrap(),
    BTreeSet::from([person(D)])
  );
  assert!(o.store.compute_visible_set(person(C), o.scope).await.unwrap().is_empty());
}

#[tokio::test]
async fn tree_cache_is_invalidated_by_writes() {
  let o = abcd().await;
  let before = o.store.build_tree(o.scope).await.unwrap();
  let again = o.store.build_tree(o.scope).await.unwrap();
  assert!(std::sync::Arc::ptr_eq(&before, &again));

  o.staff(D, Some(A)).await.unwrap();
  let after = o.store.build_tree(o.scope).await.unwrap();
  assert!(!std::sync::Arc::ptr_eq(&before, &after));
  assert!(o.store.compute_visible_set(person(B), o.scope).await.unwrap().is_empty());
}

#[tokio::test]
async fn abandoned_write_still_invalidates_tree() {
  let o = abcd().await;
  let before = o.store.build_tree(o.scope).await.unwrap();
  assert_eq!(
    o.store.compute_visible_set(person(B), o.scope).await.unwrap(),
    BTreeSet::from([person(D)])
  );

  // Poll the write once, then drop it. The body is already queued on the
  // connection thread and commits regardless.
  tokio::select! {
    biased;
    result = o.staff(D, Some(A)) => { result.unwrap(); }
    () = std::future::ready(()) => {}
  }

  // Queued behind the write on the same connection.
  let moved = o.store.get_assignment(person(D), o.scope).await.unwrap().unwrap();
  assert_eq!(moved.manager_id, Some(person(A)));

  let after = o.store.build_tree(o.scope).await.unwrap();
  assert!(!std::sync::Arc::ptr_eq(&before, &after));
  assert!(o.store.compute_visible_set(person(B), o.scope).await.unwrap().is_empty());
  assert_eq!(
    o.store.compute_visible_set(person(A), o.scope).await.unwrap(),
    BTreeSet::from([person(B), person(C), person(D)])
  );
}

#[tokio::test]
async fn team_statistics() {
  let o = abcd().await;
  let stats = o.store.team_statistics(person(A), o.scope).await.unwrap().unwrap();
  assert_eq!(stats.direct_reports, 2);
  assert_eq!(stats.total_subordinates, 3);
  assert_eq!(stats.managers, 1);
  assert_eq!(stats.staff, 1);
  assert!(o.store.team_statistics(person(99), o.scope).await.unwrap().is_none());
}

#[tokio::test]
async fn available_managers_are_ordered_by_level() {
  let o = abcd().await;
  let roles = o.store.list_roles(Some(RoleTypeKind::Scope)).await.unwrap();
  let l3 = roles.iter().find(|r| r.code == "manager_l3").unwrap().id;
  o.store.assign_manager(o.request(5, None, l3)).await.unwrap();

  let candidates = o.store.available_managers(o.scope).await.unwrap();
  let people: Vec<_> = candidates.iter().map(|c| c.person_id).collect();
  assert_eq!(people, vec![person(A), person(B), person(5)]);
}

// ─── Dashboard access ────────────────────────────────────────────────────────

#[tokio::test]
async fn dashboard_access_defaults_to_deny() {
  let o = org().await;
  assert!(o.store.get_dashboard_access(person(A), o.scope).await.unwrap().is_none());
  assert!(
    !o.store
      .can_view(person(A), o.scope, DashboardCapability::ViewActivities)
      .await
      .unwrap()
  );
  let err = o
    .store
    .authorize(person(A), o.scope, DashboardCapability::ExportReports)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn dashboard_access_upserts() {
  let o = org().await;
  let flags = DashboardFlags { can_view_events: true, ..Default::default() };
  o.store.set_dashboard_access(person(A), o.scope, flags).await.unwrap();

  assert!(o.store.can_view(person(A), o.scope, DashboardCapability::ViewEvents).await.unwrap());
  assert!(!o.store.can_view(person(A), o.scope, DashboardCapability::ViewNotifications).await.unwrap());
  assert!(
    !o.store
      .can_view(person(A), RoleScope::System, DashboardCapability::ViewEvents)
      .await
      .unwrap()
  );

  o.store
    .set_dashboard_access(person(A), o.scope, DashboardFlags::all())
    .await
    .unwrap();
  let access = o.store.get_dashboard_access(person(A), o.scope).await.unwrap().unwrap();
  assert_eq!(access.flags, DashboardFlags::all());
  o.store
    .authorize(person(A), o.scope, DashboardCapability::ExportReports)
    .await
    .unwrap();
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_filters_and_pages() {
  let o = abcd().await;
  o.staff(D, Some(A)).await.unwrap();
  o.remove(C).await.unwrap();

  let all = o.store.history(HistoryQuery::for_scope(o.scope)).await.unwrap();
  assert_eq!(all.len(), 6);
  assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
  assert_eq!(all[0].person_id, person(C));

  let removed = o
    .store
    .history(HistoryQuery {
      change_type: Some(ChangeType::Removed),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(removed.len(), 1);

  let page = o
    .store
    .history(HistoryQuery {
      limit: Some(2),
      offset: Some(1),
      ..HistoryQuery::for_scope(o.scope)
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);
  assert_eq!(page[0].id, all[1].id);

  let future = o
    .store
    .history(HistoryQuery {
      since: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(future.is_empty());

  let other = o
    .store
    .history(HistoryQuery::for_scope(RoleScope::Scoped(ScopeId::random())))
    .await
    .unwrap();
  assert!(other.is_empty());
}

// ─── Random operation sequences ──────────────────────────────────────────────

fn graph_of(scope: RoleScope, rows: &[Assignment]) -> ReportingGraph {
  let mut graph = ReportingGraph::new(scope);
  for a in rows {
    graph.insert(a.person_id, Member { manager_id: a.manager_id, is_manager: true });
  }
  graph
}

mod random {
  use proptest::prelude::*;

  use super::*;

  #[derive(Debug, Clone)]
  enum Op {
    Assign(u128, Option<u128>),
    RemoveManager(u128),
    Release(u128),
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      4 => (1u128..7, proptest::option::of(1u128..7)).prop_map(|(p, m)| Op::Assign(p, m)),
      1 => (1u128..7).prop_map(Op::RemoveManager),
      1 => (1u128..7).prop_map(Op::Release),
    ]
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn store_keeps_a_forest_and_a_complete_audit(ops in prop::collection::vec(op(), 1..40)) {
      let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

      rt.block_on(async {
        let o = org().await;
        let mut successes = 0usize;

        for op in ops {
          let result = match op {
            Op::Assign(p, m) => o.manager(p, m).await.map(|_| ()),
            Op::RemoveManager(p) => o.remove(p).await.map(|_| ()),
            Op::Release(p) => o.release(p).await,
          };
          match result {
            Ok(()) => successes += 1,
            Err(e) => assert_ne!(e.kind(), ErrorKind::Internal, "{e}"),
          }

          let rows = o.store.list_assignments(o.scope).await.unwrap();
          assert!(graph_of(o.scope, &rows).is_forest());
          let people: BTreeSet<_> = rows.iter().map(|a| a.person_id).collect();
          assert_eq!(people.len(), rows.len());
        }

        let events = o
          .store
          .history(HistoryQuery { limit: Some(10_000), ..HistoryQuery::for_scope(o.scope) })
          .await
          .unwrap();
        assert_eq!(events.len(), successes);
      });
    }
  }
}

#[tokio::test]
async fn history_since_is_exact_below_a_microsecond() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  let event = o
    .store
    .history(HistoryQuery::for_person(person(A)))
    .await
    .unwrap()
    .remove(0);

  let at = HistoryQuery {
    since: Some(event.created_at),
    ..HistoryQuery::for_person(person(A))
  };
  assert_eq!(o.store.history(at).await.unwrap().len(), 1);

  let just_after = HistoryQuery {
    since: Some(event.created_at + chrono::Duration::nanoseconds(1)),
    ..HistoryQuery::for_person(person(A))
  };
  assert!(o.store.history(just_after).await.unwrap().is_empty());
}

// ── Audit integrity ──────────────────────────────────────────────────────────

const BLOCK_EVENTS: &str = "
  CREATE TRIGGER block_events BEFORE INSERT ON hierarchy_change_events
  BEGIN
    SELECT RAISE(ABORT, 'audit log unavailable');
  END;
";

#[tokio::test]
async fn failed_audit_append_rolls_back_assignment() {
  let o = org().await;
  o.manager(A, None).await.unwrap();
  let existing = o.staff(C, Some(A)).await.unwrap();

  o.store.execute_raw(BLOCK_EVENTS).await.unwrap();

  let err = o.staff(B, Some(A)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Internal);
  assert!(o.store.get_assignment(person(B), o.scope).await.unwrap().is_none());

  // A reassignment keeps the old row active.
  o.staff(C, None).await.unwrap_err();
  let current = o.store.get_assignment(person(C), o.scope).await.unwrap().unwrap();
  assert_eq!(current, existing);

  o.store.execute_raw("DROP TRIGGER block_events;").await.unwrap();
  assert_eq!(o.events_for(B).await, 0);
  assert_eq!(o.events_for(C).await, 1);
  assert_eq!(o.store.assignment_chain(person(C), o.scope).await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_log_rejects_update_and_delete() {
  let o = org().await;
  o.manager(A, None).await.unwrap();

  assert!(
    o.store
      .execute_raw("UPDATE hierarchy_change_events SET reason = 'edited';")
      .await
      .is_err()
  );
  assert!(
    o.store
      .execute_raw("DELETE FROM hierarchy_change_events;")
      .await
      .is_err()
  );

  let events = o.store.history(HistoryQuery::for_person(person(A))).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].reason, None);
}
