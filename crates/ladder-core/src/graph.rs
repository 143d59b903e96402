//! The cycle guard.
//!
//! A [`ReportingGraph`] is a snapshot of one scope's active edges, loaded
//! inside the write transaction that will commit the change. Before a
//! `person → manager` edge is written, [`ReportingGraph::check_edge`] walks
//! the candidate manager's ancestor chain; if the person shows up in it the
//! edge would close a cycle.
//!
//! Walks follow stored edges even when they point at someone who has since
//! left the scope. Such a person is not a member, so the edge is inactive,
//! but it becomes active again the moment they rejoin; the guard has to see it
//! to stop a rejoin from closing a cycle.
//!
//! Every walk is bounded by the number of members in the scope and remembers
//! the nodes it has visited, so it terminates even if storage already holds a
//! cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
  Error, Result,
  ids::{PersonId, RoleScope},
  policy::HierarchyPolicy,
};

/// One person's position in the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
  pub manager_id: Option<PersonId>,
  /// Whether the role held in this scope is flagged as a manager role.
  pub is_manager: bool,
}

#[derive(Debug, Clone)]
pub struct ReportingGraph {
  scope:   RoleScope,
  members: HashMap<PersonId, Member>,
}

impl ReportingGraph {
  pub fn new(scope: RoleScope) -> Self {
    Self { scope, members: HashMap::new() }
  }

  pub fn scope(&self) -> RoleScope { self.scope }

  pub fn len(&self) -> usize { self.members.len() }

  pub fn is_empty(&self) -> bool { self.members.is_empty() }

  pub fn contains(&self, person: PersonId) -> bool {
    self.members.contains_key(&person)
  }

  pub fn member(&self, person: PersonId) -> Option<&Member> {
    self.members.get(&person)
  }

  pub fn insert(&mut self, person: PersonId, member: Member) -> Option<Member> {
    self.members.insert(person, member)
  }

  pub fn remove(&mut self, person: PersonId) -> Option<Member> {
    self.members.remove(&person)
  }

  /// The manager of `person`, if that manager is itself a member. A stored
  /// edge to someone who has left the scope is treated as no edge.
  pub fn manager_of(&self, person: PersonId) -> Option<PersonId> {
    self
      .members
      .get(&person)
      .and_then(|m| m.manager_id)
      .filter(|m| self.members.contains_key(m))
  }

  /// `start` followed by its ancestors, nearest first. The walk ends at a
  /// root or right after the first person who is not a member.
  pub fn chain_from(&self, start: PersonId) -> Chain<'_> {
    Chain {
      graph:  self,
      next:   Some(start),
      seen:   HashSet::new(),
      budget: self.members.len() + 1,
    }
  }

  /// The ancestors of `person`, nearest first, excluding `person`.
  pub fn ancestors(&self, person: PersonId) -> impl Iterator<Item = PersonId> + '_ {
    self.chain_from(person).skip(1)
  }

  /// Number of edges between `person` and the root of its tree.
  pub fn depth_of(&self, person: PersonId) -> usize {
    self.ancestors(person).filter(|a| self.contains(*a)).count()
  }

  /// Members whose manager is `person`.
  pub fn direct_reports(&self, person: PersonId) -> Vec<PersonId> {
    self
      .members
      .iter()
      .filter(|(_, m)| m.manager_id == Some(person))
      .map(|(p, _)| *p)
      .collect()
  }

  fn reports_index(&self) -> HashMap<PersonId, Vec<PersonId>> {
    let mut index: HashMap<PersonId, Vec<PersonId>> = HashMap::new();
    for (person, member) in &self.members {
      if let Some(manager) = member.manager_id {
        index.entry(manager).or_default().push(*person);
      }
    }
    index
  }

  /// Length of the longest downward path below `person` (0 for a leaf).
  pub fn height_below(&self, person: PersonId) -> usize {
    let index = self.reports_index();
    let mut seen = HashSet::from([person]);
    let mut queue = VecDeque::from([(person, 0usize)]);
    let mut height = 0;

    while let Some((current, level)) = queue.pop_front() {
      height = height.max(level);
      for report in index.get(&current).into_iter().flatten() {
        if seen.insert(*report) {
          queue.push_back((*report, level + 1));
        }
      }
    }
    height
  }

  /// Decide whether `person` may report to `manager` in this scope.
  ///
  /// `None` (no manager) is always acceptable. The checks run in order:
  /// self-reference, scope membership of the manager, manager role, the
  /// ancestor walk, then the depth limit.
  pub fn check_edge(
    &self,
    person: PersonId,
    manager: Option<PersonId>,
    policy: &HierarchyPolicy,
  ) -> Result<()> {
    let Some(manager) = manager else {
      return Ok(());
    };

    if manager == person {
      return Err(Error::SelfReference(person));
    }

    let Some(candidate) = self.members.get(&manager) else {
      return Err(Error::CrossScopeMismatch { manager, scope: self.scope });
    };

    if policy.require_manager_role && !candidate.is_manager {
      return Err(Error::ManagerRoleRequired(manager));
    }

    if self.chain_from(manager).any(|p| p == person) {
      return Err(Error::CircularReference { person, manager });
    }

    let deepest = self.depth_of(manager) + 1 + self.height_below(person);
    if deepest > policy.max_depth {
      return Err(Error::DepthExceeded { max: policy.max_depth });
    }

    Ok(())
  }

  /// True when no member can reach itself by following manager edges.
  pub fn is_forest(&self) -> bool {
    self.members.keys().all(|&start| {
      let mut seen = HashSet::new();
      let mut current = Some(start);
      while let Some(p) = current {
        if !seen.insert(p) {
          return false;
        }
        current = self.manager_of(p);
      }
      true
    })
  }
}

/// Iterator returned by [`ReportingGraph::chain_from`].
pub struct Chain<'a> {
  graph:  &'a ReportingGraph,
  next:   Option<PersonId>,
  seen:   HashSet<PersonId>,
  budget: usize,
}

impl Iterator for Chain<'_> {
  type Item = PersonId;

  fn next(&mut self) -> Option<PersonId> {
    let current = self.next.take()?;
    if self.budget == 0 || !self.seen.insert(current) {
      return None;
    }
    self.budget -= 1;
    self.next = self.graph.members.get(&current).and_then(|m| m.manager_id);
    Some(current)
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;
  use uuid::Uuid;

  use super::*;
  use crate::ids::ScopeId;

  fn person(n: u128) -> PersonId { PersonId(Uuid::from_u128(n)) }

  fn policy() -> HierarchyPolicy { HierarchyPolicy::default() }

  fn manager(of: Option<PersonId>) -> Member {
    Member { manager_id: of, is_manager: true }
  }

  /// Scope with the edges `(person, manager)`; every listed person is a
  /// member holding a manager role.
  fn graph(edges: &[(u128, Option<u128>)]) -> ReportingGraph {
    let mut g = ReportingGraph::new(RoleScope::Scoped(ScopeId::random()));
    for (p, m) in edges {
      g.insert(person(*p), manager(m.map(person)));
    }
    g
  }

  #[test]
  fn self_reference_rejected() {
    let g = graph(&[(1, None)]);
    let err = g.check_edge(person(1), Some(person(1)), &policy()).unwrap_err();
    assert!(matches!(err, Error::SelfReference(p) if p == person(1)));
  }

  #[test]
  fn two_cycle_rejected() {
    // 1 reports to 2.
    let g = graph(&[(2, None), (1, Some(2))]);
    let err = g.check_edge(person(2), Some(person(1)), &policy()).unwrap_err();
    assert!(matches!(err, Error::CircularReference { .. }));
  }

  #[test]
  fn longer_cycle_rejected() {
    // 3 → 1 → 2
    let g = graph(&[(2, None), (1, Some(2)), (3, Some(1))]);
    let err = g.check_edge(person(1), Some(person(3)), &policy()).unwrap_err();
    assert!(matches!(err, Error::CircularReference { person: p, manager: m }
      if p == person(1) && m == person(3)));
    let err = g.check_edge(person(2), Some(person(3)), &policy()).unwrap_err();
    assert!(matches!(err, Error::CircularReference { .. }));
  }

  #[test]
  fn moving_within_a_tree_is_allowed() {
    // 2 and 3 report to 1; 4 reports to 2. Move 4 under 3.
    let g = graph(&[(1, None), (2, Some(1)), (3, Some(1)), (4, Some(2))]);
    assert!(g.check_edge(person(4), Some(person(3)), &policy()).is_ok());
  }

  #[test]
  fn manager_outside_scope_rejected() {
    let g = graph(&[(1, None)]);
    let err = g.check_edge(person(1), Some(person(9)), &policy()).unwrap_err();
    assert!(matches!(err, Error::CrossScopeMismatch { manager, .. } if manager == person(9)));
  }

  #[test]
  fn non_manager_role_rejected_when_required() {
    let mut g = graph(&[(1, None)]);
    g.insert(person(2), Member { manager_id: None, is_manager: false });

    let err = g.check_edge(person(1), Some(person(2)), &policy()).unwrap_err();
    assert!(matches!(err, Error::ManagerRoleRequired(_)));

    let relaxed = HierarchyPolicy { require_manager_role: false, ..policy() };
    assert!(g.check_edge(person(1), Some(person(2)), &relaxed).is_ok());
  }

  #[test]
  fn depth_limit_counts_the_moved_subtree() {
    // Chain 1 ← 2 ← 3, and a separate 10 ← 11.
    let g = graph(&[(1, None), (2, Some(1)), (3, Some(2)), (10, None), (11, Some(10))]);
    let tight = HierarchyPolicy { max_depth: 3, ..policy() };

    // 10 under 3 puts 11 at depth 4.
    let err = g.check_edge(person(10), Some(person(3)), &tight).unwrap_err();
    assert!(matches!(err, Error::DepthExceeded { max: 3 }));
    // 10 under 2 puts 11 at depth 3.
    assert!(g.check_edge(person(10), Some(person(2)), &tight).is_ok());
  }

  #[test]
  fn clearing_the_manager_is_always_accepted() {
    let g = graph(&[(1, None), (2, Some(1))]);
    assert!(g.check_edge(person(2), None, &policy()).is_ok());
  }

  #[test]
  fn walks_terminate_on_corrupt_cycles() {
    // 1 → 2 → 3 → 1 already in storage.
    let g = graph(&[(1, Some(2)), (2, Some(3)), (3, Some(1)), (4, None)]);
    assert!(!g.is_forest());
    assert_eq!(g.chain_from(person(1)).count(), 3);
    assert_eq!(g.height_below(person(1)), 2);
    // A fresh edge into the loop still terminates.
    assert!(g.check_edge(person(4), Some(person(1)), &policy()).is_ok());
  }

  #[test]
  fn dangling_manager_counts_as_root() {
    let g = graph(&[(1, Some(99)), (2, Some(1))]);
    assert_eq!(g.manager_of(person(1)), None);
    assert_eq!(g.depth_of(person(2)), 1);
    assert!(g.is_forest());
  }

  #[test]
  fn rejoining_cannot_revive_a_cycle() {
    // 2 reports to 1, then 1 leaves the scope.
    let mut g = graph(&[(1, None), (2, Some(1))]);
    g.remove(person(1));
    assert_eq!(g.manager_of(person(2)), None);

    let err = g.check_edge(person(1), Some(person(2)), &policy()).unwrap_err();
    assert!(matches!(err, Error::CircularReference { .. }));
  }

  #[derive(Debug, Clone)]
  enum Op {
    Assign { who: u8, to: Option<u8>, manager_role: bool },
    Remove { who: u8 },
  }

  fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
      3 => (0u8..8, prop::option::of(0u8..8), any::<bool>())
        .prop_map(|(who, to, manager_role)| Op::Assign { who, to, manager_role }),
      1 => (0u8..8).prop_map(|who| Op::Remove { who }),
    ]
  }

  proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn random_writes_keep_a_forest(ops in prop::collection::vec(op_strategy(), 1..80)) {
      let mut g = ReportingGraph::new(RoleScope::System);
      let policy = HierarchyPolicy { max_depth: 64, ..HierarchyPolicy::default() };

      for op in ops {
        let before = g.clone();
        match op {
          Op::Assign { who, to, manager_role } => {
            let who = person(u128::from(who));
            let to = to.map(|t| person(u128::from(t)));
            match g.check_edge(who, to, &policy) {
              Ok(()) => {
                g.insert(who, Member { manager_id: to, is_manager: manager_role });
              }
              Err(Error::SelfReference(_)) => prop_assert_eq!(to, Some(who)),
              Err(_) => {}
            }
          }
          Op::Remove { who } => {
            g.remove(person(u128::from(who)));
          }
        }
        prop_assert!(g.is_forest(), "cycle after op; before = {:?}", before);
      }
    }
  }
}
